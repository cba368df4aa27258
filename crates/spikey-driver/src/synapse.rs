//! Synapse-control command processor
//!
//! The synapse controller keeps one RAM row connected between commands.
//! A `syn` or `plut` access opens its row; a different row may only be
//! accessed after `close`. Correlation processing runs autonomously on the
//! chip until the `done` status bit is seen.
//!
//! ```text
//!          syn/plut(r)            pcor/pcorc          done
//!   Idle ──────────────▶ RowOpen(r) ──────────▶ Processing ──────▶ Idle
//!    ▲                      │  syn/plut(r): stay
//!    └──────── close ───────┘  syn/plut(s≠r): RowConflict
//! ```
//!
//! The row state is owned here and changes only when a command was sent.

use crate::bitfield;
use crate::error::{Result, SpikeyError};
use crate::link::ChipLink;
use crate::packet::Command;
use crate::transport::Transport;
use spikey_chip::synapse::{
    status, sub, time, COLUMN, DATA, PCOR_START_ROW, PCOR_STOP_ROW, PLUT_ENTRIES, PLUT_INDEX,
    PLUT_RESOLUTION, PRIORITY_ENCODERS, ROW, SUB_COMMAND, WEIGHT_MAX,
};
use std::fmt;
use tracing::{debug, trace, warn};

/// Row held open by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenRow {
    /// Synapse RAM row
    Synapse(u8),
    /// Plasticity lookup table
    PlasticityLut,
}

impl fmt::Display for OpenRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synapse(row) => write!(f, "{row}"),
            Self::PlasticityLut => f.write_str("plut"),
        }
    }
}

/// Controller state as tracked by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynapseState {
    /// No row connected
    #[default]
    Idle,
    /// A row is connected
    RowOpen(OpenRow),
    /// Correlation processing running
    Processing,
}

/// Decoded controller status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynapseStatus {
    /// Command decode error
    pub cmerr: bool,
    /// Correlation processing finished
    pub done: bool,
    /// Automatic processing active
    pub pcauto: bool,
    /// Continuous processing enabled
    pub pccont: bool,
    /// DLL held in reset
    pub dll_reset: bool,
    /// Neuron reset released (active-low reset line high)
    pub neuron_reset_released: bool,
    /// Row being processed
    pub row: u8,
    /// First row of the processing range
    pub start: u8,
    /// Last row of the processing range
    pub stop: u8,
}

impl SynapseStatus {
    /// Decode status read data
    #[allow(clippy::cast_possible_truncation)] // 8-bit fields
    pub fn decode(data: u64) -> Self {
        let flag = |f: &spikey_chip::Field| f.get(data) == 1;
        Self {
            cmerr: flag(&status::CMERR),
            done: flag(&status::DONE),
            pcauto: flag(&status::PCAUTO),
            pccont: flag(&status::PCCONT),
            dll_reset: flag(&status::DLLRES),
            neuron_reset_released: flag(&status::NRESETB),
            row: status::ROW.get(data) as u8,
            start: status::START.get(data) as u8,
            stop: status::STOP.get(data) as u8,
        }
    }

    /// Encode into status read data
    pub fn encode(&self) -> u64 {
        let mut data = SUB_COMMAND.set(0, sub::CTRL);
        data = bitfield::put_flag(data, &status::CMERR, self.cmerr);
        data = bitfield::put_flag(data, &status::DONE, self.done);
        data = bitfield::put_flag(data, &status::PCAUTO, self.pcauto);
        data = bitfield::put_flag(data, &status::PCCONT, self.pccont);
        data = bitfield::put_flag(data, &status::DLLRES, self.dll_reset);
        data = bitfield::put_flag(data, &status::NRESETB, self.neuron_reset_released);
        data = status::ROW.set(data, u64::from(self.row));
        data = status::START.set(data, u64::from(self.start));
        status::STOP.set(data, u64::from(self.stop))
    }
}

/// Timing register contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynapseTiming {
    /// Sense amplifier delay
    pub sense: u8,
    /// Precharge delay
    pub precharge: u8,
    /// Automatic correlation processing period (12 bits)
    pub pcor_period: u16,
    /// Extended read cycle
    pub read_wait: bool,
}

impl SynapseTiming {
    /// Encode a timing write (period truncated to 12 bits)
    pub fn encode(&self) -> u64 {
        let mut data = SUB_COMMAND.set(0, sub::TIME);
        data = time::SENSE.set(data, u64::from(self.sense));
        data = time::PRECHARGE.set(data, u64::from(self.precharge));
        data = bitfield::put(data, &time::PCOR_PERIOD, u64::from(self.pcor_period));
        bitfield::put_flag(data, &time::READ_WAIT, self.read_wait)
    }

    /// Decode timing read data
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(data: u64) -> Self {
        Self {
            sense: time::SENSE.get(data) as u8,
            precharge: time::PRECHARGE.get(data) as u8,
            pcor_period: time::PCOR_PERIOD.get(data) as u16,
            read_wait: time::READ_WAIT.get(data) == 1,
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

#[allow(clippy::cast_possible_truncation)]
const COLUMNS: u32 = COLUMN.mask() as u32 + 1;
#[allow(clippy::cast_possible_truncation)]
const PLUT_LIMIT: u32 = PLUT_ENTRIES as u32;

fn check_column(col: u8) -> Result<()> {
    if u32::from(col) >= COLUMNS {
        return Err(SpikeyError::invalid_address("synapse column", u32::from(col), COLUMNS));
    }
    Ok(())
}

fn check_plut_index(index: u8) -> Result<()> {
    if u32::from(index) >= PLUT_LIMIT {
        return Err(SpikeyError::invalid_address("plasticity LUT", u32::from(index), PLUT_LIMIT));
    }
    Ok(())
}

fn cell_address(command: u64, row: u8, col: u8) -> u64 {
    let data = SUB_COMMAND.set(0, command);
    ROW.set(COLUMN.set(data, u64::from(col)), u64::from(row))
}

/// Synapse RAM access word (`weights` truncated to 24 bits)
pub fn encode_synapse(row: u8, col: u8, weights: u32) -> u64 {
    bitfield::put(cell_address(sub::SYN, row, col), &DATA, u64::from(weights))
}

/// Plasticity LUT access word
pub fn encode_plut(index: u8, weights: u32) -> u64 {
    let data = PLUT_INDEX.set(SUB_COMMAND.set(0, sub::PLUT), u64::from(index));
    bitfield::put(data, &DATA, u64::from(weights))
}

/// Correlation processing word
pub fn encode_process(start: u8, stop: u8, close: bool) -> u64 {
    let command = if close { sub::PCORC } else { sub::PCOR };
    let data = PCOR_START_ROW.set(SUB_COMMAND.set(0, command), u64::from(start));
    PCOR_STOP_ROW.set(data, u64::from(stop))
}

/// Control register word
///
/// The chip's neuron reset is active low; `neuron_reset = true` clears
/// `nresetb`.
pub fn encode_ctrl(dll_reset: bool, neuron_reset: bool, pc_continuous: bool) -> u64 {
    let mut data = SUB_COMMAND.set(0, sub::CTRL);
    data = bitfield::put_flag(data, &status::DLLRES, dll_reset);
    data = bitfield::put_flag(data, &status::NRESETB, !neuron_reset);
    bitfield::put_flag(data, &status::PCCONT, pc_continuous)
}

#[allow(clippy::cast_possible_truncation)] // 24-bit field
fn data_field(data: u64) -> u32 {
    DATA.get(data) as u32
}

// ── Plasticity LUT generation ────────────────────────────────────────────────

/// A full plasticity LUT: acausal entries 0..16, causal 16..32
pub type PlutTable = [u32; PLUT_ENTRIES];

/// Weight replicated once per correlation priority encoder
pub fn plut_word(weight: u8) -> u32 {
    let w = u32::from(weight.min(WEIGHT_MAX));
    (0..PRIORITY_ENCODERS).fold(0, |acc, j| acc | w << (j * PLUT_RESOLUTION))
}

/// Table mapping every index to its low nibble
pub fn identity_plut() -> PlutTable {
    let mut table = [0; PLUT_ENTRIES];
    for (i, slot) in table.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let weight = (i & usize::from(WEIGHT_MAX)) as u8;
        *slot = plut_word(weight);
    }
    table
}

/// Linear table `offset + k * slope`, clamped to the weight range
///
/// Acausal entry `i` uses `k = i - 1`, causal entry `16 + i` uses `k = i + 1`.
pub fn linear_plut(slope: f32, offset: f32) -> PlutTable {
    let half = PLUT_ENTRIES / 2;
    let clamp = |v: f32| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let w = v.clamp(0.0, f32::from(WEIGHT_MAX)) as u8;
        w
    };
    let mut table = [0; PLUT_ENTRIES];
    for i in 0..half {
        #[allow(clippy::cast_precision_loss)]
        let k = i as f32;
        table[i] = plut_word(clamp(offset + (k - 1.0) * slope));
        table[half + i] = plut_word(clamp(offset + (k + 1.0) * slope));
    }
    table
}

/// Table from explicit weights
///
/// # Errors
///
/// `ValueOverflow` for a weight above 15.
pub fn custom_plut(weights: &[u8; PLUT_ENTRIES]) -> Result<PlutTable> {
    let mut table = [0; PLUT_ENTRIES];
    for (slot, &w) in table.iter_mut().zip(weights) {
        if w > WEIGHT_MAX {
            return Err(SpikeyError::ValueOverflow {
                value: u32::from(w),
                max: u32::from(WEIGHT_MAX),
            });
        }
        *slot = plut_word(w);
    }
    Ok(table)
}

// ── Processor ────────────────────────────────────────────────────────────────

/// Synapse-control processor for one chip
#[derive(Debug, Clone, Default)]
pub struct SynapseControl {
    state: SynapseState,
}

impl SynapseControl {
    /// Processor in `Idle`
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row state
    pub fn state(&self) -> SynapseState {
        self.state
    }

    /// Forget the row state after a chip reset
    pub fn reset(&mut self) {
        self.state = SynapseState::Idle;
    }

    /// State after an access to `target`, without changing anything
    fn access(&self, target: OpenRow) -> Result<SynapseState> {
        match self.state {
            SynapseState::Idle => Ok(SynapseState::RowOpen(target)),
            SynapseState::RowOpen(open) if open == target => Ok(self.state),
            SynapseState::RowOpen(open) => Err(SpikeyError::row_conflict(open, target)),
            SynapseState::Processing => Err(SpikeyError::invalid_state(
                "correlation processing in progress",
            )),
        }
    }

    fn not_processing(&self) -> Result<()> {
        if self.state == SynapseState::Processing {
            return Err(SpikeyError::invalid_state(
                "correlation processing in progress",
            ));
        }
        Ok(())
    }

    /// Write one synapse RAM word
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `col >= 64`, `RowConflict` while another row is
    /// open, or transport errors.
    pub fn write_synapse<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        row: u8,
        col: u8,
        weights: u32,
    ) -> Result<()> {
        check_column(col)?;
        let next = self.access(OpenRow::Synapse(row))?;
        link.write(Command::SynapseRam, encode_synapse(row, col, weights))?;
        self.state = next;
        Ok(())
    }

    /// Read one synapse RAM word
    ///
    /// # Errors
    ///
    /// As [`Self::write_synapse`], plus response errors.
    pub fn read_synapse<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        row: u8,
        col: u8,
    ) -> Result<u32> {
        check_column(col)?;
        let next = self.access(OpenRow::Synapse(row))?;
        link.request(Command::SynapseRam, cell_address(sub::SYN, row, col))?;
        self.state = next;
        Ok(data_field(link.await_response()?))
    }

    /// Write one plasticity LUT entry
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `index >= 32`, `RowConflict` while a synapse row
    /// is open, or transport errors.
    pub fn write_plut<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        index: u8,
        weights: u32,
    ) -> Result<()> {
        check_plut_index(index)?;
        let next = self.access(OpenRow::PlasticityLut)?;
        link.write(Command::SynapseRam, encode_plut(index, weights))?;
        self.state = next;
        Ok(())
    }

    /// Read one plasticity LUT entry
    ///
    /// # Errors
    ///
    /// As [`Self::write_plut`], plus response errors.
    pub fn read_plut<T: Transport>(&mut self, link: &mut ChipLink<T>, index: u8) -> Result<u32> {
        check_plut_index(index)?;
        let next = self.access(OpenRow::PlasticityLut)?;
        let request = PLUT_INDEX.set(SUB_COMMAND.set(0, sub::PLUT), u64::from(index));
        link.request(Command::SynapseRam, request)?;
        self.state = next;
        Ok(data_field(link.await_response()?))
    }

    /// Write a full plasticity LUT and close it
    ///
    /// # Errors
    ///
    /// `RowConflict` while a synapse row is open, or transport errors.
    pub fn write_plut_table<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        table: &PlutTable,
    ) -> Result<()> {
        for (index, &weights) in (0u8..).zip(table) {
            self.write_plut(link, index, weights)?;
        }
        self.close(link)
    }

    /// Read back the plasticity LUT and close it
    ///
    /// # Errors
    ///
    /// `RowConflict` while a synapse row is open, or link errors.
    pub fn read_plut_table<T: Transport>(&mut self, link: &mut ChipLink<T>) -> Result<PlutTable> {
        let mut table = [0; PLUT_ENTRIES];
        for (index, slot) in (0u8..).zip(table.iter_mut()) {
            *slot = self.read_plut(link, index)?;
        }
        self.close(link)?;
        Ok(table)
    }

    /// Disconnect the open row
    ///
    /// Closing with no row open is harmless and still sent.
    ///
    /// # Errors
    ///
    /// `InvalidState` during processing, or transport errors.
    pub fn close<T: Transport>(&mut self, link: &mut ChipLink<T>) -> Result<()> {
        self.not_processing()?;
        link.write(Command::SynapseRam, SUB_COMMAND.set(0, sub::CLOSE))?;
        if let SynapseState::RowOpen(row) = self.state {
            trace!("closed row {row}");
        }
        self.state = SynapseState::Idle;
        Ok(())
    }

    /// Read the correlation flags of one synapse word
    ///
    /// Does not change the row state.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `col >= 64`, `InvalidState` during processing,
    /// or link errors.
    pub fn read_correlation<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        row: u8,
        col: u8,
    ) -> Result<u32> {
        check_column(col)?;
        self.not_processing()?;
        let data = link.read(Command::SynapseRam, cell_address(sub::COR_READ, row, col))?;
        Ok(data_field(data))
    }

    /// Start correlation processing of rows `start..=stop`
    ///
    /// `close` selects the variant that disconnects the rows afterwards.
    ///
    /// # Errors
    ///
    /// `InvalidState` if processing is already running, or transport errors.
    pub fn process_correlation<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        start: u8,
        stop: u8,
        close: bool,
    ) -> Result<()> {
        self.not_processing()?;
        debug!("processing correlation rows {start}..={stop} (close {close})");
        link.write(Command::SynapseRam, encode_process(start, stop, close))?;
        self.state = SynapseState::Processing;
        Ok(())
    }

    /// Write the timing register
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write_time<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        timing: SynapseTiming,
    ) -> Result<()> {
        link.write(Command::SynapseRam, timing.encode())
    }

    /// Read the timing register
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn read_time<T: Transport>(&mut self, link: &mut ChipLink<T>) -> Result<SynapseTiming> {
        let data = link.read(Command::SynapseRam, SUB_COMMAND.set(0, sub::TIME))?;
        Ok(SynapseTiming::decode(data))
    }

    /// Write the control register
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write_ctrl<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        dll_reset: bool,
        neuron_reset: bool,
        pc_continuous: bool,
    ) -> Result<()> {
        link.write(
            Command::SynapseRam,
            encode_ctrl(dll_reset, neuron_reset, pc_continuous),
        )
    }

    /// Read the status register
    ///
    /// `done` while processing returns the controller to `Idle`.
    ///
    /// # Errors
    ///
    /// `CommandDecodeError` when `cmerr` is set (state unchanged; resync
    /// the chip), or link errors.
    pub fn read_status<T: Transport>(&mut self, link: &mut ChipLink<T>) -> Result<SynapseStatus> {
        let data = link.read(Command::SynapseRam, SUB_COMMAND.set(0, sub::CTRL))?;
        let status = SynapseStatus::decode(data);
        if status.cmerr {
            warn!("synapse controller decode error, status {data:#x}");
            return Err(SpikeyError::CommandDecodeError { status: data });
        }
        if status.done && self.state == SynapseState::Processing {
            debug!("correlation processing done");
            self.state = SynapseState::Idle;
        }
        Ok(status)
    }

    /// Poll status until processing finishes
    ///
    /// # Errors
    ///
    /// `InvalidState` if not done after `max_polls` reads, or any
    /// [`Self::read_status`] error.
    pub fn wait_done<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        max_polls: usize,
    ) -> Result<SynapseStatus> {
        for _ in 0..max_polls {
            let status = self.read_status(link)?;
            if self.state != SynapseState::Processing {
                return Ok(status);
            }
        }
        Err(SpikeyError::invalid_state(format!(
            "correlation processing not done after {max_polls} polls"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synapse_word_layout() {
        let w = encode_synapse(3, 10, 0xABCDEF);
        assert_eq!(w, 3 | (10 << 4) | (3 << 10) | (0xAB_CDEF << 28));
        assert_eq!(cell_address(sub::COR_READ, 255, 63), 5 | (63 << 4) | (255 << 10));
    }

    #[test]
    fn process_and_ctrl_layout() {
        assert_eq!(encode_process(2, 9, true), 7 | (2 << 4) | (9 << 28));
        assert_eq!(encode_process(2, 9, false) & 0xF, 6);
        // neuron reset asserted clears nresetb
        assert_eq!(encode_ctrl(false, true, false), 0);
        assert_eq!(encode_ctrl(true, false, true), (1 << 8) | (1 << 9) | (1 << 7));
    }

    #[test]
    fn timing_roundtrip_keeps_read_wait_clear_of_period() {
        let t = SynapseTiming {
            sense: 0x12,
            precharge: 0x34,
            pcor_period: 0xFFF,
            read_wait: true,
        };
        let data = t.encode();
        assert_eq!(SynapseTiming::decode(data), t);
        let no_wait = SynapseTiming { read_wait: false, ..t };
        assert_eq!(SynapseTiming::decode(no_wait.encode()).pcor_period, 0xFFF);
    }

    #[test]
    fn status_roundtrip() {
        let s = SynapseStatus {
            done: true,
            pccont: true,
            neuron_reset_released: true,
            row: 17,
            start: 1,
            stop: 200,
            ..SynapseStatus::default()
        };
        assert_eq!(SynapseStatus::decode(s.encode()), s);
    }

    #[test]
    fn plut_words() {
        assert_eq!(plut_word(0xA), 0xAA_AAAA);
        assert_eq!(plut_word(99), 0xFF_FFFF);
        let id = identity_plut();
        assert_eq!(id[1], 0x11_1111);
        assert_eq!(id[17], 0x11_1111);
        assert!(custom_plut(&[16; PLUT_ENTRIES]).is_err());
        assert_eq!(custom_plut(&[2; PLUT_ENTRIES]).unwrap()[31], 0x22_2222);
    }

    #[test]
    fn linear_plut_is_clamped() {
        let t = linear_plut(1.0, 0.0);
        // acausal 0: 0 + (0-1)*1 clamps to 0
        assert_eq!(t[0], 0);
        assert_eq!(t[5], plut_word(4));
        assert_eq!(t[16], plut_word(1));
        assert_eq!(t[31], plut_word(15));
    }

    #[test]
    fn state_transitions_without_link() {
        let mut sc = SynapseControl::new();
        assert_eq!(sc.access(OpenRow::Synapse(3)).unwrap(), SynapseState::RowOpen(OpenRow::Synapse(3)));
        sc.state = SynapseState::RowOpen(OpenRow::Synapse(3));
        assert!(sc.access(OpenRow::Synapse(3)).is_ok());
        assert!(matches!(
            sc.access(OpenRow::Synapse(4)),
            Err(SpikeyError::RowConflict { .. })
        ));
        assert!(sc.access(OpenRow::PlasticityLut).is_err());
        sc.state = SynapseState::Processing;
        assert!(matches!(sc.access(OpenRow::Synapse(3)), Err(SpikeyError::InvalidState { .. })));
        sc.reset();
        assert_eq!(sc.state(), SynapseState::Idle);
    }

    #[test]
    fn column_and_plut_index_bounds() {
        assert!(check_column(63).is_ok());
        assert!(check_column(64).is_err());
        assert!(check_plut_index(31).is_ok());
        assert!(check_plut_index(32).is_err());
    }
}
