//! Parameter-RAM transaction manager
//!
//! The parameter RAM holds one entry per analog parameter: which DAC target
//! to refresh (`paraddr`), the 10-bit DAC value and the index of the timing
//! LUT entry used to write it. The on-chip FSM cycles through the first
//! `count` slots, refreshing each target once per period.
//!
//! # Update sequence
//!
//! ```text
//! disable      count = 0, pram_en = 0
//! write LUT    16 timing entries
//! write RAM    entry i -> slot i
//! period       refresh period
//! count        number of slots (encoded as n - 1)
//! verify       read back every slot, compare masked fields
//! enable       pram_en = 1
//! ```
//!
//! Verification never stops at the first bad slot: every slot is read and
//! all mismatches are reported together.

use crate::control::{ControlPort, Enable};
use crate::config::ChipConfig;
use crate::error::{ParamMismatch, Result, SpikeyError};
use crate::link::ChipLink;
use crate::packet::Command;
use crate::transport::Transport;
use crate::bitfield;
use spikey_chip::pram::{
    is_voltage, lut, ram, sub, LutEntry, ADDRESS_SPACE_END, COUNT, DEFAULT_LUT, PERIOD,
    SUB_COMMAND,
};
use tracing::{debug, info, warn};

/// System clock of the chip, used for refresh-time estimates
pub const SYSTEM_CLOCK_HZ: u64 = 100_000_000;

/// One parameter-RAM entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamEntry {
    /// DAC target address
    pub paraddr: u32,
    /// DAC value (10 bits)
    pub value: u32,
    /// Timing LUT index (4 bits)
    pub lut: u8,
}

impl ParamEntry {
    /// Describe an entry
    pub const fn new(paraddr: u32, value: u32, lut: u8) -> Self {
        Self {
            paraddr,
            value,
            lut,
        }
    }
}

/// State of the on-chip update FSM as last set by this manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PramFsm {
    /// Not refreshing (count 0, `pram_en` clear)
    #[default]
    Disabled,
    /// Refreshing the first `count` slots
    Enabled,
}

/// Outcome of a read-back pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Slots read back
    pub checked: usize,
    /// One entry per failing slot, in read order
    pub mismatches: Vec<ParamMismatch>,
}

impl VerifyReport {
    /// Every slot matched
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Turn mismatches into an error
    ///
    /// # Errors
    ///
    /// `VerificationFailure` carrying every mismatch.
    pub fn into_result(self) -> Result<usize> {
        if self.mismatches.is_empty() {
            Ok(self.checked)
        } else {
            Err(SpikeyError::VerificationFailure {
                mismatches: self.mismatches,
            })
        }
    }
}

/// Result of a full upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Slots written
    pub entries: usize,
    /// Refresh period written
    pub period: u8,
    /// Clock cycles of one full refresh pass
    pub refresh_cycles: u64,
    /// Slots read back (0 when verification is off)
    pub verified: usize,
}

// ── Encoding ─────────────────────────────────────────────────────────────────

fn check_address(address: u32) -> Result<()> {
    if address >= ADDRESS_SPACE_END {
        return Err(SpikeyError::AddressOutOfRange {
            address,
            end: ADDRESS_SPACE_END,
        });
    }
    Ok(())
}

/// `ci` data of a RAM write to slot `address`
///
/// Value and LUT index are truncated to their field widths.
///
/// # Errors
///
/// `AddressOutOfRange` if the slot or the DAC target lies past the last bank.
pub fn encode_param(address: u32, entry: ParamEntry) -> Result<u64> {
    check_address(address)?;
    check_address(entry.paraddr)?;
    let mut data = SUB_COMMAND.set(0, sub::RAM);
    data = ram::SLOT.set(data, u64::from(address));
    data = ram::PARADDR.set(data, u64::from(entry.paraddr));
    data = bitfield::put(data, &ram::VALUE, u64::from(entry.value));
    data = bitfield::put(data, &ram::LUT, u64::from(entry.lut));
    Ok(data)
}

/// Split RAM read data into slot and entry
#[allow(clippy::cast_possible_truncation)] // fields are at most 12 bits wide
pub fn decode_param(data: u64) -> (u32, ParamEntry) {
    (
        ram::SLOT.get(data) as u32,
        ParamEntry {
            paraddr: ram::PARADDR.get(data) as u32,
            value: ram::VALUE.get(data) as u32,
            lut: ram::LUT.get(data) as u8,
        },
    )
}

/// Bits compared when verifying a RAM slot
pub const fn param_mask() -> u64 {
    SUB_COMMAND.shifted_mask()
        | ram::SLOT.shifted_mask()
        | ram::PARADDR.shifted_mask()
        | ram::VALUE.shifted_mask()
        | ram::LUT.shifted_mask()
}

#[allow(clippy::cast_possible_truncation)]
const LUT_LIMIT: u32 = lut::ENTRIES as u32;

fn check_lut_index(index: u8) -> Result<()> {
    if u32::from(index) >= LUT_LIMIT {
        return Err(SpikeyError::invalid_address(
            "timing LUT",
            u32::from(index),
            LUT_LIMIT,
        ));
    }
    Ok(())
}

/// `ci` data of a LUT write
///
/// # Errors
///
/// `InvalidAddress` for `index >= 16`.
pub fn encode_lut(index: u8, entry: LutEntry) -> Result<u64> {
    check_lut_index(index)?;
    let mut data = SUB_COMMAND.set(0, sub::LUT);
    data = bitfield::put(data, &lut::TIME, u64::from(entry.time));
    data = bitfield::put(data, &lut::BOOST, u64::from(entry.boost));
    data = lut::REPEAT.set(data, u64::from(entry.repeat));
    data = bitfield::put(data, &lut::STEP, u64::from(entry.step));
    data = lut::INDEX.set(data, u64::from(index));
    Ok(data)
}

/// Split LUT read data into index and entry
#[allow(clippy::cast_possible_truncation)] // fields are at most 8 bits wide
pub fn decode_lut(data: u64) -> (u8, LutEntry) {
    (
        lut::INDEX.get(data) as u8,
        LutEntry {
            time: lut::TIME.get(data) as u8,
            boost: lut::BOOST.get(data) as u8,
            repeat: lut::REPEAT.get(data) as u8,
            step: lut::STEP.get(data) as u8,
        },
    )
}

/// Count field for `n` slots: `n - 1` modulo the 12-bit field
///
/// `0` encodes as `0xFFF`, which is also what `4096` would encode to.
pub const fn encode_count(n: u32) -> u64 {
    (n.wrapping_sub(1) as u64) & COUNT.mask()
}

/// Slot count from a count field (inverse of [`encode_count`] modulo 4096)
#[allow(clippy::cast_possible_truncation)]
pub const fn decode_count(field: u64) -> u32 {
    ((field + 1) & COUNT.mask()) as u32
}

// ── Timing planner ───────────────────────────────────────────────────────────

/// Write time exponent for a DAC step from `previous` to `value`
fn write_exponent(previous: u32, value: u32) -> u8 {
    let step = value.abs_diff(previous);
    match value {
        0..=14 if previous == 0 => 11,
        0..=14 => 13,
        15..=99 => 9,
        100..=299 => 7,
        300..=599 if step > 300 => 9,
        300..=599 => 7,
        _ if step <= 512 => 5,
        _ => 11,
    }
}

/// LUT index whose write time suits a step to `value` at DAC target `paraddr`
///
/// Voltage targets are matched on the `time` exponent, currents on `boost`.
/// Returns `None` when the table has no matching entry.
pub fn select_lut(previous: u32, paraddr: u32, value: u32, table: &[LutEntry]) -> Option<u8> {
    let exponent = write_exponent(previous, value);
    let voltage = is_voltage(paraddr);
    let index = table.iter().position(|e| {
        if voltage {
            e.time == exponent
        } else {
            e.boost == exponent
        }
    })?;
    u8::try_from(index).ok()
}

/// Clock cycles of one refresh pass over `entries`
///
/// Entries pointing past the end of `table` are counted as zero.
pub fn refresh_cycles(entries: &[ParamEntry], table: &[LutEntry]) -> u64 {
    entries
        .iter()
        .filter_map(|e| table.get(usize::from(e.lut)))
        .map(LutEntry::cycles)
        .sum()
}

/// Stable sort by DAC value; equal values keep their order
pub fn sort_by_value(entries: &mut [ParamEntry]) {
    entries.sort_by_key(|e| e.value);
}

/// Order entries as a rising then falling ramp of DAC values
///
/// After a stable sort, even ranks fill the front in ascending order and
/// odd ranks fill the back in descending order, so the refresh pass never
/// jumps from the largest value back to the smallest.
pub fn sort_triangle(entries: &mut [ParamEntry]) {
    sort_by_value(entries);
    let sorted = entries.to_vec();
    let (mut front, mut back) = (0, entries.len());
    for (rank, entry) in sorted.into_iter().enumerate() {
        if rank % 2 == 0 {
            entries[front] = entry;
            front += 1;
        } else {
            back -= 1;
            entries[back] = entry;
        }
    }
}

/// LUT index used for the first entry of a pass, voltage targets
const FIRST_VOLTAGE_LUT: u8 = 2;
/// LUT index used for the first entry of a pass, current targets
const FIRST_CURRENT_LUT: u8 = 9;

/// Assign a timing LUT index to every entry and return the refresh cycles
///
/// The first entry uses a fixed 2^7 write time; each following entry gets
/// the time that suits the step from its predecessor's value.
///
/// # Errors
///
/// `InvalidState` if `table` lacks a needed write time.
pub fn plan_timing(entries: &mut [ParamEntry], table: &[LutEntry]) -> Result<u64> {
    let Some(first) = entries.first_mut() else {
        return Ok(0);
    };
    first.lut = if is_voltage(first.paraddr) {
        FIRST_VOLTAGE_LUT
    } else {
        FIRST_CURRENT_LUT
    };
    for i in 1..entries.len() {
        let previous = entries[i - 1].value;
        let ParamEntry { paraddr, value, .. } = entries[i];
        entries[i].lut = select_lut(previous, paraddr, value, table).ok_or_else(|| {
            SpikeyError::invalid_state(format!(
                "no LUT entry with write time 2^{} for parameter {paraddr}",
                write_exponent(previous, value)
            ))
        })?;
    }
    let cycles = refresh_cycles(entries, table);
    check_refresh_time(entries, cycles);
    Ok(cycles)
}

/// Warn when a refresh pass is too slow for the DAC values it holds
#[allow(clippy::cast_precision_loss)]
fn check_refresh_time(entries: &[ParamEntry], cycles: u64) {
    let ms = cycles as f64 * 1000.0 / SYSTEM_CLOCK_HZ as f64;
    let (voltages, currents): (Vec<&ParamEntry>, Vec<&ParamEntry>) =
        entries.iter().partition(|e| is_voltage(e.paraddr));
    let max_voltage = voltages.iter().map(|e| e.value).max().unwrap_or(0);
    let min_voltage = voltages.iter().map(|e| e.value).min().unwrap_or(u32::MAX);
    let min_current = currents.iter().map(|e| e.value).min().unwrap_or(u32::MAX);
    debug!("full parameter refresh takes {cycles} cycles ({ms:.3} ms)");
    if ms > 8.0 && max_voltage >= 600 {
        warn!("refresh of {ms:.3} ms too long for voltages >= 600");
    } else if ms > 2.0 && min_voltage < 50 {
        warn!("refresh of {ms:.3} ms too long for voltages < 50");
    } else if ms > 8.0 && min_current < 100 {
        warn!("refresh of {ms:.3} ms too long for currents < 100");
    }
}

// ── Manager ──────────────────────────────────────────────────────────────────

/// Parameter-RAM manager for one chip
///
/// Owns the FSM state; only [`Self::enable`], [`Self::disable`] and
/// [`Self::upload`] change it.
#[derive(Debug, Clone)]
pub struct ParamRam {
    fsm: PramFsm,
    period: u8,
    verify_uploads: bool,
}

impl Default for ParamRam {
    fn default() -> Self {
        Self::with_config(&ChipConfig::default())
    }
}

impl ParamRam {
    /// Manager with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager using the period and verification setting of `config`
    pub fn with_config(config: &ChipConfig) -> Self {
        Self {
            fsm: PramFsm::Disabled,
            period: config.pram_period,
            verify_uploads: config.verify_uploads,
        }
    }

    /// FSM state as last set
    pub fn fsm(&self) -> PramFsm {
        self.fsm
    }

    /// Forget the FSM state after a chip reset
    pub fn reset_state(&mut self) {
        self.fsm = PramFsm::Disabled;
    }

    /// Write `entry` to RAM slot `address`
    ///
    /// # Errors
    ///
    /// `AddressOutOfRange`, or transport errors.
    pub fn write_param<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
        address: u32,
        entry: ParamEntry,
    ) -> Result<()> {
        let data = encode_param(address, entry)?;
        link.write(Command::ParamRam, data)
    }

    /// Read RAM slot `address`
    ///
    /// # Errors
    ///
    /// `AddressOutOfRange`, `InvalidState` if the chip answered for another
    /// slot, or link errors.
    pub fn read_param<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
        address: u32,
    ) -> Result<ParamEntry> {
        check_address(address)?;
        let data = link.read(Command::ParamRam, read_request(address))?;
        let (slot, entry) = decode_param(data);
        if slot != address {
            return Err(SpikeyError::invalid_state(format!(
                "read of slot {address} answered for slot {slot}"
            )));
        }
        Ok(entry)
    }

    /// Write one timing LUT entry
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `index >= 16`, or transport errors.
    pub fn write_lookup_entry<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
        index: u8,
        entry: LutEntry,
    ) -> Result<()> {
        let data = encode_lut(index, entry)?;
        link.write(Command::ParamRam, data)
    }

    /// Read one timing LUT entry
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `index >= 16`, or link errors.
    pub fn read_lookup_entry<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
        index: u8,
    ) -> Result<LutEntry> {
        check_lut_index(index)?;
        let request = lut::INDEX.set(SUB_COMMAND.set(0, sub::LUT), u64::from(index));
        let (_, entry) = decode_lut(link.read(Command::ParamRam, request)?);
        Ok(entry)
    }

    /// Write the whole timing LUT
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write_lookup_table<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
        table: &[LutEntry; lut::ENTRIES],
    ) -> Result<()> {
        for (index, entry) in (0u8..).zip(table) {
            self.write_lookup_entry(link, index, *entry)?;
        }
        Ok(())
    }

    /// Read the whole timing LUT
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn read_lookup_table<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
    ) -> Result<[LutEntry; lut::ENTRIES]> {
        let mut table = [LutEntry::default(); lut::ENTRIES];
        for (index, slot) in (0u8..).zip(table.iter_mut()) {
            *slot = self.read_lookup_entry(link, index)?;
        }
        Ok(table)
    }

    /// Write the refresh period
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write_period<T: Transport>(&self, link: &mut ChipLink<T>, cycles: u8) -> Result<()> {
        let data = PERIOD.set(SUB_COMMAND.set(0, sub::PERIOD), u64::from(cycles));
        link.write(Command::ParamRam, data)
    }

    /// Read the refresh period
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn read_period<T: Transport>(&self, link: &mut ChipLink<T>) -> Result<u8> {
        let data = link.read(Command::ParamRam, SUB_COMMAND.set(0, sub::PERIOD))?;
        #[allow(clippy::cast_possible_truncation)] // 8-bit field
        let period = PERIOD.get(data) as u8;
        Ok(period)
    }

    /// Set how many slots the FSM refreshes
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write_param_count<T: Transport>(&self, link: &mut ChipLink<T>, n: u32) -> Result<()> {
        let data = COUNT.set(SUB_COMMAND.set(0, sub::COUNT), encode_count(n));
        link.write(Command::ParamRam, data)
    }

    /// Read back the slot count
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn read_param_count<T: Transport>(&self, link: &mut ChipLink<T>) -> Result<u32> {
        let data = link.read(Command::ParamRam, SUB_COMMAND.set(0, sub::COUNT))?;
        Ok(decode_count(COUNT.get(data)))
    }

    /// Read back `expected` slots and compare them
    ///
    /// All reads are issued before the first response is consumed, and
    /// every response is consumed before returning. A mismatch, a rejected
    /// read or an answer for another command is recorded against its slot
    /// and the pass continues.
    ///
    /// # Errors
    ///
    /// `AddressOutOfRange` before anything is sent, or transport errors and
    /// `NoResponse`, after which the remaining reads are discarded. Data
    /// mismatches are not errors here; see [`VerifyReport::into_result`].
    pub fn verify<T: Transport>(
        &self,
        link: &mut ChipLink<T>,
        expected: &[(u32, ParamEntry)],
    ) -> Result<VerifyReport> {
        let words = expected
            .iter()
            .map(|&(address, entry)| encode_param(address, entry).map(|d| (address, d)))
            .collect::<Result<Vec<_>>>()?;
        for &(address, _) in &words {
            link.request(Command::ParamRam, read_request(address))?;
        }
        let mask = param_mask();
        let mut report = VerifyReport::default();
        for (address, want) in words {
            let actual = match link.await_response() {
                Ok(got) => Some(got & mask),
                Err(e @ (SpikeyError::CommandRejected { .. }
                | SpikeyError::UnexpectedResponse { .. })) => {
                    warn!("parameter slot {address}: {e}");
                    None
                }
                Err(e) => {
                    link.discard_pending();
                    return Err(e);
                }
            };
            report.checked += 1;
            let want = want & mask;
            if actual == Some(want) {
                continue;
            }
            if let Some(got) = actual {
                warn!(
                    "parameter slot {address}: expected {want:#x}, read {got:#x} (diff {:#x})",
                    want ^ got
                );
            }
            report.mismatches.push(ParamMismatch {
                address,
                expected: want,
                actual,
            });
        }
        debug!(
            "verified {} slot(s), {} mismatch(es)",
            report.checked,
            report.mismatches.len()
        );
        Ok(report)
    }

    /// Start the refresh FSM
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn enable<T: Transport>(&mut self, link: &mut ChipLink<T>) -> Result<()> {
        ControlPort::new(link).modify(|r| r.set(Enable::ParamRam, true))?;
        self.fsm = PramFsm::Enabled;
        Ok(())
    }

    /// Idle the refresh FSM: count 0 and `pram_en` cleared
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn disable<T: Transport>(&mut self, link: &mut ChipLink<T>) -> Result<()> {
        self.write_param_count(link, 0)?;
        ControlPort::new(link).modify(|r| r.set(Enable::ParamRam, false))?;
        self.fsm = PramFsm::Disabled;
        Ok(())
    }

    /// Run the full update sequence for `entries` (slot `i` = `entries[i]`)
    ///
    /// The FSM is left disabled when verification fails.
    ///
    /// # Errors
    ///
    /// `AddressOutOfRange` for more entries than slots or a bad target,
    /// `VerificationFailure` when read-back differs, or link errors.
    pub fn upload<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        entries: &[ParamEntry],
        table: &[LutEntry; lut::ENTRIES],
    ) -> Result<UploadSummary> {
        let slots: Vec<(u32, ParamEntry)> = (0u32..).zip(entries.iter().copied()).collect();
        if let Some(&(last, _)) = slots.last() {
            check_address(last)?;
        }
        for &(_, entry) in &slots {
            check_address(entry.paraddr)?;
        }

        self.disable(link)?;
        self.write_lookup_table(link, table)?;
        for &(address, entry) in &slots {
            self.write_param(link, address, entry)?;
        }
        self.write_period(link, self.period)?;

        let mut summary = UploadSummary {
            entries: slots.len(),
            period: self.period,
            refresh_cycles: refresh_cycles(entries, table),
            verified: 0,
        };
        if slots.is_empty() {
            info!("parameter RAM cleared");
            return Ok(summary);
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by the address space
        let count = slots.len() as u32;
        self.write_param_count(link, count)?;

        if self.verify_uploads {
            summary.verified = self.verify(link, &slots)?.into_result()?;
        }
        self.enable(link)?;
        info!(
            "parameter RAM: {} entries, period {}, {} cycles per refresh",
            summary.entries, summary.period, summary.refresh_cycles
        );
        Ok(summary)
    }

    /// Order `entries` as a triangle ramp, plan their timing against
    /// `table` and upload them
    ///
    /// Returns the entries in slot order with their assigned LUT indices.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `table` lacks a needed write time, or see
    /// [`Self::upload`].
    pub fn upload_planned<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        entries: &[ParamEntry],
        table: &[LutEntry; lut::ENTRIES],
    ) -> Result<(Vec<ParamEntry>, UploadSummary)> {
        let mut slots = entries.to_vec();
        sort_triangle(&mut slots);
        plan_timing(&mut slots, table)?;
        let summary = self.upload(link, &slots, table)?;
        Ok((slots, summary))
    }

    /// Upload with the default timing LUT
    ///
    /// # Errors
    ///
    /// See [`Self::upload`].
    pub fn upload_default<T: Transport>(
        &mut self,
        link: &mut ChipLink<T>,
        entries: &[ParamEntry],
    ) -> Result<UploadSummary> {
        self.upload(link, entries, &DEFAULT_LUT)
    }
}

fn read_request(address: u32) -> u64 {
    ram::SLOT.set(SUB_COMMAND.set(0, sub::RAM), u64::from(address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spikey_chip::pram::Bank;

    #[test]
    fn param_layout() {
        let data = encode_param(5, ParamEntry::new(10, 20, 3)).unwrap();
        assert_eq!(data, (5 << 4) | (10 << 16) | (20 << 28) | (3 << 40));
        assert_eq!(decode_param(data), (5, ParamEntry::new(10, 20, 3)));
    }

    #[test]
    fn oversized_lut_index_is_truncated() {
        let data = encode_param(5, ParamEntry::new(10, 20, 30)).unwrap();
        assert_eq!(decode_param(data).1.lut, 30 & 0xF);
        let data = encode_param(0, ParamEntry::new(0, 0x7FF, 0)).unwrap();
        assert_eq!(decode_param(data).1.value, 0x3FF);
    }

    #[test]
    fn address_past_last_bank() {
        let end = Bank::OutputAmp.end();
        assert!(encode_param(end - 1, ParamEntry::default()).is_ok());
        assert!(matches!(
            encode_param(end, ParamEntry::default()),
            Err(SpikeyError::AddressOutOfRange { address: 3744, end: 3744 })
        ));
        assert!(encode_param(0, ParamEntry::new(end, 0, 0)).is_err());
    }

    #[test]
    fn lut_layout_and_index_check() {
        let entry = LutEntry {
            time: 7,
            boost: 3,
            repeat: 200,
            step: 9,
        };
        let data = encode_lut(15, entry).unwrap();
        assert_eq!(data & 0xF, sub::LUT);
        assert_eq!(decode_lut(data), (15, entry));
        assert!(matches!(
            encode_lut(16, entry),
            Err(SpikeyError::InvalidAddress { address: 16, limit: 16, .. })
        ));
    }

    #[test]
    fn count_encodes_n_minus_one() {
        assert_eq!(encode_count(1), 0);
        assert_eq!(encode_count(3744), 3743);
        assert_eq!(encode_count(0), 0xFFF);
        for n in [0, 1, 2, 100, 3744, 4095] {
            assert_eq!(decode_count(encode_count(n)), n);
        }
    }

    #[test]
    fn lut_selection_follows_dac_step() {
        let voltage = Bank::VoutLeft.start();
        let current = Bank::Bias.start();
        // small targets from zero use 2^11, otherwise 2^13
        assert_eq!(select_lut(0, voltage, 10, &DEFAULT_LUT), Some(4));
        assert_eq!(select_lut(5, voltage, 10, &DEFAULT_LUT), Some(5));
        assert_eq!(select_lut(0, current, 10, &DEFAULT_LUT), Some(11));
        assert_eq!(select_lut(0, current, 50, &DEFAULT_LUT), Some(10));
        assert_eq!(select_lut(0, voltage, 200, &DEFAULT_LUT), Some(2));
        assert_eq!(select_lut(0, voltage, 400, &DEFAULT_LUT), Some(3));
        assert_eq!(select_lut(350, voltage, 400, &DEFAULT_LUT), Some(2));
        assert_eq!(select_lut(600, voltage, 1000, &DEFAULT_LUT), Some(1));
        assert_eq!(select_lut(0, voltage, 1000, &DEFAULT_LUT), Some(4));
        assert_eq!(select_lut(0, voltage, 10, &[]), None);
    }

    #[test]
    fn planner_assigns_first_entry_default() {
        let mut entries = [
            ParamEntry::new(Bank::VoutLeft.start(), 500, 0),
            ParamEntry::new(Bank::Bias.start(), 50, 0),
        ];
        let cycles = plan_timing(&mut entries, &DEFAULT_LUT).unwrap();
        assert_eq!(entries[0].lut, 2);
        assert_eq!(entries[1].lut, 10);
        // (2^7 + 2^0) + (2^0 + 2^9)
        assert_eq!(cycles, 129 + 513);
        assert_eq!(plan_timing(&mut [], &DEFAULT_LUT).unwrap(), 0);
    }

    #[test]
    fn refresh_cycles_honour_repeat() {
        let mut table = DEFAULT_LUT;
        table[0].repeat = 4;
        let entries = [ParamEntry::new(0, 0, 0), ParamEntry::new(1, 0, 14)];
        // (2^3 + 1) * 4 + (2 + 1)
        assert_eq!(refresh_cycles(&entries, &table), 36 + 3);
    }

    #[test]
    fn sort_is_stable() {
        let mut entries = [
            ParamEntry::new(1, 300, 0),
            ParamEntry::new(2, 100, 0),
            ParamEntry::new(3, 300, 0),
            ParamEntry::new(4, 100, 0),
        ];
        sort_by_value(&mut entries);
        let order: Vec<u32> = entries.iter().map(|e| e.paraddr).collect();
        assert_eq!(order, [2, 4, 1, 3]);
    }

    #[test]
    fn triangle_rises_then_falls() {
        let mut entries: Vec<ParamEntry> = [6, 1, 4, 2, 5, 3]
            .iter()
            .map(|&v| ParamEntry::new(v, v * 10, 0))
            .collect();
        sort_triangle(&mut entries);
        let values: Vec<u32> = entries.iter().map(|e| e.value).collect();
        assert_eq!(values, [10, 30, 50, 60, 40, 20]);

        let mut odd = [
            ParamEntry::new(0, 3, 0),
            ParamEntry::new(1, 1, 0),
            ParamEntry::new(2, 2, 0),
        ];
        sort_triangle(&mut odd);
        let values: Vec<u32> = odd.iter().map(|e| e.value).collect();
        assert_eq!(values, [1, 3, 2]);
        sort_triangle(&mut []);
    }

    #[test]
    fn oversized_lut_exponents_do_not_overflow() {
        let mut table = DEFAULT_LUT;
        table[0] = LutEntry { time: 64, boost: 200, repeat: 0, step: 0 };
        // exponents wrap to their 4-bit fields: 2^0 + 2^8
        assert_eq!(refresh_cycles(&[ParamEntry::new(0, 1, 0)], &table), 1 + 256);
    }

    #[test]
    fn report_into_result() {
        assert_eq!(VerifyReport { checked: 3, mismatches: vec![] }.into_result().unwrap(), 3);
        let bad = VerifyReport {
            checked: 2,
            mismatches: vec![ParamMismatch { address: 1, expected: 2, actual: Some(3) }],
        };
        assert!(!bad.is_clean());
        assert!(matches!(
            bad.into_result(),
            Err(SpikeyError::VerificationFailure { mismatches }) if mismatches.len() == 1
        ));
    }
}
