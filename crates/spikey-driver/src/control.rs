//! Control register and status views
//!
//! The control register lives on the chip. Nothing here caches its value:
//! a write sends exactly the bits it is given, and read-modify-write goes
//! through a status read of the chip's current contents.

use crate::bitfield;
use crate::error::{Result, SpikeyError};
use crate::link::ChipLink;
use crate::packet::{Command, CommandPacket};
use crate::transport::Transport;
use spikey_chip::control::{
    bits, fifo, select, status, EVENT_IN_B_RESET, EVENT_IN_RESET, EVENT_OUT_RESET, REGISTER,
    RESET_VALUE, SELECTOR,
};
use spikey_chip::fields::Field;
use std::fmt;
use tracing::{debug, info};

/// Named enable bits of the control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enable {
    /// Error output
    ErrorOutput,
    /// Early debug output
    EarlyDebug,
    /// Analog clock
    AnalogClock,
    /// Analog high-frequency clock
    AnalogClockHigh,
    /// Parameter-RAM update FSM
    ParamRam,
}

impl Enable {
    /// Every enable bit
    pub const ALL: [Enable; 5] = [
        Enable::ErrorOutput,
        Enable::EarlyDebug,
        Enable::AnalogClock,
        Enable::AnalogClockHigh,
        Enable::ParamRam,
    ];

    /// Bit position in the register
    pub const fn bit(self) -> u32 {
        match self {
            Self::ErrorOutput => bits::ERR_OUT_EN,
            Self::EarlyDebug => bits::EARLY_DEBUG,
            Self::AnalogClock => bits::ANA_CLK_EN,
            Self::AnalogClockHigh => bits::ANA_CLK_HI_EN,
            Self::ParamRam => bits::PRAM_EN,
        }
    }
}

/// Buffer reset fields of the control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferReset {
    /// Event input buffers
    EventIn,
    /// Second bank of event input buffers
    EventInB,
    /// Event output buffers
    EventOut,
}

impl BufferReset {
    /// Register field
    pub const fn field(self) -> Field {
        match self {
            Self::EventIn => EVENT_IN_RESET,
            Self::EventInB => EVENT_IN_B_RESET,
            Self::EventOut => EVENT_OUT_RESET,
        }
    }
}

/// A 32-bit control register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControlRegister(u32);

impl ControlRegister {
    /// Power-up value
    pub const RESET: ControlRegister = ControlRegister(RESET_VALUE);

    /// Wrap a raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Register with exactly the given enables set and everything else clear
    pub fn with_enables(enables: &[Enable]) -> Self {
        enables.iter().fold(Self(0), |reg, &e| reg.set(e, true))
    }

    /// Enable bit state
    pub fn is_enabled(self, enable: Enable) -> bool {
        self.0 & (1 << enable.bit()) != 0
    }

    /// Set or clear one enable
    #[must_use]
    pub fn set(self, enable: Enable, on: bool) -> Self {
        let bit = 1u32 << enable.bit();
        Self(if on { self.0 | bit } else { self.0 & !bit })
    }

    /// Per-buffer reset bits of one field
    pub fn buffer_reset(self, reset: BufferReset) -> u32 {
        #[allow(clippy::cast_possible_truncation)] // field lies in the low 32 bits
        let v = reset.field().get(u64::from(self.0)) as u32;
        v
    }

    /// Assert (all ones) or release (all zeros) one reset field
    #[must_use]
    pub fn set_buffer_reset(self, reset: BufferReset, asserted: bool) -> Self {
        let field = reset.field();
        let value = if asserted { field.mask() } else { 0 };
        #[allow(clippy::cast_possible_truncation)]
        let raw = field.set(u64::from(self.0), value) as u32;
        Self(raw)
    }

    /// All three reset fields at once
    #[must_use]
    pub fn set_all_buffer_resets(self, asserted: bool) -> Self {
        [BufferReset::EventIn, BufferReset::EventInB, BufferReset::EventOut]
            .into_iter()
            .fold(self, |reg, r| reg.set_buffer_reset(r, asserted))
    }
}

impl fmt::Display for ControlRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} [", self.0)?;
        let mut first = true;
        for e in Enable::ALL.iter().filter(|e| self.is_enabled(**e)) {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{e:?}")?;
            first = false;
        }
        f.write_str("]")
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

/// Status view selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSelector {
    /// Control register and chip revision
    Control,
    /// `clk` domain fifos and time position
    Clk,
    /// `clkb` domain fifos and time position
    Clkb,
    /// `clkhi` domain fifos, high time nibble, PLL lock
    ClkHi,
}

impl StatusSelector {
    /// Wire value
    pub const fn value(self) -> u8 {
        match self {
            Self::Control => select::CONTROL,
            Self::Clk => select::CLK,
            Self::Clkb => select::CLKB,
            Self::ClkHi => select::CLKHI,
        }
    }
}

impl TryFrom<u8> for StatusSelector {
    type Error = SpikeyError;

    fn try_from(selector: u8) -> Result<Self> {
        match selector {
            select::CONTROL => Ok(Self::Control),
            select::CLK => Ok(Self::Clk),
            select::CLKB => Ok(Self::Clkb),
            select::CLKHI => Ok(Self::ClkHi),
            _ => Err(SpikeyError::UnknownSelector { selector }),
        }
    }
}

/// One fifo status nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FifoStatus {
    /// Fifo full
    pub full: bool,
    /// Fifo almost full
    pub almost_full: bool,
    /// Fifo half full
    pub half_full: bool,
    /// Fifo overflowed
    pub error: bool,
}

impl FifoStatus {
    /// Decode a 4-bit nibble
    pub fn from_nibble(nibble: u64) -> Self {
        let bit = |b: u32| nibble & (1 << b) != 0;
        Self {
            full: bit(fifo::FULL),
            almost_full: bit(fifo::ALMOST_FULL),
            half_full: bit(fifo::HALF_FULL),
            error: bit(fifo::ERROR),
        }
    }

    /// Encode as a 4-bit nibble
    pub fn to_nibble(self) -> u64 {
        u64::from(self.full) << fifo::FULL
            | u64::from(self.almost_full) << fifo::ALMOST_FULL
            | u64::from(self.half_full) << fifo::HALF_FULL
            | u64::from(self.error) << fifo::ERROR
    }
}

/// Decoded status view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    /// Selector 0
    Control {
        /// Current register contents
        register: ControlRegister,
        /// Chip revision
        revision: u8,
    },
    /// Selector 1 or 2
    Clock {
        /// Which clock domain
        domain: StatusSelector,
        /// Fifo status, indexed by buffer
        fifos: Vec<FifoStatus>,
        /// Time position counter
        position: u8,
    },
    /// Selector 3
    ClockHigh {
        /// Fifo status, indexed by buffer
        fifos: Vec<FifoStatus>,
        /// Time position counter
        position: u8,
        /// Upper time nibble
        high_nibble: u8,
        /// PLL locked
        pll_locked: bool,
    },
}

/// Encode a control register write
///
/// The packet carries exactly `register`; bits not set here are written as
/// zero, not restored from a cached value.
pub fn build_control_write(chip_id: u8, register: ControlRegister) -> CommandPacket {
    let data = REGISTER.set(0, u64::from(register.raw()));
    CommandPacket::write(chip_id, Command::Control, data)
}

/// Encode a status read
pub fn build_status_read(chip_id: u8, selector: StatusSelector) -> CommandPacket {
    let data = SELECTOR.set(0, u64::from(selector.value()));
    CommandPacket::read(chip_id, Command::Control, data)
}

/// Fifo nibbles, nibble `i` reporting buffer `count - 1 - i`
fn decode_fifos(field: &Field, count: usize, data: u64) -> Vec<FifoStatus> {
    let nibbles = field.get(data);
    let mut fifos = vec![FifoStatus::default(); count];
    for (i, slot) in fifos.iter_mut().rev().enumerate() {
        *slot = FifoStatus::from_nibble((nibbles >> (i as u32 * fifo::NIBBLE_WIDTH)) & 0xF);
    }
    fifos
}

/// Encode fifo states (indexed by buffer) into the nibble field
pub(crate) fn encode_fifos(fifos: &[FifoStatus]) -> u64 {
    fifos
        .iter()
        .rev()
        .enumerate()
        .fold(0, |acc, (i, f)| acc | f.to_nibble() << (i as u32 * fifo::NIBBLE_WIDTH))
}

/// Decode the `ci` data of a status response
///
/// # Errors
///
/// `UnknownSelector` for selectors outside 0..=3.
#[allow(clippy::cast_possible_truncation)] // all fields are at most 8 bits wide
pub fn decode_status(selector: u8, data: u64) -> Result<StatusView> {
    let view = match StatusSelector::try_from(selector)? {
        StatusSelector::Control => StatusView::Control {
            register: ControlRegister(status::CONTROL.get(data) as u32),
            revision: status::REVISION.get(data) as u8,
        },
        domain @ (StatusSelector::Clk | StatusSelector::Clkb) => StatusView::Clock {
            domain,
            fifos: decode_fifos(&status::CLK_FIFOS, status::CLK_FIFO_COUNT, data),
            position: status::CLK_POSITION.get(data) as u8,
        },
        StatusSelector::ClkHi => StatusView::ClockHigh {
            fifos: decode_fifos(&status::CLKHI_FIFOS, status::CLKHI_FIFO_COUNT, data),
            position: status::CLKHI_POSITION.get(data) as u8,
            high_nibble: status::CLKHI_HIGH_NIBBLE.get(data) as u8,
            pll_locked: status::PLL_LOCKED.get(data) == 1,
        },
    };
    Ok(view)
}

// ── Link operations ──────────────────────────────────────────────────────────

/// Control register operations on a chip link
#[derive(Debug)]
pub struct ControlPort<'a, T: Transport> {
    link: &'a mut ChipLink<T>,
}

impl<'a, T: Transport> ControlPort<'a, T> {
    /// Borrow a link for control operations
    pub fn new(link: &'a mut ChipLink<T>) -> Self {
        Self { link }
    }

    /// Write the register
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write(&mut self, register: ControlRegister) -> Result<()> {
        debug!("control <- {register}");
        let packet = build_control_write(self.link.chip_id(), register);
        self.link.write(packet.command, packet.data)
    }

    /// Read one status view
    ///
    /// # Errors
    ///
    /// Transport and response errors.
    pub fn status(&mut self, selector: StatusSelector) -> Result<StatusView> {
        let packet = build_status_read(self.link.chip_id(), selector);
        let data = self.link.read(packet.command, packet.data)?;
        decode_status(selector.value(), data)
    }

    /// Current register contents and chip revision
    ///
    /// # Errors
    ///
    /// Transport and response errors.
    pub fn read(&mut self) -> Result<(ControlRegister, u8)> {
        match self.status(StatusSelector::Control)? {
            StatusView::Control { register, revision } => Ok((register, revision)),
            other => Err(SpikeyError::invalid_state(format!(
                "control view decoded as {other:?}"
            ))),
        }
    }

    /// Read the chip's register, apply `f`, write it back
    ///
    /// # Errors
    ///
    /// Transport and response errors.
    pub fn modify(
        &mut self,
        f: impl FnOnce(ControlRegister) -> ControlRegister,
    ) -> Result<ControlRegister> {
        let (current, _) = self.read()?;
        let next = f(current);
        if next != current {
            self.write(next)?;
        }
        Ok(next)
    }

    /// Pulse every buffer reset high, then low, keeping the other bits
    ///
    /// # Errors
    ///
    /// Transport and response errors.
    pub fn reset_buffers(&mut self) -> Result<ControlRegister> {
        let (current, _) = self.read()?;
        self.write(current.set_all_buffer_resets(true))?;
        let released = current.set_all_buffer_resets(false);
        self.write(released)?;
        Ok(released)
    }

    /// Power-up sequence: pulse buffer resets and start the analog clocks
    ///
    /// Leaves the parameter-RAM FSM disabled.
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn init(&mut self) -> Result<ControlRegister> {
        let running = ControlRegister::with_enables(&[Enable::AnalogClock, Enable::AnalogClockHigh]);
        self.write(running.set_all_buffer_resets(true))?;
        self.write(running)?;
        info!("chip {} control initialised: {running}", self.link.chip_id());
        Ok(running)
    }
}

/// Build a raw status response payload for a view (used by software chips)
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_status(view: &StatusView) -> u64 {
    match view {
        StatusView::Control { register, revision } => {
            let d = status::CONTROL.set(0, u64::from(register.raw()));
            bitfield::put(d, &status::REVISION, u64::from(*revision))
        }
        StatusView::Clock {
            fifos, position, ..
        } => {
            let d = status::CLK_FIFOS.set(0, encode_fifos(fifos));
            bitfield::put(d, &status::CLK_POSITION, u64::from(*position))
        }
        StatusView::ClockHigh {
            fifos,
            position,
            high_nibble,
            pll_locked,
        } => {
            let mut d = status::CLKHI_FIFOS.set(0, encode_fifos(fifos));
            d = status::CLKHI_POSITION.set(d, u64::from(*position));
            d = bitfield::put(d, &status::CLKHI_HIGH_NIBBLE, u64::from(*high_nibble));
            bitfield::put_flag(d, &status::PLL_LOCKED, *pll_locked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_register_has_only_reset_fields() {
        let r = ControlRegister::RESET;
        assert_eq!(r.raw(), 0xFFFF_FC00);
        assert!(Enable::ALL.iter().all(|e| !r.is_enabled(*e)));
        assert_eq!(r.buffer_reset(BufferReset::EventIn), 0xFF);
        assert_eq!(r.buffer_reset(BufferReset::EventInB), 0xFF);
        assert_eq!(r.buffer_reset(BufferReset::EventOut), 0x3F);
        assert_eq!(ControlRegister(0).set_all_buffer_resets(true), r);
    }

    #[test]
    fn write_carries_exactly_requested_bits() {
        let reg = ControlRegister::with_enables(&[Enable::ParamRam, Enable::AnalogClock]);
        let p = build_control_write(1, reg);
        assert_eq!(p.command, Command::Control);
        assert_eq!(p.data, (1 << 9 | 1 << 7) << 4);
    }

    #[test]
    fn status_read_selects_view() {
        let p = build_status_read(0, StatusSelector::ClkHi);
        assert_eq!(p.data, 3);
        assert_eq!(p.access, crate::packet::Access::Read);
    }

    #[test]
    fn unknown_selector() {
        assert!(matches!(
            decode_status(4, 0),
            Err(SpikeyError::UnknownSelector { selector: 4 })
        ));
    }

    #[test]
    fn control_view_decodes_register_and_revision() {
        let data = (0xFFFF_FC00u64 << 4) | (3 << 36);
        assert_eq!(
            decode_status(0, data).unwrap(),
            StatusView::Control {
                register: ControlRegister::RESET,
                revision: 3
            }
        );
    }

    #[test]
    fn fifo_nibbles_are_reported_per_buffer() {
        // nibble 0 (lowest) belongs to the last buffer
        let data = (0b0001u64 << 4) | (0b1000u64 << (4 + 28)) | (0x55 << 36);
        let StatusView::Clock { fifos, position, .. } = decode_status(1, data).unwrap() else {
            panic!("wrong view");
        };
        assert_eq!(position, 0x55);
        assert!(fifos[7].full && !fifos[7].error);
        assert!(fifos[0].error && !fifos[0].full);
        assert!(fifos[1..7].iter().all(|f| *f == FifoStatus::default()));
    }

    #[test]
    fn clock_high_view_roundtrip() {
        let view = StatusView::ClockHigh {
            fifos: vec![
                FifoStatus { half_full: true, ..FifoStatus::default() },
                FifoStatus::default(),
                FifoStatus { almost_full: true, full: true, ..FifoStatus::default() },
                FifoStatus::default(),
                FifoStatus::default(),
                FifoStatus { error: true, ..FifoStatus::default() },
            ],
            position: 200,
            high_nibble: 0xA,
            pll_locked: true,
        };
        assert_eq!(decode_status(3, encode_status(&view)).unwrap(), view);
    }

    #[test]
    fn nibble_roundtrip() {
        for n in 0..16u64 {
            assert_eq!(FifoStatus::from_nibble(n).to_nibble(), n);
        }
    }
}
