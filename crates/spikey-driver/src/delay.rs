//! Delay-line calibration
//!
//! Each of the 36 link signals passes a programmable 3-bit delay. Writes
//! are only accepted while the chip is in address mode; this module
//! encodes and validates writes, and [`program_delays`] wraps a batch in
//! the mode-pin sequence.

use crate::error::{Result, SpikeyError};
use crate::transport::{ModePins, Sideband};
use spikey_chip::delay::{
    group, slow_control, GROUP_SIZE, LINE_COUNT, LINK_ADDRESS, LINK_CHIP_ID, LINK_VALUE,
    MAX_VALUE,
};
use spikey_chip::packet::CHIP_ID;
use std::fmt;
use tracing::{debug, info};

/// Signal group of a delay line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayGroup {
    /// Receive half 0 (clock + data)
    Rx0,
    /// Receive half 1
    Rx1,
    /// Transmit half 0
    Tx0,
    /// Transmit half 1
    Tx1,
}

impl DelayGroup {
    /// First line of the group
    pub const fn base(self) -> u32 {
        match self {
            Self::Rx0 => group::RX0,
            Self::Rx1 => group::RX1,
            Self::Tx0 => group::TX0,
            Self::Tx1 => group::TX1,
        }
    }
}

/// A validated delay-line address (`0..36`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelayLine(u8);

impl DelayLine {
    /// Validate a line address
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `line >= 36`.
    pub fn new(line: u32) -> Result<Self> {
        if line >= LINE_COUNT {
            return Err(SpikeyError::invalid_address("delay line", line, LINE_COUNT));
        }
        #[allow(clippy::cast_possible_truncation)] // < 36
        let line = line as u8;
        Ok(Self(line))
    }

    /// Line `offset` of `group`
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for `offset >= 9`.
    pub fn in_group(group: DelayGroup, offset: u32) -> Result<Self> {
        if offset >= GROUP_SIZE {
            return Err(SpikeyError::invalid_address("delay group offset", offset, GROUP_SIZE));
        }
        Self::new(group.base() + offset)
    }

    /// Line address
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Group the line belongs to
    pub const fn group(self) -> DelayGroup {
        match self.0 as u32 {
            l if l < group::RX1 => DelayGroup::Rx0,
            l if l < group::TX0 => DelayGroup::Rx1,
            l if l < group::TX1 => DelayGroup::Tx0,
            _ => DelayGroup::Tx1,
        }
    }

    /// Every line, in address order
    pub fn all() -> impl Iterator<Item = DelayLine> {
        (0..LINE_COUNT).filter_map(|l| Self::new(l).ok())
    }
}

impl fmt::Display for DelayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.group();
        write!(f, "{g:?}[{}]", self.index() - g.base())
    }
}

/// One validated delay write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWrite {
    /// Target line
    pub line: DelayLine,
    /// Delay value (0..=7)
    pub value: u8,
    /// Chip sub-address
    pub chip_id: u8,
}

impl DelayWrite {
    /// Link-controller word: address and value
    pub fn link_word(&self) -> u64 {
        let word = LINK_ADDRESS.set(0, u64::from(self.line.index()));
        LINK_VALUE.set(word, u64::from(self.value))
    }

    /// Link-controller word: chip sub-address
    pub fn chip_id_word(&self) -> u64 {
        LINK_CHIP_ID.set(0, u64::from(self.chip_id))
    }

    /// Combined slow-control word
    pub fn slow_control_word(&self) -> u64 {
        let mut word = slow_control::ADDRESS.set(0, u64::from(self.line.index()));
        word = slow_control::VALUE.set(word, u64::from(self.value));
        slow_control::CHIP_ID.set(word, u64::from(self.chip_id))
    }
}

/// Validate and encode one delay write
///
/// # Errors
///
/// `InvalidAddress` for `line >= 36`, `ValueOverflow` for `value > 7`,
/// `InvalidChipId` for a chip id wider than 4 bits.
pub fn set_delay(line: u32, value: u32, chip_id: u8) -> Result<DelayWrite> {
    let line = DelayLine::new(line)?;
    if value > u32::from(MAX_VALUE) {
        return Err(SpikeyError::ValueOverflow {
            value,
            max: u32::from(MAX_VALUE),
        });
    }
    if !CHIP_ID.fits(u64::from(chip_id)) {
        return Err(SpikeyError::InvalidChipId { chip_id });
    }
    #[allow(clippy::cast_possible_truncation)] // <= 7
    let value = value as u8;
    Ok(DelayWrite {
        line,
        value,
        chip_id,
    })
}

/// Program a batch of `(line, value)` pairs
///
/// Every write is validated before the pins change. Address mode is
/// asserted, the writes issued, and run mode restored; if a write fails
/// run mode is still restored before the error is returned.
///
/// # Errors
///
/// Validation errors (nothing sent), or sideband errors.
pub fn program_delays<S: Sideband>(
    sideband: &mut S,
    chip_id: u8,
    delays: &[(u32, u32)],
) -> Result<usize> {
    let writes = delays
        .iter()
        .map(|&(line, value)| set_delay(line, value, chip_id))
        .collect::<Result<Vec<_>>>()?;

    sideband.set_pins(ModePins::ADDRESS_MODE)?;
    let written = writes.iter().try_for_each(|w| {
        debug!("delay {} <- {} (chip {})", w.line, w.value, w.chip_id);
        sideband.write_delay(*w)
    });
    sideband.set_pins(ModePins::RUN)?;
    written?;

    info!("programmed {} delay line(s) on chip {chip_id}", writes.len());
    Ok(writes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        pins: Vec<ModePins>,
        writes: Vec<DelayWrite>,
        fail_writes: bool,
    }

    impl Sideband for Recorder {
        fn set_pins(&mut self, pins: ModePins) -> Result<()> {
            self.pins.push(pins);
            Ok(())
        }

        fn write_delay(&mut self, write: DelayWrite) -> Result<()> {
            if self.fail_writes {
                return Err(SpikeyError::transport("sideband down"));
            }
            self.writes.push(write);
            Ok(())
        }
    }

    #[test]
    fn validation() {
        assert!(set_delay(35, 7, 15).is_ok());
        assert!(matches!(
            set_delay(36, 0, 0),
            Err(SpikeyError::InvalidAddress { address: 36, limit: 36, .. })
        ));
        assert!(matches!(
            set_delay(0, 8, 0),
            Err(SpikeyError::ValueOverflow { value: 8, max: 7 })
        ));
        assert!(matches!(
            set_delay(0, 0, 16),
            Err(SpikeyError::InvalidChipId { chip_id: 16 })
        ));
    }

    #[test]
    fn word_layouts() {
        let w = set_delay(20, 5, 3).unwrap();
        assert_eq!(w.link_word(), 20 | (5 << 6));
        assert_eq!(w.chip_id_word(), 3);
        assert_eq!(w.slow_control_word(), 20 | (5 << 8) | (3 << 12));
    }

    #[test]
    fn groups() {
        assert_eq!(DelayLine::new(8).unwrap().group(), DelayGroup::Rx0);
        assert_eq!(DelayLine::new(9).unwrap().group(), DelayGroup::Rx1);
        assert_eq!(DelayLine::new(26).unwrap().group(), DelayGroup::Tx0);
        assert_eq!(DelayLine::new(35).unwrap().group(), DelayGroup::Tx1);
        assert_eq!(DelayLine::in_group(DelayGroup::Tx1, 8).unwrap().index(), 35);
        assert!(DelayLine::in_group(DelayGroup::Rx0, 9).is_err());
        assert_eq!(DelayLine::all().count(), 36);
        assert_eq!(DelayLine::new(19).unwrap().to_string(), "Tx0[1]");
    }

    #[test]
    fn batch_is_bracketed_by_address_mode() {
        let mut rec = Recorder::default();
        let n = program_delays(&mut rec, 2, &[(0, 3), (35, 7)]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(rec.pins, [ModePins::ADDRESS_MODE, ModePins::RUN]);
        assert!(rec.pins[0].ci_mode && !rec.pins[0].reset && !rec.pins[0].pll_reset);
        assert_eq!(rec.writes.len(), 2);
    }

    #[test]
    fn bad_entry_sends_nothing() {
        let mut rec = Recorder::default();
        assert!(program_delays(&mut rec, 0, &[(0, 3), (40, 1)]).is_err());
        assert!(rec.pins.is_empty() && rec.writes.is_empty());
    }

    #[test]
    fn failed_write_restores_run_mode() {
        let mut rec = Recorder {
            fail_writes: true,
            ..Recorder::default()
        };
        assert!(program_delays(&mut rec, 0, &[(1, 1)]).is_err());
        assert_eq!(rec.pins.last(), Some(&ModePins::RUN));
    }
}
