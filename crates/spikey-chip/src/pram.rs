//! Parameter RAM: bank layout, sub-commands and timing lookup table.
//!
//! The parameter RAM holds one entry per analog parameter refresh slot.
//! Each entry names a target parameter (`paraddr`), the DAC value to drive
//! it to and a lookup-table index selecting the write timing. The update
//! FSM cycles over the first `count` entries while enabled.
//!
//! ## Address space
//!
//! | Bank | Start | Size |
//! |------|------:|-----:|
//! | synapse left | 0 | 1024 |
//! | synapse right | 1024 | 1024 |
//! | neuron left | 2048 | 768 |
//! | neuron right | 2816 | 768 |
//! | vout left | 3584 | 64 |
//! | vout right | 3648 | 64 |
//! | bias | 3712 | 16 |
//! | output amp | 3728 | 16 |
//!
//! Starts are derived from the sizes; the order of [`Bank::ALL`] is part
//! of the hardware contract.
//!
//! All field positions are relative to `ci`.

use crate::fields::Field;

// ── Banks ────────────────────────────────────────────────────────────────────

/// Parameter-RAM bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Synapse drivers, left half.
    SynapseLeft,
    /// Synapse drivers, right half.
    SynapseRight,
    /// Neuron circuits, left half.
    NeuronLeft,
    /// Neuron circuits, right half.
    NeuronRight,
    /// Voltage generators, left half.
    VoutLeft,
    /// Voltage generators, right half.
    VoutRight,
    /// Global biases.
    Bias,
    /// Output amplifiers.
    OutputAmp,
}

impl Bank {
    /// Banks in address order.
    pub const ALL: [Bank; 8] = [
        Bank::SynapseLeft,
        Bank::SynapseRight,
        Bank::NeuronLeft,
        Bank::NeuronRight,
        Bank::VoutLeft,
        Bank::VoutRight,
        Bank::Bias,
        Bank::OutputAmp,
    ];

    /// Number of entries.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Bank::SynapseLeft | Bank::SynapseRight => SYNAPSE_BANK_SIZE / 2,
            Bank::NeuronLeft | Bank::NeuronRight => NEURON_BANK_SIZE / 2,
            Bank::VoutLeft | Bank::VoutRight => VOUT_BANK_SIZE / 2,
            Bank::Bias => BIAS_BANK_SIZE,
            Bank::OutputAmp => OUTAMP_BANK_SIZE,
        }
    }

    /// First address, the sum of all preceding bank sizes.
    #[must_use]
    pub const fn start(self) -> u32 {
        let mut start = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            if Self::ALL[i] as u8 == self as u8 {
                break;
            }
            start += Self::ALL[i].size();
            i += 1;
        }
        start
    }

    /// One past the last address.
    #[must_use]
    pub const fn end(self) -> u32 {
        self.start() + self.size()
    }

    /// Bank containing `address`, if any.
    #[must_use]
    pub const fn of(address: u32) -> Option<Bank> {
        let mut i = 0;
        while i < Self::ALL.len() {
            if address < Self::ALL[i].end() {
                return Some(Self::ALL[i]);
            }
            i += 1;
        }
        None
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Bank::SynapseLeft => "syn0",
            Bank::SynapseRight => "syn1",
            Bank::NeuronLeft => "neuron0",
            Bank::NeuronRight => "neuron1",
            Bank::VoutLeft => "voutl",
            Bank::VoutRight => "voutr",
            Bank::Bias => "bias",
            Bank::OutputAmp => "outamp",
        }
    }

    /// True for the vout banks, whose even entries are voltage parameters.
    #[must_use]
    pub const fn is_vout(self) -> bool {
        matches!(self, Bank::VoutLeft | Bank::VoutRight)
    }
}

/// Synapse driver entries (both halves).
pub const SYNAPSE_BANK_SIZE: u32 = 2048;
/// Neuron entries (both halves).
pub const NEURON_BANK_SIZE: u32 = 1536;
/// Voltage generator entries (both halves).
pub const VOUT_BANK_SIZE: u32 = 128;
/// Global bias entries.
pub const BIAS_BANK_SIZE: u32 = 16;
/// Output amplifier entries.
pub const OUTAMP_BANK_SIZE: u32 = 16;

/// One past the last parameter address.
pub const ADDRESS_SPACE_END: u32 = Bank::OutputAmp.end();

/// True when `address` is a voltage parameter (even vout entry).
#[must_use]
pub const fn is_voltage(address: u32) -> bool {
    match Bank::of(address) {
        Some(bank) => bank.is_vout() && address % 2 == 0,
        None => false,
    }
}

// ── Sub-commands ─────────────────────────────────────────────────────────────

/// Sub-command field.
pub const SUB_COMMAND: Field = Field::new("pr_cmd", 0, 4);

/// Sub-command codes.
pub mod sub {
    /// RAM entry access.
    pub const RAM: u64 = 0;
    /// Refresh period register.
    pub const PERIOD: u64 = 1;
    /// Timing lookup table.
    pub const LUT: u64 = 2;
    /// Address counter stop value.
    pub const COUNT: u64 = 3;
}

/// RAM entry fields.
pub mod ram {
    use crate::fields::Field;

    /// RAM slot being written or read.
    pub const SLOT: Field = Field::new("ramaddr", 4, 12);
    /// Target parameter address.
    pub const PARADDR: Field = Field::new("paraddr", 16, 12);
    /// DAC value.
    pub const VALUE: Field = Field::new("dacval", 28, 10);
    /// Timing lookup-table index.
    pub const LUT: Field = Field::new("lutadr", 40, 4);
}

/// Lookup-table entry fields.
pub mod lut {
    use crate::fields::Field;

    /// Normal write time exponent.
    pub const TIME: Field = Field::new("luttime", 4, 4);
    /// Boost write time exponent.
    pub const BOOST: Field = Field::new("lutboost", 8, 4);
    /// Repeat count.
    pub const REPEAT: Field = Field::new("lutrepeat", 12, 8);
    /// Step size.
    pub const STEP: Field = Field::new("lutstep", 20, 4);
    /// Entry index, shares the position of [`super::ram::LUT`].
    pub const INDEX: Field = Field::new("lutadr", 40, 4);

    /// Number of table entries.
    pub const ENTRIES: usize = 16;
}

/// Refresh period register (voltage output clock high cycles).
pub const PERIOD: Field = Field::new("period", 4, 8);
/// Address counter stop value, holds `count - 1`.
pub const COUNT: Field = Field::new("num", 4, 12);

// ── Defaults ─────────────────────────────────────────────────────────────────

/// Link clocks between consecutive parameter-RAM commands.
pub const DEFAULT_COMMAND_DELAY: u32 = 5;
/// Default refresh period.
pub const DEFAULT_PERIOD: u8 = 10;
/// Width of the analog current DACs.
pub const DAC_WIDTH: u32 = 10;

/// One timing lookup-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LutEntry {
    /// Normal write time exponent (`2^time` cycles).
    pub time: u8,
    /// Boost write time exponent (`2^boost` cycles).
    pub boost: u8,
    /// Repeat count, 0 means once.
    pub repeat: u8,
    /// Step size.
    pub step: u8,
}

impl LutEntry {
    /// Entry with the given exponents, no repeat or step.
    #[must_use]
    pub const fn new(time: u8, boost: u8) -> Self {
        Self { time, boost, repeat: 0, step: 0 }
    }

    /// Write cycles spent on one parameter using this entry.
    ///
    /// Exponents are taken modulo their 4-bit register fields.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        let fac = if self.repeat == 0 { 1 } else { self.repeat as u64 };
        let time = self.time as u64 & lut::TIME.mask();
        let boost = self.boost as u64 & lut::BOOST.mask();
        ((1u64 << time) + (1u64 << boost)) * fac
    }
}

/// Timing table written at initialisation: seven voltage timings, seven
/// boosted current timings, two spares.
pub const DEFAULT_LUT: [LutEntry; lut::ENTRIES] = [
    LutEntry::new(3, 0),
    LutEntry::new(5, 0),
    LutEntry::new(7, 0),
    LutEntry::new(9, 0),
    LutEntry::new(11, 0),
    LutEntry::new(13, 0),
    LutEntry::new(15, 0),
    LutEntry::new(0, 3),
    LutEntry::new(0, 5),
    LutEntry::new(0, 7),
    LutEntry::new(0, 9),
    LutEntry::new(0, 11),
    LutEntry::new(0, 13),
    LutEntry::new(0, 15),
    LutEntry::new(1, 0),
    LutEntry::new(1, 0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_starts_are_cumulative() {
        let starts: Vec<u32> = Bank::ALL.iter().map(|b| b.start()).collect();
        assert_eq!(starts, [0, 1024, 2048, 2816, 3584, 3648, 3712, 3728]);
        assert_eq!(ADDRESS_SPACE_END, 3744);
    }

    #[test]
    fn banks_are_increasing_and_disjoint() {
        for pair in Bank::ALL.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
            assert!(pair[0].start() < pair[1].start());
        }
        let total: u32 = Bank::ALL.iter().map(|b| b.size()).sum();
        assert_eq!(
            total,
            SYNAPSE_BANK_SIZE + NEURON_BANK_SIZE + VOUT_BANK_SIZE + BIAS_BANK_SIZE + OUTAMP_BANK_SIZE
        );
    }

    #[test]
    fn bank_lookup_at_boundaries() {
        assert_eq!(Bank::of(0), Some(Bank::SynapseLeft));
        assert_eq!(Bank::of(1023), Some(Bank::SynapseLeft));
        assert_eq!(Bank::of(1024), Some(Bank::SynapseRight));
        assert_eq!(Bank::of(3647), Some(Bank::VoutLeft));
        assert_eq!(Bank::of(3743), Some(Bank::OutputAmp));
        assert_eq!(Bank::of(3744), None);
    }

    #[test]
    fn voltage_parameters_are_even_vout_entries() {
        assert!(is_voltage(3584));
        assert!(!is_voltage(3585));
        assert!(is_voltage(3648));
        assert!(!is_voltage(3712));
        assert!(!is_voltage(0));
    }

    #[test]
    fn ram_fields_do_not_overlap() {
        let fields = [SUB_COMMAND, ram::SLOT, ram::PARADDR, ram::VALUE, ram::LUT];
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert!(!a.overlaps(b), "{} overlaps {}", a.name, b.name);
            }
            assert!(a.end() <= 53);
        }
        assert!(ram::SLOT.fits(u64::from(ADDRESS_SPACE_END - 1)));
    }

    #[test]
    fn lut_entry_cycles() {
        assert_eq!(LutEntry::new(3, 0).cycles(), 9);
        let repeated = LutEntry { time: 2, boost: 1, repeat: 3, step: 0 };
        assert_eq!(repeated.cycles(), 18);
        let wide = LutEntry { time: 67, boost: 64, repeat: 0, step: 0 };
        assert_eq!(wide.cycles(), 8 + 1);
    }
}
