//! Event packet layout.
//!
//! One event packet carries up to three spikes. The four most significant
//! bits of the 8-bit system time are shared by all slots; each slot has its
//! own time LSBs, sub-clock time bin and 9-bit neuron address.
//!
//! ```text
//! slot  valid  bin   lsb   neuron
//!  0      6    13    17    21..29
//!  1      7    30    34    38..46
//!  2      8    47    51    55..63
//! shared time MSB: 9..12
//! ```

use crate::fields::Field;

/// Slots per event packet.
pub const EVENTS_PER_PACKET: usize = 3;

/// Width of the on-chip system time counter.
pub const SYSTEM_TIME_WIDTH: u32 = 8;
/// Width of the sub-clock time bin.
pub const TIME_BIN_WIDTH: u32 = 4;
/// Width of a neuron address.
pub const NEURON_ADDRESS_WIDTH: u32 = 9;

/// High half of the system time, shared by every slot.
pub const TIME_MSB: Field = Field::new("timemsb", 9, 4);

/// Fields of one event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFields {
    /// Slot holds an event.
    pub valid: Field,
    /// Sub-clock time bin.
    pub time_bin: Field,
    /// Low half of the system time.
    pub time_lsb: Field,
    /// Neuron address.
    pub neuron: Field,
}

/// Slot layouts in transmission order.
pub const SLOTS: [SlotFields; EVENTS_PER_PACKET] = [
    SlotFields {
        valid: Field::bit("valid0", 6),
        time_bin: Field::new("tb0", 13, 4),
        time_lsb: Field::new("lsb0", 17, 4),
        neuron: Field::new("na0", 21, 9),
    },
    SlotFields {
        valid: Field::bit("valid1", 7),
        time_bin: Field::new("tb1", 30, 4),
        time_lsb: Field::new("lsb1", 34, 4),
        neuron: Field::new("na1", 38, 9),
    },
    SlotFields {
        valid: Field::bit("valid2", 8),
        time_bin: Field::new("tb2", 47, 4),
        time_lsb: Field::new("lsb2", 51, 4),
        neuron: Field::new("na2", 55, 9),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{CHIP_ID, EVENT_FLAG, SPARE};

    #[test]
    fn event_fields_fill_the_word_without_overlap() {
        let mut covered = EVENT_FLAG.shifted_mask() | SPARE.shifted_mask() | CHIP_ID.shifted_mask();
        let mut all = vec![TIME_MSB];
        for s in SLOTS {
            all.extend([s.valid, s.time_bin, s.time_lsb, s.neuron]);
        }
        for f in all {
            assert!(f.is_valid());
            assert_eq!(covered & f.shifted_mask(), 0, "{} overlaps", f.name);
            covered |= f.shifted_mask();
        }
        assert_eq!(covered, u64::MAX);
    }

    #[test]
    fn split_time_adds_up_to_system_time() {
        assert_eq!(TIME_MSB.width + SLOTS[0].time_lsb.width, SYSTEM_TIME_WIDTH);
        assert_eq!(SLOTS[2].neuron.width, NEURON_ADDRESS_WIDTH);
        assert_eq!(SLOTS[1].time_bin.width, TIME_BIN_WIDTH);
    }
}
