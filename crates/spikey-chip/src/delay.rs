//! Link delay-line addressing.
//!
//! The LVDS receivers and transmitters of both link halves have a
//! programmable 3-bit delay per signal. Delay lines are written over the
//! link's sideband while the chip's `ci_mode` pin is asserted; the chip id
//! travels on the second link half.

use crate::fields::Field;

/// Number of addressable delay lines.
pub const LINE_COUNT: u32 = 36;
/// Lines per group.
pub const GROUP_SIZE: u32 = 9;
/// Power-up delay value.
pub const DEFAULT_VALUE: u8 = 3;
/// Largest programmable delay.
pub const MAX_VALUE: u8 = 7;

/// Line group bases.
pub mod group {
    /// Receiver, link half 0.
    pub const RX0: u32 = 0;
    /// Receiver, link half 1.
    pub const RX1: u32 = 9;
    /// Transmitter, link half 0.
    pub const TX0: u32 = 18;
    /// Transmitter, link half 1.
    pub const TX1: u32 = 27;
}

// ── Link words ───────────────────────────────────────────────────────────────

/// Line address on link half 0.
pub const LINK_ADDRESS: Field = Field::new("deladdr", 0, 6);
/// Delay value on link half 0.
pub const LINK_VALUE: Field = Field::new("delval", 6, 3);
/// Chip id on link half 1.
pub const LINK_CHIP_ID: Field = Field::new("delcid", 0, 4);

/// Slow-control register layout of the link controller.
pub mod slow_control {
    use crate::fields::Field;

    /// Line address.
    pub const ADDRESS: Field = Field::new("scdeladdr", 0, 6);
    /// Delay value.
    pub const VALUE: Field = Field::new("scdelval", 8, 3);
    /// Chip id.
    pub const CHIP_ID: Field = Field::new("scdelcid", 12, 4);
}

/// Mode pin levels required while delay lines are written.
pub mod address_mode {
    /// Chip reset pin.
    pub const RESET: bool = false;
    /// Command-interface mode pin.
    pub const CI_MODE: bool = true;
    /// PLL reset pin.
    pub const PLL_RESET: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_cover_all_lines() {
        assert_eq!(group::TX1 + GROUP_SIZE, LINE_COUNT);
        assert!(LINK_ADDRESS.fits(u64::from(LINE_COUNT - 1)));
        assert!(LINK_VALUE.fits(u64::from(MAX_VALUE)));
        assert!(!LINK_VALUE.fits(u64::from(MAX_VALUE) + 1));
    }

    #[test]
    fn slow_control_fields_are_disjoint() {
        assert!(!slow_control::ADDRESS.overlaps(&slow_control::VALUE));
        assert!(!slow_control::VALUE.overlaps(&slow_control::CHIP_ID));
    }
}
