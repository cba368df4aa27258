//! Control register bits and status views.
//!
//! The control register is written with the `control` command
//! (`ci = creg << 4`). Reads return one of four status views, chosen by a
//! selector in the low bits of `ci`. All positions in this module are
//! relative to `ci`.

use crate::fields::Field;

/// Width of the control register.
pub const WIDTH: u32 = 32;

/// Register value position inside `ci` for writes and the control view.
pub const REGISTER: Field = Field::new("creg", 4, WIDTH);

/// Status view selector inside `ci` for reads.
pub const SELECTOR: Field = Field::new("cr_sel", 0, 4);

// ── Register bits ────────────────────────────────────────────────────────────

/// Enable bit positions inside the register.
pub mod bits {
    /// Error output enable.
    pub const ERR_OUT_EN: u32 = 5;
    /// Early debug output.
    pub const EARLY_DEBUG: u32 = 6;
    /// Analog clock enable.
    pub const ANA_CLK_EN: u32 = 7;
    /// Analog high-frequency clock enable.
    pub const ANA_CLK_HI_EN: u32 = 8;
    /// Parameter-RAM update FSM enable.
    pub const PRAM_EN: u32 = 9;
}

/// Event input buffer resets, one bit per buffer.
pub const EVENT_IN_RESET: Field = Field::new("ein_rst", 10, 8);
/// Second event input buffer bank resets.
pub const EVENT_IN_B_RESET: Field = Field::new("einb_rst", 18, 8);
/// Event output buffer resets.
pub const EVENT_OUT_RESET: Field = Field::new("eout_rst", 26, 6);

/// Power-up value: every buffer reset asserted, all enables off.
pub const RESET_VALUE: u32 = 0xFFFF_FC00;

/// Clock cycles to wait after toggling buffer resets.
pub const FIFO_RESET_DELAY: u32 = 5;

// ── Status views ─────────────────────────────────────────────────────────────

/// Status view selector values.
pub mod select {
    /// Control register and chip revision.
    pub const CONTROL: u8 = 0;
    /// `clk` domain fifo status.
    pub const CLK: u8 = 1;
    /// `clkb` domain fifo status.
    pub const CLKB: u8 = 2;
    /// `clkhi` domain fifo status, PLL lock.
    pub const CLKHI: u8 = 3;
}

/// Response layouts of the four status views.
pub mod status {
    use crate::fields::Field;

    /// Control view: register value.
    pub const CONTROL: Field = super::REGISTER;
    /// Control view: chip revision.
    pub const REVISION: Field = Field::new("revision", 36, 4);

    /// `clk`/`clkb` views: fifo nibbles.
    pub const CLK_FIFOS: Field = Field::new("clk_fifos", 4, 32);
    /// `clk`/`clkb` views: system time position.
    pub const CLK_POSITION: Field = Field::new("clk_pos", 36, 7);
    /// Fifos reported by the `clk`/`clkb` views.
    pub const CLK_FIFO_COUNT: usize = 8;

    /// `clkhi` view: fifo nibbles.
    pub const CLKHI_FIFOS: Field = Field::new("clkhi_fifos", 4, 24);
    /// `clkhi` view: position counter.
    pub const CLKHI_POSITION: Field = Field::new("clkhi_pos", 28, 8);
    /// `clkhi` view: upper time nibble.
    pub const CLKHI_HIGH_NIBBLE: Field = Field::new("clkhi_hi", 36, 4);
    /// `clkhi` view: PLL locked.
    pub const PLL_LOCKED: Field = Field::bit("pll_locked", 40);
    /// Fifos reported by the `clkhi` view.
    pub const CLKHI_FIFO_COUNT: usize = 6;
}

/// Bits of one fifo status nibble.
pub mod fifo {
    /// Nibble width.
    pub const NIBBLE_WIDTH: u32 = 4;
    /// Fifo full.
    pub const FULL: u32 = 0;
    /// Fifo almost full.
    pub const ALMOST_FULL: u32 = 1;
    /// Fifo half full.
    pub const HALF_FULL: u32 = 2;
    /// Fifo error (overflow).
    pub const ERROR: u32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_value_is_exactly_the_reset_fields() {
        let resets = EVENT_IN_RESET.shifted_mask()
            | EVENT_IN_B_RESET.shifted_mask()
            | EVENT_OUT_RESET.shifted_mask();
        assert_eq!(u64::from(RESET_VALUE), resets);
        assert_eq!(EVENT_OUT_RESET.end(), WIDTH);
    }

    #[test]
    fn enable_bits_sit_below_reset_fields() {
        for bit in [
            bits::ERR_OUT_EN,
            bits::EARLY_DEBUG,
            bits::ANA_CLK_EN,
            bits::ANA_CLK_HI_EN,
            bits::PRAM_EN,
        ] {
            assert!(bit < EVENT_IN_RESET.pos);
            assert_eq!(RESET_VALUE & (1 << bit), 0);
        }
    }

    #[test]
    fn status_views_fit_in_command_data() {
        for f in [
            status::REVISION,
            status::CLK_POSITION,
            status::CLKHI_HIGH_NIBBLE,
            status::PLL_LOCKED,
        ] {
            assert!(f.end() <= 53, "{} beyond ci", f.name);
        }
        assert_eq!(
            status::CLK_FIFOS.width,
            status::CLK_FIFO_COUNT as u32 * fifo::NIBBLE_WIDTH
        );
    }
}
