//! Synapse-control command layout.
//!
//! The synapse controller owns the synapse weight RAM, the plasticity
//! lookup table and the correlation processing unit. Every command starts
//! with a 4-bit sub-command; positions below are relative to `ci`.

use crate::fields::Field;

/// Sub-command width; register contents start above it.
pub const COMMAND_WIDTH: u32 = 4;

/// Sub-command field.
pub const SUB_COMMAND: Field = Field::new("sc_cmd", 0, COMMAND_WIDTH);
/// Address field.
pub const ADDRESS: Field = Field::new("sc_addr", 4, 24);
/// Data field.
pub const DATA: Field = Field::new("sc_data", 28, 24);

/// Sub-command codes.
pub mod sub {
    /// Control / status register.
    pub const CTRL: u64 = 0;
    /// Timing register.
    pub const TIME: u64 = 1;
    /// Plasticity lookup table.
    pub const PLUT: u64 = 2;
    /// Synapse RAM access.
    pub const SYN: u64 = 3;
    /// Close the open row.
    pub const CLOSE: u64 = 4;
    /// Read correlation flags.
    pub const COR_READ: u64 = 5;
    /// Process correlation rows.
    pub const PCOR: u64 = 6;
    /// Process correlation rows, closing the row afterwards.
    pub const PCORC: u64 = 7;
}

// ── Addressing ───────────────────────────────────────────────────────────────

/// Synapse column inside the address field.
pub const COLUMN: Field = Field::new("col", 4, 6);
/// Synapse row inside the address field.
pub const ROW: Field = Field::new("row", 10, 8);

/// First row processed by `pcor`.
pub const PCOR_START_ROW: Field = Field::new("startrow", 4, 8);
/// Last row processed by `pcor`.
pub const PCOR_STOP_ROW: Field = Field::new("stoprow", 28, 8);

// ── Status register ──────────────────────────────────────────────────────────

/// Status / control register bits, as read back.
pub mod status {
    use crate::fields::Field;

    /// Command decode error.
    pub const CMERR: Field = Field::bit("cmerr", 4);
    /// Correlation processing done.
    pub const DONE: Field = Field::bit("done", 5);
    /// Automatic correlation processing active.
    pub const PCAUTO: Field = Field::bit("pcauto", 6);
    /// Continuous correlation processing.
    pub const PCCONT: Field = Field::bit("pccont", 7);
    /// DLL reset.
    pub const DLLRES: Field = Field::bit("dllres", 8);
    /// Neuron reset, active low.
    pub const NRESETB: Field = Field::bit("nresetb", 9);
    /// Row currently processed.
    pub const ROW: Field = Field::new("row", 12, 8);
    /// Start row of the running process.
    pub const START: Field = Field::new("start", 20, 8);
    /// Stop row of the running process.
    pub const STOP: Field = Field::new("stop", 28, 8);
}

// ── Timing register ──────────────────────────────────────────────────────────

/// Timing register fields.
pub mod time {
    use crate::fields::Field;

    /// Correlation sense delay.
    pub const SENSE: Field = Field::new("tsense", 4, 8);
    /// Precharge delay.
    pub const PRECHARGE: Field = Field::new("tpcsec", 12, 8);
    /// Automatic correlation processing period.
    pub const PCOR_PERIOD: Field = Field::new("tpcorperiod", 20, 12);
    /// Insert wait cycles before correlation readout.
    pub const READ_WAIT: Field = Field::bit("readwait", 32);
    /// Register width (excluding the sub-command).
    pub const WIDTH: u32 = 29;
}

// ── Plasticity lookup table ──────────────────────────────────────────────────

/// Weight resolution in bits.
pub const PLUT_RESOLUTION: u32 = 4;
/// Correlation priority encoders; each LUT word repeats the weight once per encoder.
pub const PRIORITY_ENCODERS: u32 = 6;
/// Table entries: 16 acausal followed by 16 causal.
pub const PLUT_ENTRIES: usize = 32;
/// Largest weight.
pub const WEIGHT_MAX: u8 = 15;
/// Table index inside the address field.
pub const PLUT_INDEX: Field = Field::new("plut_adr", 4, 5);

/// Link clocks to wait after a synapse RAM access.
pub const SYNAPSE_RAM_DELAY: u32 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_and_column_fill_low_address_bits() {
        assert_eq!(COLUMN.end(), ROW.pos);
        assert!(ROW.end() <= ADDRESS.end());
        assert_eq!(DATA.end(), 52);
    }

    #[test]
    fn status_bits_sit_above_sub_command() {
        for f in [status::CMERR, status::DONE, status::NRESETB, status::STOP] {
            assert!(f.pos >= COMMAND_WIDTH);
            assert!(f.end() <= 36);
        }
    }

    #[test]
    fn timing_fields_are_disjoint() {
        let fields = [time::SENSE, time::PRECHARGE, time::PCOR_PERIOD, time::READ_WAIT];
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
        assert_eq!(time::READ_WAIT.end() - COMMAND_WIDTH, time::WIDTH);
    }

    #[test]
    fn plut_word_fits_data_field() {
        assert_eq!(PRIORITY_ENCODERS * PLUT_RESOLUTION, DATA.width);
        assert!(PLUT_INDEX.fits(PLUT_ENTRIES as u64 - 1));
    }
}
