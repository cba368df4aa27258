//! Link packet framing and command packet layout.
//!
//! ```text
//!  63                                  11 10    7  6  5    2  1  0
//! ┌──────────────────────────────────────┬───────┬───┬──────┬───┬───┐
//! │ ci (command data, 53 bits)           │ cmd   │rwb│chipid│spr│evp│
//! └──────────────────────────────────────┴───────┴───┴──────┴───┴───┘
//!  └──────────────── payload (58 bits, starts at 6) ───────┘
//! ```
//!
//! Bits 8 and 17 of the serialized 16-bit link words carry idle/CTL
//! framing. They are handled by the physical link and never appear as
//! separate payload fields.

use crate::fields::Field;

// ── Frame ────────────────────────────────────────────────────────────────────

/// 1 = event packet, 0 = command packet.
pub const EVENT_FLAG: Field = Field::bit("eventp", 0);
/// Reserved.
pub const SPARE: Field = Field::bit("spare", 1);
/// Destination / source chip.
pub const CHIP_ID: Field = Field::new("chipid", 2, 4);
/// Everything above the frame header.
pub const PAYLOAD: Field = Field::new("payload", 6, 58);

/// Frame fields in ascending bit order.
pub const FRAME_FIELDS: [Field; 4] = [EVENT_FLAG, SPARE, CHIP_ID, PAYLOAD];

/// Link-level idle/CTL framing bit positions.
pub const LINK_FRAMING_BITS: [u32; 2] = [8, 17];

// ── Chip addressing ──────────────────────────────────────────────────────────

/// Chip id marking an empty (padding) packet on any interface.
pub const EMPTY_CHIP_ID: u8 = 0xF;
/// Highest chip id that addresses a real chip.
pub const MAX_CHIP_ID: u8 = 14;

// ── Command packets ──────────────────────────────────────────────────────────

/// Command packet fields (absolute positions).
pub mod command {
    use crate::fields::Field;

    /// Read (1) / write (0) flag.
    pub const READ_WRITE: Field = Field::bit("cmdrwb", 6);
    /// Command code; bit 0 doubles as the error flag on responses.
    pub const CODE: Field = Field::new("cmd", 7, 4);
    /// Command data (`ci`), 53 bits up to bit 63.
    pub const DATA: Field = Field::new("ci", 11, 53);

    /// Command fields in ascending bit order.
    pub const FIELDS: [Field; 3] = [READ_WRITE, CODE, DATA];

    /// `cmdrwb` value for reads.
    pub const READ: u64 = 1;
    /// `cmdrwb` value for writes.
    pub const WRITE: u64 = 0;
}

/// Command codes carried in [`command::CODE`].
pub mod cmd {
    /// Link synchronisation.
    pub const SYNC: u8 = 0;
    /// Error flag, set by the chip on a rejected command.
    pub const ERROR_FLAG: u8 = 1;
    /// Inverting data loopback.
    pub const LOOPBACK: u8 = 2;
    /// Parameter RAM controller.
    pub const PARAM_RAM: u8 = 4;
    /// Control / status register.
    pub const CONTROL: u8 = 6;
    /// Synapse RAM controller.
    pub const SYNAPSE_RAM: u8 = 8;
    /// Analog readout chains.
    pub const ANALOG_READOUT: u8 = 10;
    /// Event loopback module.
    pub const EVENT_LOOPBACK: u8 = 12;
    /// No operation.
    pub const DUMMY: u8 = 14;
}

/// Loopback command data (relative to `ci`). The chip answers with the
/// bitwise inverse of these 53 bits.
pub const LOOPBACK_DATA: Field = Field::new("lbdata", 0, 53);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_fields_tile_the_word() {
        let mut covered = 0u64;
        for f in FRAME_FIELDS {
            assert!(f.is_valid(), "{} out of word", f.name);
            assert_eq!(covered & f.shifted_mask(), 0, "{} overlaps", f.name);
            covered |= f.shifted_mask();
        }
        assert_eq!(covered, u64::MAX);
    }

    #[test]
    fn command_fields_tile_the_payload() {
        let mut covered = 0u64;
        for f in command::FIELDS {
            assert_eq!(covered & f.shifted_mask(), 0, "{} overlaps", f.name);
            covered |= f.shifted_mask();
        }
        assert_eq!(covered, PAYLOAD.shifted_mask());
        assert_eq!(command::DATA.msb(), 63);
    }

    #[test]
    fn empty_chip_id_is_outside_addressable_range() {
        assert!(EMPTY_CHIP_ID > MAX_CHIP_ID);
        assert!(CHIP_ID.fits(u64::from(EMPTY_CHIP_ID)));
    }
}
