//! Packet framing: classify incoming words and build outgoing ones.

use crate::bitfield;
use crate::error::{Result, SpikeyError};
use spikey_chip::packet::{
    cmd, command, CHIP_ID, EMPTY_CHIP_ID, EVENT_FLAG, MAX_CHIP_ID, PAYLOAD,
};
use std::fmt;

/// One 64-bit link word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Word(u64);

impl Word {
    /// An empty packet: chip id 0xF, everything else zero
    pub const EMPTY: Word = Word((EMPTY_CHIP_ID as u64) << CHIP_ID.pos);

    /// Wrap a raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for Word {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<Word> for u64 {
    fn from(word: Word) -> Self {
        word.0
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::LowerHex for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Frame header and payload of a word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Chip id (0xF = empty)
    pub chip_id: u8,
    /// Event packet rather than command packet
    pub is_event: bool,
    /// 58-bit payload
    pub payload: u64,
}

impl Packet {
    /// Padding packet that must be skipped by consumers
    pub fn is_empty(&self) -> bool {
        self.chip_id == EMPTY_CHIP_ID
    }
}

/// Split a word into chip id, event flag and payload
pub fn classify(word: Word) -> Packet {
    let raw = word.raw();
    #[allow(clippy::cast_possible_truncation)] // 4-bit field
    let chip_id = CHIP_ID.get(raw) as u8;
    Packet {
        chip_id,
        is_event: EVENT_FLAG.get(raw) == 1,
        payload: PAYLOAD.get(raw),
    }
}

/// Assemble a word from chip id, event flag and payload
///
/// The payload is truncated to 58 bits. Chip id 0xF is accepted and
/// produces an empty packet.
///
/// # Errors
///
/// `InvalidChipId` if `chip_id` does not fit 4 bits.
pub fn build(chip_id: u8, is_event: bool, payload: u64) -> Result<Word> {
    if !CHIP_ID.fits(u64::from(chip_id)) {
        return Err(SpikeyError::InvalidChipId { chip_id });
    }
    let mut raw = bitfield::put_flag(0, &EVENT_FLAG, is_event);
    raw = CHIP_ID.set(raw, u64::from(chip_id));
    raw = bitfield::put(raw, &PAYLOAD, payload);
    Ok(Word(raw))
}

/// Reject ids that cannot address a real chip
///
/// # Errors
///
/// `InvalidChipId` for 0xF and anything wider than 4 bits.
pub fn check_chip_id(chip_id: u8) -> Result<u8> {
    if chip_id > MAX_CHIP_ID {
        return Err(SpikeyError::InvalidChipId { chip_id });
    }
    Ok(chip_id)
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Command interface targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Link synchronisation
    Sync,
    /// Inverting loopback
    Loopback,
    /// Parameter RAM controller
    ParamRam,
    /// Control / status register
    Control,
    /// Synapse RAM controller
    SynapseRam,
    /// Analog readout chains
    AnalogReadout,
    /// Event loopback module
    EventLoopback,
    /// No operation
    Dummy,
}

impl Command {
    /// Wire code (error flag clear)
    pub const fn code(self) -> u8 {
        match self {
            Self::Sync => cmd::SYNC,
            Self::Loopback => cmd::LOOPBACK,
            Self::ParamRam => cmd::PARAM_RAM,
            Self::Control => cmd::CONTROL,
            Self::SynapseRam => cmd::SYNAPSE_RAM,
            Self::AnalogReadout => cmd::ANALOG_READOUT,
            Self::EventLoopback => cmd::EVENT_LOOPBACK,
            Self::Dummy => cmd::DUMMY,
        }
    }

    /// Decode a 4-bit code, ignoring the error flag
    pub const fn from_code(code: u8) -> Self {
        match code & 0xF & !cmd::ERROR_FLAG {
            cmd::SYNC => Self::Sync,
            cmd::LOOPBACK => Self::Loopback,
            cmd::PARAM_RAM => Self::ParamRam,
            cmd::CONTROL => Self::Control,
            cmd::SYNAPSE_RAM => Self::SynapseRam,
            cmd::ANALOG_READOUT => Self::AnalogReadout,
            cmd::EVENT_LOOPBACK => Self::EventLoopback,
            _ => Self::Dummy,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "sync",
            Self::Loopback => "loopback",
            Self::ParamRam => "paramram",
            Self::Control => "control",
            Self::SynapseRam => "synram",
            Self::AnalogReadout => "areadout",
            Self::EventLoopback => "evloopback",
            Self::Dummy => "dummycmd",
        };
        f.write_str(name)
    }
}

/// Read or write direction of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Chip answers with a response packet
    Read,
    /// No response
    Write,
}

/// A decoded command packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    /// Addressed chip
    pub chip_id: u8,
    /// Direction
    pub access: Access,
    /// Target interface
    pub command: Command,
    /// Error flag (responses only)
    pub error: bool,
    /// 53-bit `ci` data
    pub data: u64,
}

impl CommandPacket {
    /// Write request
    pub fn write(chip_id: u8, command: Command, data: u64) -> Self {
        Self {
            chip_id,
            access: Access::Write,
            command,
            error: false,
            data,
        }
    }

    /// Read request
    pub fn read(chip_id: u8, command: Command, data: u64) -> Self {
        Self {
            chip_id,
            access: Access::Read,
            command,
            error: false,
            data,
        }
    }

    /// Encode into a link word
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if the chip id does not fit 4 bits.
    pub fn encode(&self) -> Result<Word> {
        let rwb = match self.access {
            Access::Read => command::READ,
            Access::Write => command::WRITE,
        };
        let code = self.command.code() | if self.error { cmd::ERROR_FLAG } else { 0 };
        let mut payload = 0;
        payload = command::READ_WRITE.set(payload, rwb);
        payload = command::CODE.set(payload, u64::from(code));
        payload = bitfield::put(payload, &command::DATA, self.data);
        build(self.chip_id, false, PAYLOAD.get(payload))
    }

    /// Decode a command word
    ///
    /// # Errors
    ///
    /// `InvalidState` if the word is an event packet.
    pub fn decode(word: Word) -> Result<Self> {
        let packet = classify(word);
        if packet.is_event {
            return Err(SpikeyError::invalid_state(
                "event packet where a command packet was expected",
            ));
        }
        let raw = word.raw();
        #[allow(clippy::cast_possible_truncation)] // 4-bit field
        let code = command::CODE.get(raw) as u8;
        Ok(Self {
            chip_id: packet.chip_id,
            access: if command::READ_WRITE.get(raw) == command::READ {
                Access::Read
            } else {
                Access::Write
            },
            command: Command::from_code(code),
            error: code & cmd::ERROR_FLAG != 0,
            data: command::DATA.get(raw),
        })
    }
}

/// Classified word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Padding, chip id 0xF
    Empty,
    /// Command request or response
    Command(CommandPacket),
    /// Event packet (raw word, decode with [`crate::EventPacket`])
    Event(Word),
}

impl Frame {
    /// Classify a received word
    pub fn from_word(word: Word) -> Self {
        let packet = classify(word);
        if packet.is_empty() {
            Self::Empty
        } else if packet.is_event {
            Self::Event(word)
        } else {
            // a non-event word always decodes
            match CommandPacket::decode(word) {
                Ok(c) => Self::Command(c),
                Err(_) => Self::Event(word),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_classify_roundtrip() {
        let payloads = [0, 1, 0x2AA_AAAA_AAAA_AAAA, (1 << 58) - 1];
        for chip_id in 0..=15u8 {
            for is_event in [false, true] {
                for &payload in &payloads {
                    let w = build(chip_id, is_event, payload).unwrap();
                    assert_eq!(
                        classify(w),
                        Packet { chip_id, is_event, payload }
                    );
                }
            }
        }
    }

    #[test]
    fn wide_chip_id_is_rejected() {
        assert!(matches!(
            build(16, false, 0),
            Err(SpikeyError::InvalidChipId { chip_id: 16 })
        ));
        assert!(check_chip_id(15).is_err());
        assert_eq!(check_chip_id(14).unwrap(), 14);
    }

    #[test]
    fn empty_packet_is_recognised() {
        assert!(classify(Word::EMPTY).is_empty());
        assert_eq!(Frame::from_word(Word::EMPTY), Frame::Empty);
        let w = build(EMPTY_CHIP_ID, true, 0x1234).unwrap();
        assert_eq!(Frame::from_word(w), Frame::Empty);
    }

    #[test]
    fn command_layout_matches_hardware_positions() {
        let w = CommandPacket::read(3, Command::Control, 0x1).encode().unwrap();
        // chip 3 @2, read @6, cmd 6 @7, data 1 @11
        assert_eq!(w.raw(), (3 << 2) | (1 << 6) | (6 << 7) | (1 << 11));
    }

    #[test]
    fn command_roundtrip_with_error_flag() {
        let mut p = CommandPacket::write(2, Command::ParamRam, (1 << 53) - 1);
        p.error = true;
        let back = CommandPacket::decode(p.encode().unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn error_flag_does_not_change_command() {
        for c in [
            Command::Sync,
            Command::Loopback,
            Command::ParamRam,
            Command::Control,
            Command::SynapseRam,
            Command::AnalogReadout,
            Command::EventLoopback,
            Command::Dummy,
        ] {
            assert_eq!(Command::from_code(c.code()), c);
            assert_eq!(Command::from_code(c.code() | cmd::ERROR_FLAG), c);
        }
    }

    #[test]
    fn decode_rejects_event_words() {
        let w = build(0, true, 0).unwrap();
        assert!(CommandPacket::decode(w).is_err());
        assert_eq!(Frame::from_word(w), Frame::Event(w));
    }
}
