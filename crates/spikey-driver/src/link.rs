//! Per-chip link: serialized command transactions over a [`Transport`]
//!
//! A `ChipLink` is the only path to a chip. Every operation takes
//! `&mut self`, so at most one transaction per chip is in flight; request
//! and response are paired purely by order. Independent chips get
//! independent links and can be driven from separate threads.

use crate::config::ChipConfig;
use crate::error::{Result, SpikeyError};
use crate::events::EventPacket;
use crate::packet::{check_chip_id, Command, CommandPacket, Frame, Word};
use crate::transport::Transport;
use spikey_chip::fields::mask;
use spikey_chip::packet::LOOPBACK_DATA;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Word counters of one link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Words sent
    pub sent: u64,
    /// Responses consumed
    pub responses: u64,
    /// Empty packets skipped
    pub empty_skipped: u64,
    /// Event packets queued while awaiting responses
    pub events_queued: u64,
    /// Responses addressed to other chips and dropped
    pub foreign_dropped: u64,
}

/// Serialized command channel to one chip
#[derive(Debug)]
pub struct ChipLink<T: Transport> {
    transport: T,
    chip_id: u8,
    max_skipped_words: usize,
    outstanding_reads: VecDeque<Command>,
    pending_events: VecDeque<EventPacket>,
    stats: LinkStats,
}

impl<T: Transport> ChipLink<T> {
    /// Link to `chip_id` with default settings
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if `chip_id` cannot address a chip.
    pub fn new(transport: T, chip_id: u8) -> Result<Self> {
        Self::with_config(transport, &ChipConfig::for_chip(chip_id)?)
    }

    /// Link configured from `config`
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if the configured chip id cannot address a chip.
    pub fn with_config(transport: T, config: &ChipConfig) -> Result<Self> {
        Ok(Self {
            transport,
            chip_id: check_chip_id(config.chip_id)?,
            max_skipped_words: config.max_skipped_words,
            outstanding_reads: VecDeque::new(),
            pending_events: VecDeque::new(),
            stats: LinkStats::default(),
        })
    }

    /// Addressed chip
    pub fn chip_id(&self) -> u8 {
        self.chip_id
    }

    /// Word counters
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Read requests sent but not yet answered
    pub fn outstanding(&self) -> usize {
        self.outstanding_reads.len()
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send_word(&mut self, word: Word) -> Result<()> {
        trace!("chip {} tx {word}", self.chip_id);
        self.transport.send(word)?;
        self.stats.sent += 1;
        Ok(())
    }

    /// Send a write command; the chip does not answer
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn write(&mut self, command: Command, data: u64) -> Result<()> {
        debug!("chip {} write {command} {data:#x}", self.chip_id);
        let word = CommandPacket::write(self.chip_id, command, data).encode()?;
        self.send_word(word)
    }

    /// Send a read request without waiting for the answer
    ///
    /// Pair each request with one [`Self::await_response`], in order.
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn request(&mut self, command: Command, data: u64) -> Result<()> {
        debug!("chip {} read {command} {data:#x}", self.chip_id);
        let word = CommandPacket::read(self.chip_id, command, data).encode()?;
        self.send_word(word)?;
        self.outstanding_reads.push_back(command);
        Ok(())
    }

    /// Wait for the response to the oldest outstanding read and return its data
    ///
    /// Empty packets are skipped and event packets are queued for
    /// [`Self::drain_events`].
    ///
    /// # Errors
    ///
    /// - `InvalidState` if no read is outstanding
    /// - `UnexpectedResponse` if the response belongs to another command
    /// - `CommandRejected` if the chip set the error flag
    /// - `NoResponse` after `max_skipped_words` non-response words
    pub fn await_response(&mut self) -> Result<u64> {
        let expected = self
            .outstanding_reads
            .pop_front()
            .ok_or_else(|| SpikeyError::invalid_state("no read outstanding"))?;
        let mut skipped = 0usize;
        loop {
            if skipped > self.max_skipped_words {
                warn!("chip {}: no {expected} response", self.chip_id);
                return Err(SpikeyError::NoResponse { skipped });
            }
            let word = self.transport.receive()?;
            trace!("chip {} rx {word}", self.chip_id);
            match Frame::from_word(word) {
                Frame::Empty => {
                    self.stats.empty_skipped += 1;
                    skipped += 1;
                }
                Frame::Event(w) => {
                    self.pending_events.push_back(EventPacket::from_word(w)?);
                    self.stats.events_queued += 1;
                    skipped += 1;
                }
                Frame::Command(c) if c.chip_id != self.chip_id => {
                    debug!("dropping response for chip {}", c.chip_id);
                    self.stats.foreign_dropped += 1;
                    skipped += 1;
                }
                Frame::Command(c) => {
                    self.stats.responses += 1;
                    if c.command != expected {
                        return Err(SpikeyError::UnexpectedResponse {
                            expected: expected.code(),
                            got: c.command.code(),
                        });
                    }
                    if c.error {
                        return Err(SpikeyError::CommandRejected {
                            command: expected.code(),
                        });
                    }
                    return Ok(c.data);
                }
            }
        }
    }

    /// Read request and its response
    ///
    /// # Errors
    ///
    /// See [`Self::await_response`].
    pub fn read(&mut self, command: Command, data: u64) -> Result<u64> {
        self.request(command, data)?;
        self.await_response()
    }

    /// Send an event packet to this chip
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn send_events(&mut self, packet: EventPacket) -> Result<()> {
        let word = packet.to_word(self.chip_id)?;
        self.send_word(word)
    }

    /// Take the event packets received while waiting for responses
    pub fn drain_events(&mut self) -> Vec<EventPacket> {
        self.pending_events.drain(..).collect()
    }

    /// Send the sync command
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub fn sync(&mut self) -> Result<()> {
        self.write(Command::Sync, 0)
    }

    /// Loopback test: the chip returns the bitwise inverse of `pattern`
    ///
    /// # Errors
    ///
    /// `LoopbackMismatch` if the answer is not the inverted pattern.
    pub fn loopback(&mut self, pattern: u64) -> Result<()> {
        let sent = pattern & LOOPBACK_DATA.mask();
        let received = self.read(Command::Loopback, sent)?;
        let expected = !sent & mask(LOOPBACK_DATA.width);
        if received & LOOPBACK_DATA.mask() != expected {
            return Err(SpikeyError::LoopbackMismatch { sent, received });
        }
        Ok(())
    }

    /// Forget outstanding reads and queued events
    ///
    /// Call after a device-reported error, before resynchronising the
    /// chip; responses still in flight are no longer paired.
    pub fn discard_pending(&mut self) {
        if !self.outstanding_reads.is_empty() {
            warn!(
                "chip {}: discarding {} outstanding read(s)",
                self.chip_id,
                self.outstanding_reads.len()
            );
        }
        self.outstanding_reads.clear();
        self.pending_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::build;

    /// Scripted transport: records sends, replays canned words
    #[derive(Debug, Default)]
    struct Script {
        sent: Vec<Word>,
        replies: VecDeque<Word>,
    }

    impl Transport for Script {
        fn send(&mut self, word: Word) -> Result<()> {
            self.sent.push(word);
            Ok(())
        }

        fn receive(&mut self) -> Result<Word> {
            self.replies
                .pop_front()
                .ok_or_else(|| SpikeyError::transport("script exhausted"))
        }
    }

    fn response(chip: u8, command: Command, error: bool, data: u64) -> Word {
        let mut p = CommandPacket::read(chip, command, data);
        p.error = error;
        p.encode().unwrap()
    }

    #[test]
    fn read_skips_empty_and_queues_events() {
        let event = build(1, true, 0x1).unwrap();
        let mut script = Script::default();
        script.replies.extend([
            Word::EMPTY,
            event,
            response(1, Command::Control, false, 0xABC),
        ]);
        let mut link = ChipLink::new(script, 1).unwrap();
        assert_eq!(link.read(Command::Control, 0).unwrap(), 0xABC);
        assert_eq!(link.drain_events().len(), 1);
        let stats = link.stats();
        assert_eq!((stats.empty_skipped, stats.events_queued, stats.responses), (1, 1, 1));
    }

    #[test]
    fn mismatched_response_is_reported() {
        let mut script = Script::default();
        script.replies.push_back(response(0, Command::ParamRam, false, 0));
        let mut link = ChipLink::new(script, 0).unwrap();
        let err = link.read(Command::Control, 0).unwrap_err();
        assert!(matches!(
            err,
            SpikeyError::UnexpectedResponse { expected: 6, got: 4 }
        ));
    }

    #[test]
    fn error_flag_rejects_command() {
        let mut script = Script::default();
        script.replies.push_back(response(0, Command::SynapseRam, true, 0));
        let mut link = ChipLink::new(script, 0).unwrap();
        assert!(matches!(
            link.read(Command::SynapseRam, 0),
            Err(SpikeyError::CommandRejected { command: 8 })
        ));
    }

    #[test]
    fn gives_up_after_skip_budget() {
        let mut script = Script::default();
        script.replies.extend(std::iter::repeat(Word::EMPTY).take(10));
        let config = ChipConfig {
            max_skipped_words: 3,
            ..ChipConfig::default()
        };
        let mut link = ChipLink::with_config(script, &config).unwrap();
        assert!(matches!(
            link.read(Command::Control, 0),
            Err(SpikeyError::NoResponse { skipped: 4 })
        ));
    }

    #[test]
    fn responses_pair_in_issue_order() {
        let mut script = Script::default();
        script.replies.extend([
            response(0, Command::Control, false, 1),
            response(0, Command::ParamRam, false, 2),
        ]);
        let mut link = ChipLink::new(script, 0).unwrap();
        link.request(Command::Control, 0).unwrap();
        link.request(Command::ParamRam, 0).unwrap();
        assert_eq!(link.outstanding(), 2);
        assert_eq!(link.await_response().unwrap(), 1);
        assert_eq!(link.await_response().unwrap(), 2);
        assert!(link.await_response().is_err());
    }

    #[test]
    fn write_encodes_chip_and_command() {
        let mut link = ChipLink::new(Script::default(), 2).unwrap();
        link.write(Command::ParamRam, 0x10).unwrap();
        let sent = CommandPacket::decode(link.transport().sent[0]).unwrap();
        assert_eq!(sent, CommandPacket::write(2, Command::ParamRam, 0x10));
    }

    #[test]
    fn empty_chip_id_cannot_be_linked() {
        assert!(ChipLink::new(Script::default(), 0xF).is_err());
    }
}
