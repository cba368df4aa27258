// SPDX-License-Identifier: AGPL-3.0-only

//! Software (virtual) Spikey chip
//!
//! Implements [`Transport`] and [`Sideband`] by answering commands the way
//! the chip's command interface does. No analog behaviour is modelled:
//! parameter values, synapse weights and timing registers are stored and
//! echoed back, which is enough to exercise every protocol path in CI.
//!
//! ## What it models
//!
//! | Target | Behaviour |
//! |--------|-----------|
//! | loopback | answers the inverted 53-bit pattern |
//! | control | register (power-up `0xFFFF_FC00`), four status views |
//! | parameter RAM | slots, timing LUT, period, count |
//! | synapse control | RAM, plasticity LUT, timing, ctrl, status, processing |
//! | delay lines | 36 values per chip, writable only in address mode |
//! | events | packets sent to the chip are recorded |
//!
//! ## Fault injection
//!
//! - [`VirtualChip::flip_next_response`]: XOR one data bit of the next answer
//! - [`VirtualChip::reject_response`]: error flag on a later answer
//! - [`VirtualChip::stick_param_bits`]: parameter-RAM bits stuck at one
//! - [`VirtualChip::inject_cmerr`]: latch the synapse decode-error bit
//! - [`VirtualChip::inject_event`] / [`VirtualChip::inject_empty`]: traffic
//!   delivered ahead of the next answer

use crate::control::{encode_status, ControlRegister, FifoStatus, StatusSelector, StatusView};
use crate::delay::DelayWrite;
use crate::error::{Result, SpikeyError};
use crate::events::EventPacket;
use crate::packet::{classify, Command, CommandPacket, Frame, Word};
use crate::pram::param_mask;
use crate::synapse::SynapseStatus;
use crate::transport::{ModePins, Sideband, Transport};
use spikey_chip::control::{status, REGISTER, SELECTOR};
use spikey_chip::delay::{DEFAULT_VALUE, LINE_COUNT};
use spikey_chip::fields::mask;
use spikey_chip::packet::{command, LOOPBACK_DATA};
use spikey_chip::pram::{self, lut, ram, ADDRESS_SPACE_END, COUNT, PERIOD};
use spikey_chip::synapse::{
    self, time, COLUMN, DATA, PCOR_START_ROW, PCOR_STOP_ROW, PLUT_ENTRIES, PLUT_INDEX, ROW,
};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Chip revision reported by default
pub const DEFAULT_REVISION: u8 = 3;

/// Synapse controller model
#[derive(Debug, Clone)]
struct SynapseModel {
    ram: HashMap<(u8, u8), u32>,
    correlation: HashMap<(u8, u8), u32>,
    plut: [u32; PLUT_ENTRIES],
    timing: u64,
    status: SynapseStatus,
    processing_polls: usize,
    polls_left: Option<usize>,
}

impl Default for SynapseModel {
    fn default() -> Self {
        Self {
            ram: HashMap::new(),
            correlation: HashMap::new(),
            plut: [0; PLUT_ENTRIES],
            timing: 0,
            status: SynapseStatus::default(),
            processing_polls: 0,
            polls_left: None,
        }
    }
}

/// Software model of one chip on a dedicated link
#[derive(Debug, Clone)]
pub struct VirtualChip {
    chip_id: u8,
    revision: u8,
    control: ControlRegister,
    clk_fifos: [FifoStatus; status::CLK_FIFO_COUNT],
    clkb_fifos: [FifoStatus; status::CLK_FIFO_COUNT],
    clkhi_fifos: [FifoStatus; status::CLKHI_FIFO_COUNT],
    time_position: u8,
    pll_locked: bool,
    param_slots: Vec<u64>,
    lut: [u64; lut::ENTRIES],
    period: u64,
    count: u64,
    synapse: SynapseModel,
    pins: ModePins,
    delays: [u8; LINE_COUNT as usize],
    events: Vec<EventPacket>,
    received: u64,
    injected: VecDeque<Word>,
    responses: VecDeque<Word>,
    flip_bit: Option<u32>,
    reject_in: Option<usize>,
    stuck_bits: u64,
}

impl VirtualChip {
    /// Power-up state for chip `chip_id`
    pub fn new(chip_id: u8) -> Self {
        debug!("virtual chip {chip_id} powered up");
        Self {
            chip_id,
            revision: DEFAULT_REVISION,
            control: ControlRegister::RESET,
            clk_fifos: [FifoStatus::default(); status::CLK_FIFO_COUNT],
            clkb_fifos: [FifoStatus::default(); status::CLK_FIFO_COUNT],
            clkhi_fifos: [FifoStatus::default(); status::CLKHI_FIFO_COUNT],
            time_position: 0,
            pll_locked: true,
            param_slots: vec![0; ADDRESS_SPACE_END as usize],
            lut: [0; lut::ENTRIES],
            period: 0,
            count: 0,
            synapse: SynapseModel::default(),
            pins: ModePins::RUN,
            delays: [DEFAULT_VALUE; LINE_COUNT as usize],
            events: Vec::new(),
            received: 0,
            injected: VecDeque::new(),
            responses: VecDeque::new(),
            flip_bit: None,
            reject_in: None,
            stuck_bits: 0,
        }
    }

    /// Report a different chip revision
    #[must_use]
    pub fn with_revision(mut self, revision: u8) -> Self {
        self.revision = revision;
        self
    }

    /// Number of status reads a correlation run takes before `done`
    #[must_use]
    pub fn with_processing_polls(mut self, polls: usize) -> Self {
        self.synapse.processing_polls = polls;
        self
    }

    /// Chip id this model answers to
    pub fn chip_id(&self) -> u8 {
        self.chip_id
    }

    /// Current control register
    pub fn control(&self) -> ControlRegister {
        self.control
    }

    /// Power-on reset: all state back to defaults, pending traffic dropped
    pub fn power_cycle(&mut self) {
        *self = Self::new(self.chip_id)
            .with_revision(self.revision)
            .with_processing_polls(self.synapse.processing_polls);
    }

    /// Set one fifo status reported by a status view
    ///
    /// # Errors
    ///
    /// `InvalidAddress` if `index` is not a fifo of `domain`, `InvalidState`
    /// for the control view.
    pub fn set_fifo(
        &mut self,
        domain: StatusSelector,
        index: usize,
        fifo: FifoStatus,
    ) -> Result<()> {
        let fifos: &mut [FifoStatus] = match domain {
            StatusSelector::Clk => &mut self.clk_fifos,
            StatusSelector::Clkb => &mut self.clkb_fifos,
            StatusSelector::ClkHi => &mut self.clkhi_fifos,
            StatusSelector::Control => {
                return Err(SpikeyError::invalid_state("control view has no fifos"))
            }
        };
        let limit = fifos.len();
        let slot = fifos.get_mut(index).ok_or_else(|| {
            #[allow(clippy::cast_possible_truncation)]
            let (index, limit) = (index as u32, limit as u32);
            SpikeyError::invalid_address("fifo", index, limit)
        })?;
        *slot = fifo;
        Ok(())
    }

    /// Set the time position counter and PLL lock state
    pub fn set_clock(&mut self, position: u8, pll_locked: bool) {
        self.time_position = position;
        self.pll_locked = pll_locked;
    }

    /// Preload correlation flags returned by `cor_read`
    pub fn set_correlation(&mut self, row: u8, col: u8, flags: u32) {
        self.synapse.correlation.insert((row, col), flags);
    }

    /// Value of a delay line
    pub fn delay(&self, line: u32) -> Option<u8> {
        self.delays.get(line as usize).copied()
    }

    /// Mode pins as last driven
    pub fn pins(&self) -> ModePins {
        self.pins
    }

    /// Raw parameter-RAM slot
    pub fn param_slot(&self, address: u32) -> Option<u64> {
        self.param_slots.get(address as usize).copied()
    }

    /// Slot count as stored (`n - 1` field)
    pub fn count_field(&self) -> u64 {
        self.count
    }

    /// Event packets received from the host
    pub fn events(&self) -> &[EventPacket] {
        &self.events
    }

    /// Words received from the host
    pub fn received(&self) -> u64 {
        self.received
    }

    /// XOR data bit `bit` of the next response
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `bit` lies outside the command data field.
    pub fn flip_next_response(&mut self, bit: u32) -> Result<()> {
        if bit >= command::DATA.width {
            return Err(SpikeyError::OutOfRange { pos: bit, width: 1 });
        }
        self.flip_bit = Some(bit);
        Ok(())
    }

    /// Set the error flag on the `nth` response from now (0 = next)
    pub fn reject_response(&mut self, nth: usize) {
        self.reject_in = Some(nth);
    }

    /// Parameter-RAM data bits stuck at one on every slot write
    pub fn stick_param_bits(&mut self, bits: u64) {
        self.stuck_bits = bits & param_mask();
    }

    /// Latch the synapse controller's decode-error bit
    pub fn inject_cmerr(&mut self) {
        self.synapse.status.cmerr = true;
    }

    /// Deliver an event packet before the next response
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if the model's chip id is not addressable.
    pub fn inject_event(&mut self, packet: EventPacket) -> Result<()> {
        self.injected.push_back(packet.to_word(self.chip_id)?);
        Ok(())
    }

    /// Deliver `n` empty packets before the next response
    pub fn inject_empty(&mut self, n: usize) {
        self.injected.extend(std::iter::repeat(Word::EMPTY).take(n));
    }

    // ── Command handling ─────────────────────────────────────────────────────

    fn respond(&mut self, command: Command, data: u64, error: bool) {
        let data = match self.flip_bit.take() {
            Some(bit) => data ^ (1u64 << bit),
            None => data,
        };
        let rejected = match self.reject_in {
            Some(0) => {
                self.reject_in = None;
                true
            }
            Some(n) => {
                self.reject_in = Some(n - 1);
                false
            }
            None => false,
        };
        let mut packet = CommandPacket::read(self.chip_id, command, data);
        packet.error = error || rejected;
        match packet.encode() {
            Ok(word) => self.responses.push_back(word),
            Err(e) => debug!("virtual chip cannot encode response: {e}"),
        }
    }

    fn handle(&mut self, packet: CommandPacket) {
        let read = packet.access == crate::packet::Access::Read;
        let data = packet.data;
        match packet.command {
            Command::Sync | Command::Dummy => {}
            Command::Loopback => {
                if read {
                    let inverted = !data & mask(LOOPBACK_DATA.width);
                    self.respond(Command::Loopback, inverted, false);
                }
            }
            Command::Control => self.handle_control(read, data),
            Command::ParamRam => self.handle_param_ram(read, data),
            Command::SynapseRam => self.handle_synapse(read, data),
            Command::AnalogReadout | Command::EventLoopback => {
                if read {
                    self.respond(packet.command, data, true);
                }
            }
        }
    }

    fn handle_control(&mut self, read: bool, data: u64) {
        if !read {
            #[allow(clippy::cast_possible_truncation)] // 32-bit field
            let raw = REGISTER.get(data) as u32;
            self.control = ControlRegister::from_raw(raw);
            return;
        }
        #[allow(clippy::cast_possible_truncation)] // 4-bit field
        let selector = SELECTOR.get(data) as u8;
        let view = match StatusSelector::try_from(selector) {
            Ok(StatusSelector::Control) => StatusView::Control {
                register: self.control,
                revision: self.revision,
            },
            Ok(domain @ StatusSelector::Clk) => StatusView::Clock {
                domain,
                fifos: self.clk_fifos.to_vec(),
                position: self.time_position & 0x7F,
            },
            Ok(domain @ StatusSelector::Clkb) => StatusView::Clock {
                domain,
                fifos: self.clkb_fifos.to_vec(),
                position: self.time_position & 0x7F,
            },
            Ok(StatusSelector::ClkHi) => StatusView::ClockHigh {
                fifos: self.clkhi_fifos.to_vec(),
                position: self.time_position,
                high_nibble: self.time_position >> 4,
                pll_locked: self.pll_locked,
            },
            Err(_) => {
                self.respond(Command::Control, data, true);
                return;
            }
        };
        self.respond(Command::Control, encode_status(&view), false);
    }

    fn handle_param_ram(&mut self, read: bool, data: u64) {
        let sub_command = pram::SUB_COMMAND.get(data);
        let header = pram::SUB_COMMAND.set(0, sub_command);
        let response = match sub_command {
            pram::sub::RAM => {
                #[allow(clippy::cast_possible_truncation)]
                let slot = ram::SLOT.get(data) as usize;
                let stuck = self.stuck_bits;
                let Some(stored) = self.param_slots.get_mut(slot) else {
                    trace!("parameter slot {slot} outside RAM");
                    return;
                };
                if !read {
                    *stored = (data & param_mask()) | stuck;
                    return;
                }
                ram::SLOT.set(*stored | header, slot as u64)
            }
            pram::sub::LUT => {
                #[allow(clippy::cast_possible_truncation)]
                let index = lut::INDEX.get(data) as usize;
                if !read {
                    self.lut[index] = data;
                    return;
                }
                lut::INDEX.set(self.lut[index], index as u64) | header
            }
            pram::sub::PERIOD => {
                if !read {
                    self.period = PERIOD.get(data);
                    return;
                }
                PERIOD.set(header, self.period)
            }
            pram::sub::COUNT => {
                if !read {
                    self.count = COUNT.get(data);
                    return;
                }
                COUNT.set(header, self.count)
            }
            _ => {
                if read {
                    self.respond(Command::ParamRam, data, true);
                }
                return;
            }
        };
        self.respond(Command::ParamRam, response, false);
    }

    #[allow(clippy::cast_possible_truncation)] // row/column/index fields are at most 8 bits
    fn handle_synapse(&mut self, read: bool, data: u64) {
        let sub_command = synapse::SUB_COMMAND.get(data);
        let header = synapse::SUB_COMMAND.set(0, sub_command);
        let cell = (ROW.get(data) as u8, COLUMN.get(data) as u8);
        let model = &mut self.synapse;
        let response = match sub_command {
            synapse::sub::CTRL if read => {
                if let Some(left) = model.polls_left {
                    if left == 0 {
                        model.status.done = true;
                        model.polls_left = None;
                    } else {
                        model.polls_left = Some(left - 1);
                    }
                }
                let answer = model.status.encode();
                model.status.cmerr = false;
                answer
            }
            synapse::sub::CTRL => {
                model.status.dll_reset = synapse::status::DLLRES.get(data) == 1;
                model.status.neuron_reset_released = synapse::status::NRESETB.get(data) == 1;
                model.status.pccont = synapse::status::PCCONT.get(data) == 1;
                return;
            }
            synapse::sub::TIME if read => model.timing | header,
            synapse::sub::TIME => {
                model.timing = data & (mask(time::WIDTH) << synapse::COMMAND_WIDTH);
                return;
            }
            synapse::sub::PLUT => {
                let index = PLUT_INDEX.get(data) as usize;
                if !read {
                    model.plut[index] = DATA.get(data) as u32;
                    return;
                }
                DATA.set(PLUT_INDEX.set(header, index as u64), u64::from(model.plut[index]))
            }
            synapse::sub::SYN => {
                if !read {
                    model.ram.insert(cell, DATA.get(data) as u32);
                    return;
                }
                let weights = model.ram.get(&cell).copied().unwrap_or(0);
                DATA.set(data & !DATA.shifted_mask(), u64::from(weights))
            }
            synapse::sub::CLOSE => {
                return;
            }
            synapse::sub::COR_READ => {
                if !read {
                    return;
                }
                let flags = model.correlation.get(&cell).copied().unwrap_or(0);
                DATA.set(data & !DATA.shifted_mask(), u64::from(flags))
            }
            synapse::sub::PCOR | synapse::sub::PCORC => {
                model.status.done = false;
                model.status.start = PCOR_START_ROW.get(data) as u8;
                model.status.stop = PCOR_STOP_ROW.get(data) as u8;
                model.status.row = model.status.start;
                model.polls_left = Some(model.processing_polls);
                if read {
                    header
                } else {
                    return;
                }
            }
            _ => {
                debug!("virtual chip: undefined synapse sub-command {sub_command}");
                model.status.cmerr = true;
                if read {
                    header
                } else {
                    return;
                }
            }
        };
        self.respond(Command::SynapseRam, response, false);
    }
}

impl Transport for VirtualChip {
    fn send(&mut self, word: Word) -> Result<()> {
        self.received += 1;
        let packet = classify(word);
        if packet.chip_id != self.chip_id {
            return Ok(());
        }
        match Frame::from_word(word) {
            Frame::Empty => {}
            Frame::Event(w) => self.events.push(EventPacket::from_word(w)?),
            Frame::Command(c) => self.handle(c),
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Word> {
        Ok(self
            .injected
            .pop_front()
            .or_else(|| self.responses.pop_front())
            .unwrap_or(Word::EMPTY))
    }
}

impl Sideband for VirtualChip {
    fn set_pins(&mut self, pins: ModePins) -> Result<()> {
        trace!("virtual chip {} pins {pins:?}", self.chip_id);
        self.pins = pins;
        Ok(())
    }

    fn write_delay(&mut self, write: DelayWrite) -> Result<()> {
        if !self.pins.ci_mode {
            return Err(SpikeyError::transport(
                "delay write while chip is not in address mode",
            ));
        }
        if write.chip_id == self.chip_id {
            self.delays[write.line.index() as usize] = write.value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ChipLink;

    #[test]
    fn control_reads_reset_value_after_power_up() {
        let mut link = ChipLink::new(VirtualChip::new(0), 0).unwrap();
        let data = link.read(Command::Control, 0).unwrap();
        assert_eq!(REGISTER.get(data), 0xFFFF_FC00);
        assert_eq!(status::REVISION.get(data), 3);
    }

    #[test]
    fn other_chip_ids_are_ignored() {
        let mut chip = VirtualChip::new(1);
        let w = CommandPacket::write(2, Command::Control, 0).encode().unwrap();
        chip.send(w).unwrap();
        assert_eq!(chip.control(), ControlRegister::RESET);
        assert_eq!(chip.received(), 1);
    }

    #[test]
    fn flip_outside_data_field_is_refused() {
        let mut chip = VirtualChip::new(0);
        assert!(matches!(
            chip.flip_next_response(64),
            Err(SpikeyError::OutOfRange { pos: 64, width: 1 })
        ));
        assert!(chip.flip_next_response(53).is_err());
        chip.flip_next_response(52).unwrap();

        let mut link = ChipLink::new(chip, 0).unwrap();
        let data = link.read(Command::Control, 0).unwrap();
        assert_eq!(data >> 52, 1);
    }

    #[test]
    fn rejected_response_keeps_its_data() {
        let mut chip = VirtualChip::new(0);
        chip.reject_response(1);
        let mut link = ChipLink::new(chip, 0).unwrap();
        assert!(link.read(Command::Control, 0).is_ok());
        assert!(matches!(
            link.read(Command::Control, 0),
            Err(SpikeyError::CommandRejected { command: 6 })
        ));
        assert!(link.read(Command::Control, 0).is_ok());
    }

    #[test]
    fn idle_line_returns_empty_packets() {
        let mut chip = VirtualChip::new(0);
        assert_eq!(chip.receive().unwrap(), Word::EMPTY);
    }

    #[test]
    fn undefined_synapse_command_latches_cmerr() {
        let mut link = ChipLink::new(VirtualChip::new(0), 0).unwrap();
        link.write(Command::SynapseRam, 0xC).unwrap();
        let status = SynapseStatus::decode(link.read(Command::SynapseRam, 0).unwrap());
        assert!(status.cmerr);
        // read clears it
        let status = SynapseStatus::decode(link.read(Command::SynapseRam, 0).unwrap());
        assert!(!status.cmerr);
    }

    #[test]
    fn power_cycle_restores_defaults() {
        let mut chip = VirtualChip::new(4).with_revision(2);
        chip.control = ControlRegister::from_raw(0);
        chip.power_cycle();
        assert_eq!(chip.control(), ControlRegister::RESET);
        assert_eq!(chip.revision, 2);
    }

    #[test]
    fn fifo_bounds() {
        let mut chip = VirtualChip::new(0);
        assert!(chip.set_fifo(StatusSelector::ClkHi, 5, FifoStatus::default()).is_ok());
        assert!(chip.set_fifo(StatusSelector::ClkHi, 6, FifoStatus::default()).is_err());
        assert!(chip.set_fifo(StatusSelector::Control, 0, FifoStatus::default()).is_err());
    }
}
