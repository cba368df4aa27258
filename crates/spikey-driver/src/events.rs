//! Event codec: up to three spikes per packet with a split time field
//!
//! The chip's system time is 8 bits wide. Its upper nibble is stored once
//! per packet, so every valid event in a packet must fall in the same
//! 16-clock window. Absolute times wrap at 256 clocks on the wire.

use crate::bitfield;
use crate::error::{Result, SpikeyError};
use crate::packet::{build, classify, Word};
use spikey_chip::event::{EVENTS_PER_PACKET, SLOTS, TIME_MSB};
use spikey_chip::packet::{CHIP_ID, EVENT_FLAG, PAYLOAD};
use std::iter::FusedIterator;
use tracing::trace;

/// One spike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Absolute time in system clock cycles
    pub time: u64,
    /// 9-bit neuron address
    pub neuron: u16,
    /// Sub-clock time bin (4 bits)
    pub time_bin: u8,
    /// Slot carries an event
    pub valid: bool,
}

impl Event {
    /// A valid event
    pub fn new(time: u64, neuron: u16, time_bin: u8) -> Self {
        Self {
            time,
            neuron,
            time_bin,
            valid: true,
        }
    }

    /// Placeholder that occupies no slot on the wire
    pub fn invalid() -> Self {
        Self {
            time: 0,
            neuron: 0,
            time_bin: 0,
            valid: false,
        }
    }

    /// Shared upper time nibble
    pub fn time_msb(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let msb = ((self.time >> SLOTS[0].time_lsb.width) & TIME_MSB.mask()) as u8;
        msb
    }

    /// Per-slot lower time nibble
    pub fn time_lsb(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let lsb = (self.time & SLOTS[0].time_lsb.mask()) as u8;
        lsb
    }
}

/// An encoded event packet (frame header included, chip id unset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventPacket(u64);

impl EventPacket {
    /// Interpret a received word
    ///
    /// # Errors
    ///
    /// `InvalidState` if the word is a command packet.
    pub fn from_word(word: Word) -> Result<Self> {
        if !classify(word).is_event {
            return Err(SpikeyError::invalid_state(
                "command packet where an event packet was expected",
            ));
        }
        Ok(Self(CHIP_ID.set(word.raw(), 0)))
    }

    /// Frame for transmission to `chip_id`
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if `chip_id` does not fit 4 bits.
    pub fn to_word(self, chip_id: u8) -> Result<Word> {
        build(chip_id, true, PAYLOAD.get(self.0))
    }

    /// Raw bits
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Number of valid slots
    pub fn len(self) -> usize {
        SLOTS.iter().filter(|s| s.valid.get(self.0) == 1).count()
    }

    /// No valid slot
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Pack up to three events into one packet
///
/// Slot `i` holds `events[i]`. Invalid events and unused slots have their
/// valid bit cleared.
///
/// # Errors
///
/// `TooManyEvents` for more than three events, `SharedTimeMismatch` if the
/// valid events do not share the time MSB nibble.
pub fn pack_events(events: &[Event]) -> Result<EventPacket> {
    if events.len() > EVENTS_PER_PACKET {
        return Err(SpikeyError::TooManyEvents {
            count: events.len(),
        });
    }
    let mut shared_msb = None;
    let mut raw = EVENT_FLAG.set(0, 1);
    for (slot, event) in SLOTS.iter().zip(events).filter(|(_, e)| e.valid) {
        let msb = event.time_msb();
        match shared_msb {
            None => shared_msb = Some(msb),
            Some(first) if first != msb => {
                return Err(SpikeyError::SharedTimeMismatch { first, other: msb });
            }
            Some(_) => {}
        }
        raw = slot.valid.set(raw, 1);
        raw = bitfield::put(raw, &slot.time_bin, u64::from(event.time_bin));
        raw = slot.time_lsb.set(raw, u64::from(event.time_lsb()));
        raw = bitfield::put(raw, &slot.neuron, u64::from(event.neuron));
    }
    raw = TIME_MSB.set(raw, u64::from(shared_msb.unwrap_or(0)));
    trace!("packed {} event(s) into {raw:016x}", events.len());
    Ok(EventPacket(raw))
}

/// Decode the valid slots of a packet, in slot order
pub fn unpack_events(packet: EventPacket) -> Events {
    Events { packet, slot: 0 }
}

/// Lazy decoder over the valid slots of one packet
///
/// Decoding consumes the iterator; it cannot be copied and restarted.
///
/// ```compile_fail
/// use spikey_driver::{pack_events, unpack_events, Event};
///
/// let packet = pack_events(&[Event::new(0, 1, 0)]).unwrap();
/// let events = unpack_events(packet);
/// let again = events.clone();
/// ```
#[derive(Debug)]
pub struct Events {
    packet: EventPacket,
    slot: usize,
}

impl Iterator for Events {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let raw = self.packet.0;
        while self.slot < EVENTS_PER_PACKET {
            let fields = &SLOTS[self.slot];
            self.slot += 1;
            if fields.valid.get(raw) == 0 {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)] // 9- and 4-bit fields
            let (neuron, time_bin) = (
                fields.neuron.get(raw) as u16,
                fields.time_bin.get(raw) as u8,
            );
            return Some(Event {
                time: (TIME_MSB.get(raw) << fields.time_lsb.width) | fields.time_lsb.get(raw),
                neuron,
                time_bin,
                valid: true,
            });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(EVENTS_PER_PACKET - self.slot))
    }
}

impl FusedIterator for Events {}

/// Pack a time-ordered event stream into as few packets as the shared time
/// MSB allows
///
/// A new packet starts when the current one is full or the next event
/// leaves the current 16-clock window. Invalid events are dropped.
///
/// # Errors
///
/// Propagates packing errors; none occur for well-formed input.
pub fn pack_event_stream<I>(events: I) -> Result<Vec<EventPacket>>
where
    I: IntoIterator<Item = Event>,
{
    let mut packets = Vec::new();
    let mut pending: Vec<Event> = Vec::with_capacity(EVENTS_PER_PACKET);
    for event in events.into_iter().filter(|e| e.valid) {
        let window = |e: &Event| e.time >> SLOTS[0].time_lsb.width;
        let window_changed = pending.first().is_some_and(|first| window(first) != window(&event));
        if pending.len() == EVENTS_PER_PACKET || window_changed {
            packets.push(pack_events(&pending)?);
            pending.clear();
        }
        pending.push(event);
    }
    if !pending.is_empty() {
        packets.push(pack_events(&pending)?);
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> [Event; 3] {
        [
            Event::new(0x51, 7, 3),
            Event::new(0x5E, 511, 15),
            Event::new(0x50, 256, 0),
        ]
    }

    #[test]
    fn roundtrip_for_zero_to_three_events() {
        let events = sample();
        for n in 0..=3 {
            let packet = pack_events(&events[..n]).unwrap();
            let back: Vec<Event> = unpack_events(packet).collect();
            assert_eq!(back, events[..n].to_vec(), "{n} events");
            assert_eq!(packet.len(), n);
        }
    }

    #[test]
    fn invalid_events_are_omitted_in_slot_order() {
        let [a, _, c] = sample();
        let packet = pack_events(&[a, Event::invalid(), c]).unwrap();
        let back: Vec<Event> = unpack_events(packet).collect();
        assert_eq!(back, vec![a, c]);
        // slot 1 stays invalid
        assert_eq!(SLOTS[1].valid.get(packet.raw()), 0);
    }

    #[test]
    fn slot_positions_match_hardware() {
        let packet = pack_events(&[Event::new(0x12, 0x1AB, 0x9)]).unwrap();
        let raw = packet.raw();
        assert_eq!(raw & 1, 1, "event flag");
        assert_eq!((raw >> 6) & 1, 1, "valid0");
        assert_eq!((raw >> 9) & 0xF, 0x1, "time msb");
        assert_eq!((raw >> 13) & 0xF, 0x9, "time bin");
        assert_eq!((raw >> 17) & 0xF, 0x2, "time lsb");
        assert_eq!((raw >> 21) & 0x1FF, 0x1AB, "neuron");
    }

    #[test]
    fn too_many_events() {
        let e = Event::new(0, 0, 0);
        assert!(matches!(
            pack_events(&[e; 4]),
            Err(SpikeyError::TooManyEvents { count: 4 })
        ));
    }

    #[test]
    fn events_must_share_time_msb() {
        let err = pack_events(&[Event::new(0x10, 1, 0), Event::new(0x20, 2, 0)]).unwrap_err();
        assert!(matches!(
            err,
            SpikeyError::SharedTimeMismatch { first: 1, other: 2 }
        ));
    }

    #[test]
    fn decoder_is_lazy_and_fused() {
        let mut it = unpack_events(pack_events(&sample()[..1]).unwrap());
        assert!(it.next().is_some());
        assert!(it.next().is_none());
        assert!(it.next().is_none());
    }

    #[test]
    fn word_roundtrip_keeps_chip_id_out_of_packet() {
        let packet = pack_events(&sample()).unwrap();
        let word = packet.to_word(4).unwrap();
        assert_eq!(classify(word).chip_id, 4);
        assert_eq!(EventPacket::from_word(word).unwrap(), packet);
    }

    #[test]
    fn stream_splits_on_window_and_capacity() {
        let stream = [
            Event::new(0x01, 1, 0),
            Event::new(0x02, 2, 0),
            Event::new(0x03, 3, 0),
            Event::new(0x04, 4, 0),
            Event::new(0x14, 5, 0),
            Event::invalid(),
            Event::new(0x114, 6, 0),
        ];
        let packets = pack_event_stream(stream).unwrap();
        let sizes: Vec<usize> = packets.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, [3, 1, 1, 1]);
        let neurons: Vec<u16> = packets
            .into_iter()
            .flat_map(unpack_events)
            .map(|e| e.neuron)
            .collect();
        assert_eq!(neurons, [1, 2, 3, 4, 5, 6]);
    }
}
