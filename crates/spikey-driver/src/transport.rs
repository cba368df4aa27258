//! Transport seam between the protocol core and the physical link
//!
//! The core never touches the link itself. It needs two primitives:
//! send one word and receive one word. Any timeout policy belongs to the
//! transport; a transport that gives up returns an error from `receive`.

use crate::delay::DelayWrite;
use crate::error::Result;
use crate::packet::Word;
use std::fmt::Debug;

/// Word-level link to one or more chips
///
/// Words are delivered in order. There are no transaction ids: the n-th
/// response belongs to the n-th read request.
pub trait Transport: Debug + Send {
    /// Queue one word for transmission
    ///
    /// # Errors
    ///
    /// Returns error if the link is down.
    fn send(&mut self, word: Word) -> Result<()>;

    /// Block until the next word arrives
    ///
    /// # Errors
    ///
    /// Returns error on link failure or transport timeout.
    fn receive(&mut self) -> Result<Word>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, word: Word) -> Result<()> {
        (**self).send(word)
    }

    fn receive(&mut self) -> Result<Word> {
        (**self).receive()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, word: Word) -> Result<()> {
        (**self).send(word)
    }

    fn receive(&mut self) -> Result<Word> {
        (**self).receive()
    }
}

/// Levels of the chip's mode pins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModePins {
    /// Chip reset
    pub reset: bool,
    /// PLL reset
    pub pll_reset: bool,
    /// Command-interface mode (delay-line address mode)
    pub ci_mode: bool,
}

impl ModePins {
    /// Normal operation: all pins low
    pub const RUN: ModePins = ModePins {
        reset: false,
        pll_reset: false,
        ci_mode: false,
    };

    /// Pins required while delay lines are written
    pub const ADDRESS_MODE: ModePins = ModePins {
        reset: spikey_chip::delay::address_mode::RESET,
        pll_reset: spikey_chip::delay::address_mode::PLL_RESET,
        ci_mode: spikey_chip::delay::address_mode::CI_MODE,
    };
}

/// Sideband of the link: mode pins and delay-line programming
pub trait Sideband: Debug + Send {
    /// Drive the mode pins
    ///
    /// # Errors
    ///
    /// Returns error if the link controller rejects the request.
    fn set_pins(&mut self, pins: ModePins) -> Result<()>;

    /// Program one delay line
    ///
    /// # Errors
    ///
    /// Returns error if the link controller rejects the request.
    fn write_delay(&mut self, write: DelayWrite) -> Result<()>;
}

impl<T: Sideband + ?Sized> Sideband for &mut T {
    fn set_pins(&mut self, pins: ModePins) -> Result<()> {
        (**self).set_pins(pins)
    }

    fn write_delay(&mut self, write: DelayWrite) -> Result<()> {
        (**self).write_delay(write)
    }
}
