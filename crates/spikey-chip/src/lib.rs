//! Silicon model for the Spikey neuromorphic ASIC (revision 3).
//!
//! This crate has **no dependencies** and **no link access**; it is a
//! pure model of the chip's serial interface: packet field positions,
//! command codes, control/status register bits, parameter-RAM layout,
//! delay-line addressing and synapse-control encodings.
//!
//! Every position here is an absolute bit offset within a 64-bit link word
//! unless the item says it is relative to the `ci` command data field.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`fields`] | `Field` descriptor (name, offset, width) and word-size constants |
//! | [`packet`] | Packet framing, command packet layout, command codes |
//! | [`event`] | Three-slot event packet layout |
//! | [`control`] | Control register bits, reset value, status views |
//! | [`pram`] | Parameter-RAM banks, sub-commands, timing lookup table |
//! | [`delay`] | Link delay-line addressing |
//! | [`synapse`] | Synapse-control sub-commands, status and timing registers |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod control;
pub mod delay;
pub mod event;
pub mod fields;
pub mod packet;
pub mod pram;
pub mod synapse;

pub use fields::{Field, WORD_BITS};
