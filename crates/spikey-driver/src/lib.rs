//! Pure Rust link-protocol driver for the Spikey neuromorphic ASIC.
//!
//! Encodes and decodes the 64-bit words exchanged with a Spikey chip over
//! its serial link, and drives the chip's configuration state machines
//! (control register, parameter RAM, delay lines, synapse control) on top
//! of a pluggable word [`Transport`].
//!
//! # Layers
//!
//! ```text
//! SpikeyDevice        init / reset, owns the per-chip state below
//!   ├─ ControlPort    control register, status views
//!   ├─ ParamRam       parameter upload, timing LUT, refresh FSM
//!   └─ SynapseControl row FSM, plasticity LUT, correlation processing
//! ChipLink            one in-flight transaction, ordered request/response
//! Transport           send word / receive word   (VirtualChip in-tree)
//! Sideband            mode pins, delay lines
//! ```
//!
//! # Quick start
//!
//! ```
//! use spikey_driver::prelude::*;
//!
//! # fn main() -> spikey_driver::Result<()> {
//! let config = ChipConfig::for_chip(0)?;
//! let mut dev = SpikeyDevice::open(VirtualChip::new(0), &config)?;
//! let revision = dev.init()?;
//! assert_eq!(revision, 3);
//!
//! let parts = dev.parts();
//! let entries = [ParamEntry::new(10, 20, 3), ParamEntry::new(11, 400, 3)];
//! let summary = parts.pram.upload_default(parts.link, &entries)?;
//! assert_eq!(summary.entries, 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bitfield`] | Checked bit-range extract/insert |
//! | [`backends`] | Software chip for tests and bring-up |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
pub mod bitfield;
mod config;
mod control;
mod delay;
mod device;
mod error;
mod events;
mod link;
mod packet;
mod pram;
mod synapse;
mod transport;

pub use backends::VirtualChip;
pub use config::{ChipConfig, ENV_CHIP_ID, ENV_MAX_SKIPPED_WORDS, ENV_PRAM_PERIOD};
pub use control::{
    build_control_write, build_status_read, decode_status, BufferReset, ControlPort,
    ControlRegister, Enable, FifoStatus, StatusSelector, StatusView,
};
pub use delay::{program_delays, set_delay, DelayGroup, DelayLine, DelayWrite};
pub use device::{Parts, SpikeyDevice, INIT_LOOPBACK_PATTERN};
pub use error::{ParamMismatch, Result, SpikeyError};
pub use events::{pack_event_stream, pack_events, unpack_events, Event, EventPacket, Events};
pub use link::{ChipLink, LinkStats};
pub use packet::{
    build, check_chip_id, classify, Access, Command, CommandPacket, Frame, Packet, Word,
};
pub use pram::{
    decode_count, decode_lut, decode_param, encode_count, encode_lut, encode_param, param_mask,
    plan_timing, refresh_cycles, select_lut, sort_by_value, sort_triangle, ParamEntry, ParamRam,
    PramFsm, UploadSummary, VerifyReport, SYSTEM_CLOCK_HZ,
};
pub use spikey_chip::pram::{LutEntry, ADDRESS_SPACE_END, DEFAULT_LUT};
pub use synapse::{
    custom_plut, encode_ctrl, encode_plut, encode_process, encode_synapse, identity_plut,
    linear_plut, plut_word, OpenRow, PlutTable, SynapseControl, SynapseState, SynapseStatus,
    SynapseTiming,
};
pub use transport::{ModePins, Sideband, Transport};

/// Silicon constants (re-exported from spikey-chip).
pub mod chip {
    pub use spikey_chip::*;
}

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ChipConfig, ChipLink, Command, ControlPort, ControlRegister, Enable, Event, EventPacket,
        ParamEntry, ParamRam, PramFsm, Result, SpikeyDevice, SpikeyError, SynapseControl,
        SynapseState, Transport, VirtualChip, Word,
    };
}
