//! Link backends
//!
//! - **Virtual**: software model of the chip's command interface, used by
//!   tests and the CLI self-test when no hardware link is attached

pub mod virtual_chip;

pub use virtual_chip::VirtualChip;
