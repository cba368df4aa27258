//! Spikey device handle
//!
//! Bundles the chip link with the two managers that carry per-chip state:
//! the parameter-RAM FSM and the synapse row state. Re-initialising the
//! device resets both.

use crate::config::ChipConfig;
use crate::control::ControlPort;
use crate::error::Result;
use crate::link::ChipLink;
use crate::pram::{ParamRam, PramFsm};
use crate::synapse::{SynapseControl, SynapseState};
use crate::transport::Transport;
use tracing::{debug, info};

/// Loopback pattern used by [`SpikeyDevice::init`]
pub const INIT_LOOPBACK_PATTERN: u64 = 0x0A5A_5A5A_5A5A_5A5A;

/// Open connection to one chip
#[derive(Debug)]
pub struct SpikeyDevice<T: Transport> {
    link: ChipLink<T>,
    pram: ParamRam,
    synapse: SynapseControl,
    revision: Option<u8>,
}

/// Split borrow of a device for manager calls
#[derive(Debug)]
pub struct Parts<'a, T: Transport> {
    /// Command link
    pub link: &'a mut ChipLink<T>,
    /// Parameter-RAM manager
    pub pram: &'a mut ParamRam,
    /// Synapse-control processor
    pub synapse: &'a mut SynapseControl,
}

impl<T: Transport> SpikeyDevice<T> {
    /// Wrap a transport; nothing is sent until [`Self::init`]
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if the configured chip cannot be addressed.
    pub fn open(transport: T, config: &ChipConfig) -> Result<Self> {
        debug!("Opening chip {}", config.chip_id);
        Ok(Self {
            link: ChipLink::with_config(transport, config)?,
            pram: ParamRam::with_config(config),
            synapse: SynapseControl::new(),
            revision: None,
        })
    }

    /// Bring the chip to a known state
    ///
    /// Sync, loopback check, buffer reset pulse with analog clocks on,
    /// parameter-RAM FSM idled, synapse row closed.
    ///
    /// # Errors
    ///
    /// `LoopbackMismatch` on a broken link, or any link error.
    pub fn init(&mut self) -> Result<u8> {
        self.pram.reset_state();
        self.synapse.reset();
        self.link.discard_pending();

        self.link.sync()?;
        self.link.loopback(INIT_LOOPBACK_PATTERN)?;
        let mut control = ControlPort::new(&mut self.link);
        control.init()?;
        let (_, revision) = control.read()?;
        self.pram.disable(&mut self.link)?;
        self.synapse.close(&mut self.link)?;

        self.revision = Some(revision);
        info!("Chip {} ready (revision {revision})", self.link.chip_id());
        Ok(revision)
    }

    /// Chip revision read by the last [`Self::init`]
    pub fn revision(&self) -> Option<u8> {
        self.revision
    }

    /// Addressed chip
    pub fn chip_id(&self) -> u8 {
        self.link.chip_id()
    }

    /// Parameter-RAM FSM state
    pub fn pram_state(&self) -> PramFsm {
        self.pram.fsm()
    }

    /// Synapse row state
    pub fn synapse_state(&self) -> SynapseState {
        self.synapse.state()
    }

    /// Control register access
    pub fn control(&mut self) -> ControlPort<'_, T> {
        ControlPort::new(&mut self.link)
    }

    /// Borrow link and managers together
    pub fn parts(&mut self) -> Parts<'_, T> {
        Parts {
            link: &mut self.link,
            pram: &mut self.pram,
            synapse: &mut self.synapse,
        }
    }

    /// Command link
    pub fn link(&mut self) -> &mut ChipLink<T> {
        &mut self.link
    }

    /// Release the transport
    pub fn into_inner(self) -> T {
        self.link.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::VirtualChip;
    use crate::control::ControlRegister;

    #[test]
    fn init_on_virtual_chip() {
        let config = ChipConfig::for_chip(2).unwrap();
        let mut dev = SpikeyDevice::open(VirtualChip::new(2), &config).unwrap();
        assert_eq!(dev.init().unwrap(), 3);
        assert_eq!(dev.revision(), Some(3));
        assert_eq!(dev.pram_state(), PramFsm::Disabled);
        assert_eq!(dev.synapse_state(), SynapseState::Idle);
        let chip = dev.into_inner();
        // buffer resets released, analog clocks running, FSM off
        assert_eq!(chip.control().raw(), (1 << 7) | (1 << 8));
        assert_eq!(chip.count_field(), 0xFFF);
        assert_ne!(chip.control(), ControlRegister::RESET);
        println!("✅ Virtual chip initialised");
    }

    #[test]
    fn init_fails_on_wrong_chip() {
        // the model answers to chip 1, the link addresses chip 0
        let config = ChipConfig {
            max_skipped_words: 4,
            ..ChipConfig::default()
        };
        let mut dev = SpikeyDevice::open(VirtualChip::new(1), &config).unwrap();
        assert!(dev.init().is_err());
    }
}
