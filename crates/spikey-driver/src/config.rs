//! Link configuration
//!
//! Defaults suit a single chip on a direct link. Every field can be
//! overridden from the environment, which is how test rigs select a chip
//! without recompiling.

use crate::error::{Result, SpikeyError};
use crate::packet::check_chip_id;
use spikey_chip::pram::DEFAULT_PERIOD;
use tracing::debug;

/// Environment variable selecting the chip id
pub const ENV_CHIP_ID: &str = "SPIKEY_CHIP_ID";
/// Environment variable bounding words skipped while awaiting a response
pub const ENV_MAX_SKIPPED_WORDS: &str = "SPIKEY_MAX_SKIPPED_WORDS";
/// Environment variable for the parameter-RAM refresh period
pub const ENV_PRAM_PERIOD: &str = "SPIKEY_PRAM_PERIOD";

/// Per-chip link configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipConfig {
    /// Chip id on the link (0..=14)
    pub chip_id: u8,
    /// Empty or event words tolerated while waiting for one response
    pub max_skipped_words: usize,
    /// Parameter-RAM refresh period written by uploads
    pub pram_period: u8,
    /// Read back every uploaded parameter-RAM entry
    pub verify_uploads: bool,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            chip_id: 0,
            max_skipped_words: 1024,
            pram_period: DEFAULT_PERIOD,
            verify_uploads: true,
        }
    }
}

impl ChipConfig {
    /// Configuration for a given chip
    ///
    /// # Errors
    ///
    /// `InvalidChipId` if `chip_id` cannot address a chip.
    pub fn for_chip(chip_id: u8) -> Result<Self> {
        Ok(Self {
            chip_id: check_chip_id(chip_id)?,
            ..Self::default()
        })
    }

    /// Defaults overridden by `SPIKEY_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but does not parse, or names an
    /// invalid chip.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_CHIP_ID) {
            config.chip_id = check_chip_id(parse(ENV_CHIP_ID, &v)?)?;
        }
        if let Some(v) = lookup(ENV_MAX_SKIPPED_WORDS) {
            config.max_skipped_words = parse(ENV_MAX_SKIPPED_WORDS, &v)?;
        }
        if let Some(v) = lookup(ENV_PRAM_PERIOD) {
            config.pram_period = parse(ENV_PRAM_PERIOD, &v)?;
        }
        debug!("Chip config: {config:?}");
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SpikeyError::invalid_state(format!("{key}={value:?} does not parse")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ChipConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ChipConfig::default());
    }

    #[test]
    fn environment_overrides() {
        let config = ChipConfig::from_lookup(lookup(&[
            (ENV_CHIP_ID, "3"),
            (ENV_MAX_SKIPPED_WORDS, " 16 "),
            (ENV_PRAM_PERIOD, "20"),
        ]))
        .unwrap();
        assert_eq!(config.chip_id, 3);
        assert_eq!(config.max_skipped_words, 16);
        assert_eq!(config.pram_period, 20);
    }

    #[test]
    fn empty_chip_id_is_not_addressable() {
        let err = ChipConfig::from_lookup(lookup(&[(ENV_CHIP_ID, "15")])).unwrap_err();
        assert!(matches!(err, SpikeyError::InvalidChipId { chip_id: 15 }));
        assert!(ChipConfig::for_chip(15).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ChipConfig::from_lookup(lookup(&[(ENV_PRAM_PERIOD, "fast")])).is_err());
    }
}
