//! Session configuration, loadable from TOML.
//!
//! ```toml
//! input_port = "UM-ONE"
//! output_port = "UM-ONE"
//! echo_window_ms = 800
//!
//! [device]
//! device_id = 0x10
//! model_id = 0x6A
//!
//! [groups]
//! song_channels = 8
//! fast_channels = 8
//!
//! [retry]
//! timeout_ms = 500
//! max_retries = 2
//! ```
//!
//! Every key is optional; unknown keys are rejected.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use synthlive_midi_io::{DeviceIdentity, RetryPolicy};
use synthlive_performance::{xp50, ControllerOptions, GroupCounts};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Partial, case-sensitive match against input port names.
    pub input_port: Option<String>,
    pub output_port: Option<String>,
    /// How long a local write waits for its echo before it no longer suppresses one.
    pub echo_window_ms: u64,
    pub device: DeviceIdentity,
    pub groups: GroupCounts,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_port: None,
            output_port: None,
            echo_window_ms: 1000,
            device: DeviceIdentity::default(),
            groups: GroupCounts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.device_id > 0x7F || self.device.model_id > 0x7F {
            return Err(Error::InvalidConfig(format!(
                "device/model id must be 7-bit, got {:#04X}/{:#04X}",
                self.device.device_id, self.device.model_id
            )));
        }
        let assigned = self
            .groups
            .song_channels
            .checked_add(self.groups.fast_channels);
        if assigned.map_or(true, |total| total > xp50::PART_COUNT) {
            return Err(Error::InvalidConfig(format!(
                "song_channels + fast_channels must not exceed {}",
                xp50::PART_COUNT
            )));
        }
        Ok(())
    }

    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            identity: self.device,
            groups: self.groups,
            echo_window: self.echo_window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(SessionConfig::from_toml("").unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = SessionConfig::from_toml(
            r#"
            output_port = "XP-50"
            echo_window_ms = 250

            [groups]
            song_channels = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.output_port.as_deref(), Some("XP-50"));
        assert_eq!(config.input_port, None);
        assert_eq!(config.echo_window(), Duration::from_millis(250));
        assert_eq!(config.groups.song_channels, 4);
        assert_eq!(config.groups.fast_channels, 8);
        assert_eq!(config.device, DeviceIdentity::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SessionConfig::from_toml("tempo = 120").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));

        let err = SessionConfig::from_toml("[retry]\nattempts = 3").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_validation() {
        let err = SessionConfig::from_toml("[groups]\nsong_channels = 12\nfast_channels = 8").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = SessionConfig::from_toml("[device]\ndevice_id = 200").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_group_count_overflow_is_invalid() {
        let mut config = SessionConfig::default();
        config.groups = GroupCounts {
            song_channels: usize::MAX,
            fast_channels: 1,
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = SessionConfig::default();
        config.input_port = Some("USB MIDI".to_string());
        config.retry.max_retries = 5;
        let text = config.to_toml().unwrap();
        assert_eq!(SessionConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::load("/nonexistent/synthlive.toml").unwrap_err();
        assert!(matches!(err, Error::ReadConfig { .. }));
    }
}
