//! Centralized error type for the synthlive umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI: {0}")]
    Midi(#[from] synthlive_midi_io::Error),

    #[error("Performance: {0}")]
    Performance(#[from] synthlive_performance::Error),

    #[error("failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Session has no inbound event source")]
    NoEventSource,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
