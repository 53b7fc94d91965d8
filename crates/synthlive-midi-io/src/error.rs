//! Error types for the MIDI transport.

use thiserror::Error;

use crate::address::Address;

/// Failures while framing or parsing a Roland System Exclusive message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SysExError {
    #[error("SysEx message too short ({0} bytes)")]
    TooShort(usize),

    #[error("Missing SysEx framing byte (expected {expected:#04X}, found {found:#04X})")]
    Framing { expected: u8, found: u8 },

    #[error("Not a Roland message (manufacturer {0:#04X})")]
    Manufacturer(u8),

    #[error("Unsupported SysEx command {0:#04X}")]
    Command(u8),

    #[error("Checksum mismatch (expected {expected:#04X}, found {found:#04X})")]
    Checksum { expected: u8, found: u8 },

    #[error("Data byte {value:#04X} at index {index} is not 7-bit clean")]
    DataByte { index: usize, value: u8 },

    #[error("Address {0} overflows the 28-bit address space")]
    AddressOverflow(Address),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("SysEx error: {0}")]
    SysEx(#[from] SysExError),

    #[error("Channel message parse error: {0}")]
    ChannelParse(String),

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("MIDI backend unavailable: {0}")]
    MidiDevice(String),

    #[error("No MIDI {direction} port matches '{pattern}'")]
    PortNotFound {
        direction: &'static str,
        pattern: String,
    },

    #[error("MIDI {0} worker has stopped")]
    WorkerStopped(&'static str),

    #[error("MIDI output is not connected")]
    NotConnected,
}

impl From<midi_msg::ParseError> for Error {
    fn from(e: midi_msg::ParseError) -> Self {
        Error::ChannelParse(format!("{:?}", e))
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl<T> From<midir::ConnectError<T>> for Error {
    fn from(e: midir::ConnectError<T>) -> Self {
        Error::MidiPort(e.kind().to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
