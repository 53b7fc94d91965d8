//! MIDI transport for synthlive.
//!
//! Provides the 7-bit address model, the Roland SysEx envelope, channel-event
//! parsing, request tracking with retry, and a midir-backed hardware transport.
//!
//! Feature gates: `midi-io` (hardware I/O via midir).

pub mod error;
pub use error::{Error, Result, SysExError};

pub mod address;
pub use address::Address;

pub mod sysex;
pub use sysex::{roland_checksum, DeviceIdentity, SysExCommand, SysExMessage};

pub mod channel;
pub use channel::{BankProgramState, ChannelCommand, ChannelEvent, ProgramSelection};

pub mod request;
pub use request::{PendingRequest, RequestTracker, RetryPolicy};

pub mod transport;
pub use transport::{OutboundMessage, RecordingTransport, SysExTransport, TransportEvent};

#[cfg(feature = "midi-io")]
pub(crate) mod io;

#[cfg(feature = "midi-io")]
pub use io::{HardwareTransport, MidiInputDevice, MidiOutputDevice};
