//! # synthlive - Live Performance Controller
//!
//! Keeps several editors in sync with a Roland XP-50 style synthesizer's
//! temporary performance memory over SysEx.
//!
//! ## Architecture
//!
//! synthlive is an umbrella crate that coordinates:
//! - **synthlive-midi-io** - Transport (7-bit addresses, Roland DT1/RQ1 envelope,
//!   request retry, channel events, midir hardware I/O)
//! - **synthlive-performance** - Segments, address router, parameter fan-out, editors
//!
//! ## Quick Start
//!
//! ```ignore
//! use synthlive::prelude::*;
//!
//! let session = Session::builder()
//!     .config(SessionConfig::load("synthlive.toml")?)
//!     .build()?;
//! let _dispatcher = session.spawn_dispatcher()?;
//!
//! let song = session.editor(0)?;
//! let fast = session.editor(8)?;
//! session.request_all()?;
//!
//! song.set_tempo(128)?;
//! for change in fast.changes().try_iter() {
//!     println!("{:?} -> {}", change.param, change.value);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - `midi-hardware`
//! - `midi-hardware` - midir-backed hardware transport

pub mod builder;
pub mod config;
pub mod error;
pub mod session;

pub use builder::SessionBuilder;
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use session::Session;

/// Re-export of synthlive-midi-io for direct access
pub use synthlive_midi_io as midi;

/// Re-export of synthlive-performance for direct access
pub use synthlive_performance as performance;

pub use synthlive_midi_io::{
    Address, BankProgramState, ChannelEvent, DeviceIdentity, ProgramSelection, RecordingTransport,
    RetryPolicy, SysExMessage, SysExTransport, TransportEvent,
};

#[cfg(feature = "midi-hardware")]
pub use synthlive_midi_io::{HardwareTransport, MidiInputDevice, MidiOutputDevice};

pub use synthlive_performance::{
    xp50, ChannelFilter, CommonParameter, ControllerOptions, Editor, EditorChange, GroupCounts,
    ParamId, ParamValue, ParameterUpdate, PartParameter, PerformanceController, SegmentGroup,
    SegmentReceived, SharedController, SubscriberId, SyncState,
};

pub mod prelude {
    pub use crate::{Error, Result, Session, SessionBuilder, SessionConfig};

    pub use synthlive_midi_io::{DeviceIdentity, RecordingTransport, TransportEvent};

    #[cfg(feature = "midi-hardware")]
    pub use synthlive_midi_io::HardwareTransport;

    pub use synthlive_performance::{
        ChannelFilter, CommonParameter, Editor, EditorChange, ParamId, ParamValue, PartParameter,
        SegmentGroup, SyncState,
    };
}
