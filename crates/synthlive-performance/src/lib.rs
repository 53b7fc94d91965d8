//! Performance memory model for synthlive.
//!
//! Segments mirror byte ranges of the instrument's temporary performance
//! memory. The [`SegmentRegistry`] routes inbound DT1 data into them, the
//! [`ParameterManager`] fans decoded changes out to subscribers, and
//! [`Editor`]s keep small per-channel caches in sync. Everything is owned by a
//! [`PerformanceController`] behind one lock ([`SharedController`]).

pub mod error;
pub use error::{DecodeError, Error, Result, SegmentError};

pub mod param;
pub use param::{FieldCodec, ParamId, ParamValue, ValueRange};

pub mod segment;
pub use segment::{ParameterField, Segment, SegmentKind, SegmentLayout};

pub mod xp50;
pub use xp50::{CommonParameter, PartParameter};

pub mod router;
pub use router::{classify, GroupCounts, RoutedData, SegmentGroup, SegmentReceived, SegmentRegistry};

pub mod params;
pub use params::{ChannelFilter, ParameterManager, ParameterUpdate, SubscriberId, DEFAULT_ECHO_WINDOW};

pub mod controller;
pub use controller::{ControllerOptions, PerformanceController, SharedController};

pub mod editor;
pub use editor::{Editor, EditorChange, SyncState};
