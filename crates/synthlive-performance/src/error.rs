//! Error types for the performance memory model.

use thiserror::Error;

use synthlive_midi_io::Address;

use crate::param::{ParamId, ParamValue};

/// Inbound data that could not be applied to a segment. The segment keeps its previous bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload length {actual} does not match segment length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Payload of {len} bytes at offset {offset} exceeds segment length {segment_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        segment_len: usize,
    },
}

/// Field-level failures. Raised before any byte is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Unknown parameter {0:?} for this segment")]
    UnknownParameter(ParamId),

    #[error("Parameter {param:?} expects {expected} bytes, got {actual}")]
    FieldLengthMismatch {
        param: ParamId,
        expected: usize,
        actual: usize,
    },

    #[error("Field {param:?} ({offset}+{length}) exceeds segment length {segment_len}")]
    FieldOutOfBounds {
        param: ParamId,
        offset: usize,
        length: usize,
        segment_len: usize,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("Segment: {0}")]
    Segment(#[from] SegmentError),

    #[error("No segment registered at {0}")]
    UnknownSegment(Address),

    #[error("Parameter {0:?} needs a part channel")]
    ChannelRequired(ParamId),

    #[error("No part segment for channel {0}")]
    UnknownChannel(u8),

    #[error("Unknown subscriber {0}")]
    UnknownSubscriber(u64),

    #[error("Value byte {value:#04X} for {param:?} is not 7-bit clean")]
    ValueOutOfRange { param: ParamId, value: u8 },

    #[error("Parameter {0:?} does not hold a number")]
    NotNumeric(ParamId),

    #[error("Value {value} cannot be encoded for {param:?}")]
    Unencodable { param: ParamId, value: ParamValue },

    #[error("Duplicate segment at {0}")]
    DuplicateSegment(Address),

    #[error("MIDI: {0}")]
    Midi(#[from] synthlive_midi_io::Error),

    #[error("SysEx: {0}")]
    SysEx(#[from] synthlive_midi_io::SysExError),
}

pub type Result<T> = std::result::Result<T, Error>;
