//! Parameter identity, field codecs, and decoded values.

use std::fmt;

use crate::segment::nibble::{pack_nibbles, unpack_nibbles};
use crate::xp50::{CommonParameter, PartParameter};

/// Parameter identifier across both segment kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamId {
    Common(CommonParameter),
    /// Part parameters exist once per part segment; the channel is supplied separately.
    Part(PartParameter),
}

impl ParamId {
    pub fn is_part(&self) -> bool {
        matches!(self, ParamId::Part(_))
    }

    pub fn codec(&self) -> FieldCodec {
        match self {
            ParamId::Common(p) => p.codec(),
            ParamId::Part(p) => p.codec(),
        }
    }

    pub fn range(&self) -> ValueRange {
        match self {
            ParamId::Common(p) => p.range(),
            ParamId::Part(p) => p.range(),
        }
    }
}

impl From<CommonParameter> for ParamId {
    fn from(p: CommonParameter) -> Self {
        ParamId::Common(p)
    }
}

impl From<PartParameter> for ParamId {
    fn from(p: PartParameter) -> Self {
        ParamId::Part(p)
    }
}

/// How a field's bytes map to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCodec {
    /// One raw byte, 0-127.
    Byte,
    /// Number spread over the field, 4 bits per byte, high nibble first.
    Nibbles,
    /// ASCII text, space padded.
    Ascii,
}

impl FieldCodec {
    pub fn decode(&self, bytes: &[u8]) -> ParamValue {
        match self {
            FieldCodec::Byte => ParamValue::Number(bytes.first().copied().unwrap_or(0) as u32),
            FieldCodec::Nibbles => ParamValue::Number(unpack_nibbles(bytes)),
            FieldCodec::Ascii => ParamValue::Text(
                bytes
                    .iter()
                    .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { ' ' })
                    .collect::<String>()
                    .trim_end()
                    .to_string(),
            ),
        }
    }

    /// Encode into exactly `length` bytes. `None` if the value does not fit the codec.
    pub fn encode(&self, value: &ParamValue, length: usize) -> Option<Vec<u8>> {
        match (self, value) {
            (FieldCodec::Byte, ParamValue::Number(n)) if *n <= 0x7F && length == 1 => {
                Some(vec![*n as u8])
            }
            (FieldCodec::Nibbles, ParamValue::Number(n)) => pack_nibbles(*n, length),
            (FieldCodec::Ascii, ParamValue::Text(text)) => {
                if !text.chars().all(|c| (' '..='~').contains(&c)) {
                    return None;
                }
                let mut bytes: Vec<u8> = text.bytes().take(length).collect();
                bytes.resize(length, b' ');
                Some(bytes)
            }
            _ => None,
        }
    }
}

/// Decoded parameter value delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Number(u32),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<u32> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Inclusive range accepted for a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub min: u32,
    pub max: u32,
}

impl ValueRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Full 7-bit range.
    pub const BYTE: ValueRange = ValueRange::new(0, 127);

    pub fn clamp(&self, raw: i64) -> u32 {
        raw.clamp(self.min as i64, self.max as i64) as u32
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}
