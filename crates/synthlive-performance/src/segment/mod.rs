//! Segments: addressable byte ranges of device memory and their field tables.
//!
//! A [`Segment`] owns a zero-initialised buffer of exactly `layout.length()`
//! bytes. Fields are `(offset, length)` windows into that buffer, checked
//! against the buffer length when the layout is built, so every read and
//! write is plain bounds-checked slicing.

pub mod nibble;

use std::ops::Range;
use std::sync::Arc;

use synthlive_midi_io::Address;

use crate::error::{DecodeError, SegmentError};
use crate::param::{FieldCodec, ParamId, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    PerformanceCommon,
    PerformancePart,
}

/// One parameter's window into its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterField {
    id: ParamId,
    offset: usize,
    length: usize,
    codec: FieldCodec,
}

impl ParameterField {
    pub const fn new(id: ParamId, offset: usize, length: usize, codec: FieldCodec) -> Self {
        Self {
            id,
            offset,
            length,
            codec,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn codec(&self) -> FieldCodec {
        self.codec
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    fn overlaps(&self, range: &Range<usize>) -> bool {
        self.offset < range.end && range.start < self.offset + self.length
    }
}

/// Field table shared by every segment of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLayout {
    kind: SegmentKind,
    length: usize,
    fields: Vec<ParameterField>,
}

impl SegmentLayout {
    /// Validates that every field lies inside `length` and has at least one byte.
    pub fn new(
        kind: SegmentKind,
        length: usize,
        fields: Vec<ParameterField>,
    ) -> Result<Self, SegmentError> {
        for field in &fields {
            if field.length == 0 || field.offset + field.length > length {
                return Err(SegmentError::FieldOutOfBounds {
                    param: field.id,
                    offset: field.offset,
                    length: field.length,
                    segment_len: length,
                });
            }
        }
        Ok(Self {
            kind,
            length,
            fields,
        })
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn fields(&self) -> &[ParameterField] {
        &self.fields
    }

    pub fn field(&self, id: ParamId) -> Option<&ParameterField> {
        self.fields.iter().find(|f| f.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    address: Address,
    /// Router target index (part number, or the common slot).
    target: usize,
    layout: Arc<SegmentLayout>,
    bytes: Vec<u8>,
}

impl Segment {
    pub fn new(address: Address, target: usize, layout: Arc<SegmentLayout>) -> Self {
        let bytes = vec![0; layout.length()];
        Self {
            address,
            target,
            layout,
            bytes,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn kind(&self) -> SegmentKind {
        self.layout.kind()
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replace the whole buffer. Fails without touching the buffer on length mismatch.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        if bytes.len() != self.bytes.len() {
            return Err(DecodeError::LengthMismatch {
                expected: self.bytes.len(),
                actual: bytes.len(),
            });
        }
        self.bytes.copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite `bytes.len()` bytes starting at `offset` (partial DT1).
    pub fn decode_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), DecodeError> {
        let target = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.bytes.len())
            .map(|end| offset..end)
            .ok_or(DecodeError::OutOfBounds {
                offset,
                len: bytes.len(),
                segment_len: self.bytes.len(),
            })?;
        self.bytes[target].copy_from_slice(bytes);
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn field(&self, id: ParamId) -> Result<&ParameterField, SegmentError> {
        self.layout
            .field(id)
            .ok_or(SegmentError::UnknownParameter(id))
    }

    pub fn read_field(&self, id: ParamId) -> Result<&[u8], SegmentError> {
        let field = self.field(id)?;
        Ok(&self.bytes[field.range()])
    }

    pub fn read_value(&self, id: ParamId) -> Result<ParamValue, SegmentError> {
        let field = self.field(id)?;
        Ok(field.codec().decode(&self.bytes[field.range()]))
    }

    pub fn write_field(&mut self, id: ParamId, value: &[u8]) -> Result<(), SegmentError> {
        let field = *self.field(id)?;
        if value.len() != field.length() {
            return Err(SegmentError::FieldLengthMismatch {
                param: id,
                expected: field.length(),
                actual: value.len(),
            });
        }
        self.bytes[field.range()].copy_from_slice(value);
        Ok(())
    }

    /// Byte offset of `address` within this segment, if it falls inside.
    pub fn locate(&self, address: Address) -> Option<usize> {
        address
            .offset_from(self.address)
            .map(|offset| offset as usize)
            .filter(|&offset| offset < self.bytes.len())
    }

    /// Fields touching `range`, in table order.
    pub fn fields_overlapping(
        &self,
        range: Range<usize>,
    ) -> impl Iterator<Item = &ParameterField> + '_ {
        self.layout
            .fields()
            .iter()
            .filter(move |field| field.overlaps(&range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xp50::{self, CommonParameter, PartParameter};

    fn common() -> Segment {
        Segment::new(xp50::PERFORMANCE_COMMON, xp50::COMMON_TARGET, xp50::common_layout())
    }

    fn tempo() -> ParamId {
        ParamId::Common(CommonParameter::PerformanceTempo)
    }

    #[test]
    fn test_zero_initialised() {
        let segment = common();
        assert_eq!(segment.len(), xp50::COMMON_LENGTH);
        assert!(segment.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let mut segment = common();
        let data: Vec<u8> = (0..xp50::COMMON_LENGTH as u8).collect();
        segment.decode(&data).unwrap();
        let encoded = segment.encode();
        segment.decode(&encoded).unwrap();
        assert_eq!(segment.encode(), data);
    }

    #[test]
    fn test_decode_length_mismatch_keeps_previous() {
        let mut segment = common();
        segment.write_field(tempo(), &[0x07, 0x08]).unwrap();
        let before = segment.encode();

        let err = segment.decode(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthMismatch {
                expected: xp50::COMMON_LENGTH,
                actual: 3
            }
        );
        assert_eq!(segment.encode(), before);
    }

    #[test]
    fn test_decode_at_bounds() {
        let mut segment = common();
        segment.decode_at(0x2D, &[0x06, 0x04]).unwrap();
        assert_eq!(segment.read_value(tempo()).unwrap(), ParamValue::Number(100));

        let err = segment.decode_at(xp50::COMMON_LENGTH - 1, &[1, 2]).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { .. }));
        assert_eq!(segment.read_value(tempo()).unwrap(), ParamValue::Number(100));
    }

    #[test]
    fn test_write_field_length_mismatch() {
        let mut segment = common();
        let before = segment.encode();
        let err = segment.write_field(tempo(), &[0x07]).unwrap_err();
        assert_eq!(
            err,
            SegmentError::FieldLengthMismatch {
                param: tempo(),
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(segment.encode(), before);
    }

    #[test]
    fn test_unknown_parameter() {
        let segment = common();
        let part_param = ParamId::Part(PartParameter::PartLevel);
        assert_eq!(
            segment.read_field(part_param),
            Err(SegmentError::UnknownParameter(part_param))
        );
    }

    #[test]
    fn test_layout_rejects_out_of_bounds_field() {
        let field = ParameterField::new(tempo(), 4, 2, FieldCodec::Nibbles);
        let err = SegmentLayout::new(SegmentKind::PerformanceCommon, 5, vec![field]).unwrap_err();
        assert!(matches!(err, SegmentError::FieldOutOfBounds { .. }));
    }

    #[test]
    fn test_locate_and_overlap() {
        let segment = common();
        let inside = xp50::PERFORMANCE_COMMON.offset(0x2E).unwrap();
        assert_eq!(segment.locate(inside), Some(0x2E));
        assert_eq!(segment.locate(xp50::part_address(0)), None);

        let ids: Vec<ParamId> = segment.fields_overlapping(0x2E..0x30).map(|f| f.id()).collect();
        assert_eq!(
            ids,
            vec![tempo(), ParamId::Common(CommonParameter::KeyboardRangeSwitch)]
        );
    }
}
