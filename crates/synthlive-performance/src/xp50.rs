//! Roland XP-50 temporary performance memory map.
//!
//! Only the two segment kinds used by the editors are modelled: Performance
//! Common (`01 00 00 00`) and the sixteen Performance Parts (`01 00 1n 00`).

use std::sync::{Arc, OnceLock};

use synthlive_midi_io::Address;

use crate::param::{FieldCodec, ParamId, ValueRange};
use crate::segment::{ParameterField, SegmentKind, SegmentLayout};

pub const TEMPORARY_PERFORMANCE: Address = Address::from_bytes([0x01, 0x00, 0x00, 0x00]);
pub const PERFORMANCE_COMMON: Address = TEMPORARY_PERFORMANCE;

pub const COMMON_LENGTH: usize = 0x42;
pub const PART_LENGTH: usize = 0x18;

/// Number of performance parts.
pub const PART_COUNT: usize = 16;

/// Router target index of the Performance Common segment.
pub const COMMON_TARGET: usize = 16;

pub const TEMPO_RANGE: ValueRange = ValueRange::new(20, 250);

/// Base address of part `index` (0-15): `01 00 1n 00`.
pub const fn part_address(index: u8) -> Address {
    Address::from_bytes([0x01, 0x00, 0x10 + (index & 0x0F), 0x00])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CommonParameter {
    PerformanceName = 0x00,

    EfxSource = 0x0C,
    EfxType,
    EfxParameter1,
    EfxParameter2,
    EfxParameter3,
    EfxParameter4,
    EfxParameter5,
    EfxParameter6,
    EfxParameter7,
    EfxParameter8,
    EfxParameter9,
    EfxParameter10,
    EfxParameter11,
    EfxParameter12,
    EfxOutputAssign,
    EfxMixOutSendLevel,
    EfxChorusSendLevel,
    EfxReverbSendLevel,
    EfxControlSource1,
    EfxControlDepth1,
    EfxControlSource2,
    EfxControlDepth2,
    ChorusLevel,
    ChorusRate,
    ChorusDepth,
    ChorusPreDelay,
    ChorusFeedback,
    ChorusOutput,
    ReverbType,
    ReverbLevel,
    ReverbTime,
    ReverbHfDamp,
    DelayFeedback,

    /// Two nibble bytes.
    PerformanceTempo = 0x2D,

    KeyboardRangeSwitch = 0x2F,

    KeyboardMode = 0x40,
    ClockSource,
}

impl CommonParameter {
    pub const ALL: [CommonParameter; 38] = [
        CommonParameter::PerformanceName,
        CommonParameter::EfxSource,
        CommonParameter::EfxType,
        CommonParameter::EfxParameter1,
        CommonParameter::EfxParameter2,
        CommonParameter::EfxParameter3,
        CommonParameter::EfxParameter4,
        CommonParameter::EfxParameter5,
        CommonParameter::EfxParameter6,
        CommonParameter::EfxParameter7,
        CommonParameter::EfxParameter8,
        CommonParameter::EfxParameter9,
        CommonParameter::EfxParameter10,
        CommonParameter::EfxParameter11,
        CommonParameter::EfxParameter12,
        CommonParameter::EfxOutputAssign,
        CommonParameter::EfxMixOutSendLevel,
        CommonParameter::EfxChorusSendLevel,
        CommonParameter::EfxReverbSendLevel,
        CommonParameter::EfxControlSource1,
        CommonParameter::EfxControlDepth1,
        CommonParameter::EfxControlSource2,
        CommonParameter::EfxControlDepth2,
        CommonParameter::ChorusLevel,
        CommonParameter::ChorusRate,
        CommonParameter::ChorusDepth,
        CommonParameter::ChorusPreDelay,
        CommonParameter::ChorusFeedback,
        CommonParameter::ChorusOutput,
        CommonParameter::ReverbType,
        CommonParameter::ReverbLevel,
        CommonParameter::ReverbTime,
        CommonParameter::ReverbHfDamp,
        CommonParameter::DelayFeedback,
        CommonParameter::PerformanceTempo,
        CommonParameter::KeyboardRangeSwitch,
        CommonParameter::KeyboardMode,
        CommonParameter::ClockSource,
    ];

    pub fn offset(self) -> usize {
        self as u8 as usize
    }

    pub fn length(self) -> usize {
        match self {
            CommonParameter::PerformanceName => 12,
            CommonParameter::PerformanceTempo => 2,
            _ => 1,
        }
    }

    pub fn codec(self) -> FieldCodec {
        match self {
            CommonParameter::PerformanceName => FieldCodec::Ascii,
            CommonParameter::PerformanceTempo => FieldCodec::Nibbles,
            _ => FieldCodec::Byte,
        }
    }

    pub fn range(self) -> ValueRange {
        match self {
            CommonParameter::PerformanceTempo => TEMPO_RANGE,
            CommonParameter::EfxType => ValueRange::new(0, 39),
            CommonParameter::EfxSource => ValueRange::new(0, 16),
            CommonParameter::EfxOutputAssign | CommonParameter::ChorusOutput => {
                ValueRange::new(0, 2)
            }
            CommonParameter::ReverbType => ValueRange::new(0, 7),
            CommonParameter::KeyboardMode => ValueRange::new(0, 2),
            CommonParameter::KeyboardRangeSwitch | CommonParameter::ClockSource => {
                ValueRange::new(0, 1)
            }
            _ => ValueRange::BYTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PartParameter {
    ReceiveSwitch = 0x00,
    ReceiveChannel,
    PatchGroupType,
    PatchGroupId,
    /// Two nibble bytes.
    PatchNumber = 0x04,
    PartLevel = 0x06,
    PartPan,
    CoarseTune,
    FineTune,
    OutputAssign,
    MixEfxSendLevel,
    ChorusSendLevel,
    ReverbSendLevel,
    ReceiveProgramChange,
    ReceiveVolume,
    ReceiveHold1,
    KeyRangeLower,
    KeyRangeUpper,
    OctaveShift,
    LocalSwitch,
    TransmitSwitch,
    TransmitBankSelectGroup,
    TransmitVolume,
}

impl PartParameter {
    pub const ALL: [PartParameter; 23] = [
        PartParameter::ReceiveSwitch,
        PartParameter::ReceiveChannel,
        PartParameter::PatchGroupType,
        PartParameter::PatchGroupId,
        PartParameter::PatchNumber,
        PartParameter::PartLevel,
        PartParameter::PartPan,
        PartParameter::CoarseTune,
        PartParameter::FineTune,
        PartParameter::OutputAssign,
        PartParameter::MixEfxSendLevel,
        PartParameter::ChorusSendLevel,
        PartParameter::ReverbSendLevel,
        PartParameter::ReceiveProgramChange,
        PartParameter::ReceiveVolume,
        PartParameter::ReceiveHold1,
        PartParameter::KeyRangeLower,
        PartParameter::KeyRangeUpper,
        PartParameter::OctaveShift,
        PartParameter::LocalSwitch,
        PartParameter::TransmitSwitch,
        PartParameter::TransmitBankSelectGroup,
        PartParameter::TransmitVolume,
    ];

    pub fn offset(self) -> usize {
        self as u8 as usize
    }

    pub fn length(self) -> usize {
        match self {
            PartParameter::PatchNumber => 2,
            _ => 1,
        }
    }

    pub fn codec(self) -> FieldCodec {
        match self {
            PartParameter::PatchNumber => FieldCodec::Nibbles,
            _ => FieldCodec::Byte,
        }
    }

    pub fn range(self) -> ValueRange {
        match self {
            PartParameter::ReceiveChannel => ValueRange::new(0, 15),
            PartParameter::PatchGroupType | PartParameter::TransmitBankSelectGroup => {
                ValueRange::new(0, 2)
            }
            PartParameter::PatchNumber => ValueRange::new(0, 254),
            PartParameter::CoarseTune => ValueRange::new(16, 112),
            PartParameter::FineTune => ValueRange::new(14, 114),
            PartParameter::OutputAssign => ValueRange::new(0, 3),
            PartParameter::OctaveShift => ValueRange::new(61, 67),
            PartParameter::ReceiveSwitch
            | PartParameter::ReceiveProgramChange
            | PartParameter::ReceiveVolume
            | PartParameter::ReceiveHold1
            | PartParameter::LocalSwitch
            | PartParameter::TransmitSwitch
            | PartParameter::TransmitVolume => ValueRange::new(0, 1),
            _ => ValueRange::BYTE,
        }
    }
}

fn build_layout(
    kind: SegmentKind,
    length: usize,
    fields: Vec<ParameterField>,
) -> Arc<SegmentLayout> {
    match SegmentLayout::new(kind, length, fields) {
        Ok(layout) => Arc::new(layout),
        // Tables are static; a bad entry is caught by the layout tests.
        Err(e) => unreachable!("invalid XP-50 field table: {}", e),
    }
}

pub fn common_layout() -> Arc<SegmentLayout> {
    static LAYOUT: OnceLock<Arc<SegmentLayout>> = OnceLock::new();
    Arc::clone(LAYOUT.get_or_init(|| {
        let fields = CommonParameter::ALL
            .iter()
            .map(|&p| ParameterField::new(ParamId::Common(p), p.offset(), p.length(), p.codec()))
            .collect();
        build_layout(SegmentKind::PerformanceCommon, COMMON_LENGTH, fields)
    }))
}

pub fn part_layout() -> Arc<SegmentLayout> {
    static LAYOUT: OnceLock<Arc<SegmentLayout>> = OnceLock::new();
    Arc::clone(LAYOUT.get_or_init(|| {
        let fields = PartParameter::ALL
            .iter()
            .map(|&p| ParameterField::new(ParamId::Part(p), p.offset(), p.length(), p.codec()))
            .collect();
        build_layout(SegmentKind::PerformancePart, PART_LENGTH, fields)
    }))
}
