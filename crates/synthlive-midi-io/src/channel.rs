//! Channel-voice messages and bank/program accumulation.
//!
//! Bank select (CC 0 / CC 32) and program change arrive as separate messages.
//! [`BankProgramState`] keeps the latest of each so a program change can be
//! reported together with the bank it applies to.

use midi_msg::{ChannelVoiceMsg, ControlChange, MidiMsg};

use crate::error::{Error, Result};

pub const CC_BANK_SELECT_MSB: u8 = 0x00;
pub const CC_BANK_SELECT_LSB: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelCommand {
    NoteOff,
    NoteOn,
    PolyPressure,
    Controller,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
}

/// A channel message reduced to `(command, data1, data2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    /// MIDI channel (0-15)
    pub channel: u8,
    pub command: ChannelCommand,
    pub data1: u8,
    pub data2: u8,
}

impl ChannelEvent {
    pub fn new(channel: u8, command: ChannelCommand, data1: u8, data2: u8) -> Self {
        Self {
            channel: channel.min(15),
            command,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
        }
    }

    pub fn control_change(channel: u8, control: u8, value: u8) -> Self {
        Self::new(channel, ChannelCommand::Controller, control, value)
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(channel, ChannelCommand::ProgramChange, program, 0)
    }

    /// Parse raw channel-voice bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (msg, _len) = MidiMsg::from_midi(bytes)?;
        let (channel, msg) = match msg {
            MidiMsg::ChannelVoice { channel, msg } => (channel as u8, msg),
            _ => {
                return Err(Error::ChannelParse(
                    "Expected ChannelVoice message".to_string(),
                ))
            }
        };

        let event = match msg {
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                Self::new(channel, ChannelCommand::NoteOn, note, velocity)
            }
            ChannelVoiceMsg::NoteOff { note, velocity } => {
                Self::new(channel, ChannelCommand::NoteOff, note, velocity)
            }
            ChannelVoiceMsg::PolyPressure { note, pressure } => {
                Self::new(channel, ChannelCommand::PolyPressure, note, pressure)
            }
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control, value },
            } => Self::control_change(channel, control, value),
            ChannelVoiceMsg::ProgramChange { program } => Self::program_change(channel, program),
            ChannelVoiceMsg::ChannelPressure { pressure } => {
                Self::new(channel, ChannelCommand::ChannelPressure, pressure, 0)
            }
            ChannelVoiceMsg::PitchBend { bend } => Self::new(
                channel,
                ChannelCommand::PitchWheel,
                (bend & 0x7F) as u8,
                ((bend >> 7) & 0x7F) as u8,
            ),
            other => {
                return Err(Error::ChannelParse(format!(
                    "Unsupported channel message {:?}",
                    other
                )))
            }
        };
        Ok(event)
    }
}

/// Bank + program reported when a program change completes a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSelection {
    pub channel: u8,
    pub bank_msb: Option<u8>,
    pub bank_lsb: Option<u8>,
    pub program: u8,
}

/// Latest bank select MSB/LSB and program number seen on the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankProgramState {
    msb: Option<u8>,
    lsb: Option<u8>,
    patch: Option<u8>,
}

impl BankProgramState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into the state. Returns the selection on program change.
    pub fn apply(&mut self, event: &ChannelEvent) -> Option<ProgramSelection> {
        match event.command {
            ChannelCommand::Controller if event.data1 == CC_BANK_SELECT_MSB => {
                self.msb = Some(event.data2);
                None
            }
            ChannelCommand::Controller if event.data1 == CC_BANK_SELECT_LSB => {
                self.lsb = Some(event.data2);
                None
            }
            ChannelCommand::ProgramChange => {
                self.patch = Some(event.data1);
                Some(ProgramSelection {
                    channel: event.channel,
                    bank_msb: self.msb,
                    bank_lsb: self.lsb,
                    program: event.data1,
                })
            }
            _ => None,
        }
    }

    pub fn bank_msb(&self) -> Option<u8> {
        self.msb
    }

    pub fn bank_lsb(&self) -> Option<u8> {
        self.lsb
    }

    pub fn patch(&self) -> Option<u8> {
        self.patch
    }
}
