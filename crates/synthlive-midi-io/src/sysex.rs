//! Roland System Exclusive envelope (DT1 data set / RQ1 data request).
//!
//! ```text
//! F0 41 <device> <model> <command> a a a a <body...> <checksum> F7
//! ```
//!
//! For DT1 the body is the data written at the address. For RQ1 the body is
//! the 4-byte 7-bit size of the requested range. The checksum covers the
//! address and body bytes.

use serde::{Deserialize, Serialize};

use crate::address::{decode_size, encode_size, Address};
use crate::error::SysExError;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const ROLAND_ID: u8 = 0x41;

/// Framing overhead: start, manufacturer, device, model, command, 4 address bytes, checksum, end.
const ENVELOPE_LEN: usize = 11;
const ADDRESS_INDEX: usize = 5;
const BODY_INDEX: usize = 9;

/// Which instrument a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceIdentity {
    /// Device ID as set on the instrument (0x10 = device 17, the factory default).
    pub device_id: u8,
    /// Model ID (0x6A for the JV/XP family).
    pub model_id: u8,
}

impl DeviceIdentity {
    pub const fn new(device_id: u8, model_id: u8) -> Self {
        Self {
            device_id,
            model_id,
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new(0x10, 0x6A)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysExCommand {
    /// RQ1 (0x11)
    DataRequest,
    /// DT1 (0x12)
    DataSet,
}

impl SysExCommand {
    pub const fn byte(self) -> u8 {
        match self {
            SysExCommand::DataRequest => 0x11,
            SysExCommand::DataSet => 0x12,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, SysExError> {
        match byte {
            0x11 => Ok(SysExCommand::DataRequest),
            0x12 => Ok(SysExCommand::DataSet),
            other => Err(SysExError::Command(other)),
        }
    }
}

/// Roland checksum over address + body bytes.
pub fn roland_checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u32, |acc, &b| acc + (b & 0x7F) as u32);
    ((128 - (sum % 128)) % 128) as u8
}

fn check_seven_bit(data: &[u8]) -> Result<(), SysExError> {
    match data.iter().position(|&b| b > 0x7F) {
        Some(index) => Err(SysExError::DataByte {
            index,
            value: data[index],
        }),
        None => Ok(()),
    }
}

/// A decoded (or to-be-encoded) Roland SysEx message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExMessage {
    identity: DeviceIdentity,
    command: SysExCommand,
    address: Address,
    body: Vec<u8>,
}

impl SysExMessage {
    /// DT1: write `data` starting at `address`.
    pub fn data_set(
        identity: DeviceIdentity,
        address: Address,
        data: &[u8],
    ) -> Result<Self, SysExError> {
        check_seven_bit(data)?;
        if let Some(len) = u32::try_from(data.len()).ok().filter(|&len| len > 0) {
            address
                .offset(len - 1)
                .ok_or(SysExError::AddressOverflow(address))?;
        }
        Ok(Self {
            identity,
            command: SysExCommand::DataSet,
            address,
            body: data.to_vec(),
        })
    }

    /// RQ1: ask for `length` bytes starting at `address`.
    pub fn data_request(
        identity: DeviceIdentity,
        address: Address,
        length: u32,
    ) -> Result<Self, SysExError> {
        let size = encode_size(length).ok_or(SysExError::AddressOverflow(address))?;
        Ok(Self {
            identity,
            command: SysExCommand::DataRequest,
            address,
            body: size.to_vec(),
        })
    }

    /// Parse a complete `F0 .. F7` buffer.
    pub fn parse(buffer: &[u8]) -> Result<Self, SysExError> {
        if buffer.len() < ENVELOPE_LEN {
            return Err(SysExError::TooShort(buffer.len()));
        }
        let last = buffer.len() - 1;
        if buffer[0] != SYSEX_START {
            return Err(SysExError::Framing {
                expected: SYSEX_START,
                found: buffer[0],
            });
        }
        if buffer[last] != SYSEX_END {
            return Err(SysExError::Framing {
                expected: SYSEX_END,
                found: buffer[last],
            });
        }
        if buffer[1] != ROLAND_ID {
            return Err(SysExError::Manufacturer(buffer[1]));
        }

        let identity = DeviceIdentity::new(buffer[2], buffer[3]);
        let command = SysExCommand::from_byte(buffer[4])?;

        let checked = &buffer[ADDRESS_INDEX..last - 1];
        check_seven_bit(checked)?;

        let found = buffer[last - 1];
        let expected = roland_checksum(checked);
        if found != expected {
            return Err(SysExError::Checksum { expected, found });
        }

        let address = Address::from_bytes([
            buffer[ADDRESS_INDEX],
            buffer[ADDRESS_INDEX + 1],
            buffer[ADDRESS_INDEX + 2],
            buffer[ADDRESS_INDEX + 3],
        ]);
        let body = buffer[BODY_INDEX..last - 1].to_vec();

        if command == SysExCommand::DataRequest && body.len() != 4 {
            return Err(SysExError::TooShort(buffer.len()));
        }

        Ok(Self {
            identity,
            command,
            address,
            body,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENVELOPE_LEN + self.body.len());
        bytes.extend_from_slice(&[
            SYSEX_START,
            ROLAND_ID,
            self.identity.device_id,
            self.identity.model_id,
            self.command.byte(),
        ]);
        bytes.extend_from_slice(&self.address.to_bytes());
        bytes.extend_from_slice(&self.body);
        bytes.push(roland_checksum(&bytes[ADDRESS_INDEX..]));
        bytes.push(SYSEX_END);
        bytes
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn command(&self) -> SysExCommand {
        self.command
    }

    /// Target address of the message.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Data bytes of a DT1 message (empty slice semantics for RQ1 are not meaningful).
    pub fn payload(&self) -> &[u8] {
        &self.body
    }

    /// Requested byte count for RQ1 messages.
    pub fn requested_length(&self) -> Option<u32> {
        match (self.command, self.body.as_slice()) {
            (SysExCommand::DataRequest, &[a, b, c, d]) => Some(decode_size([a, b, c, d])),
            _ => None,
        }
    }
}
