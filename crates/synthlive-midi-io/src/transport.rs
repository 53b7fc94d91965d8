//! Transport boundary: outbound request/write operations and inbound events.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::channel::ChannelEvent;
use crate::error::Result;
use crate::sysex::{DeviceIdentity, SysExMessage};

/// Inbound event delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bank select, program change and other channel messages.
    Channel(ChannelEvent),
    /// SysEx answering one of our data requests.
    SysExRequested(Vec<u8>),
    /// Unsolicited SysEx (front-panel edit or echo of a write).
    SysExEdit(Vec<u8>),
}

impl TransportEvent {
    /// Raw SysEx buffer, if this is a SysEx event of either provenance.
    pub fn sysex(&self) -> Option<&[u8]> {
        match self {
            TransportEvent::SysExRequested(buffer) | TransportEvent::SysExEdit(buffer) => {
                Some(buffer)
            }
            TransportEvent::Channel(_) => None,
        }
    }
}

/// Outbound side of the device link. Both operations are fire-and-forget:
/// `Ok` means the message was handed to the link, not that the device applied it.
pub trait SysExTransport: Send {
    /// Ask the device to send back `length` bytes starting at `address`.
    fn request_data(&self, address: Address, length: u32) -> Result<()>;

    /// Write `data` to device memory starting at `address`.
    fn send_data(&self, address: Address, data: &[u8]) -> Result<()>;
}

impl<T: SysExTransport + Sync + ?Sized> SysExTransport for Arc<T> {
    fn request_data(&self, address: Address, length: u32) -> Result<()> {
        (**self).request_data(address, length)
    }

    fn send_data(&self, address: Address, data: &[u8]) -> Result<()> {
        (**self).send_data(address, data)
    }
}

impl<T: SysExTransport + ?Sized> SysExTransport for Box<T> {
    fn request_data(&self, address: Address, length: u32) -> Result<()> {
        (**self).request_data(address, length)
    }

    fn send_data(&self, address: Address, data: &[u8]) -> Result<()> {
        (**self).send_data(address, data)
    }
}

/// Message captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Request { address: Address, length: u32 },
    Write { address: Address, data: Vec<u8> },
}

/// In-memory transport that records what would have been sent.
///
/// Messages are validated through the same SysEx framing as the hardware
/// transport, so 7-bit and address-range errors surface identically.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    identity: DeviceIdentity,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingTransport {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn writes(&self) -> Vec<(Address, Vec<u8>)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|msg| match msg {
                OutboundMessage::Write { address, data } => Some((*address, data.clone())),
                OutboundMessage::Request { .. } => None,
            })
            .collect()
    }

    pub fn requests(&self) -> Vec<(Address, u32)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|msg| match msg {
                OutboundMessage::Request { address, length } => Some((*address, *length)),
                OutboundMessage::Write { .. } => None,
            })
            .collect()
    }

    /// Build the DT1 bytes the device would send back for a write,
    /// useful for simulating echoes.
    pub fn echo_of(&self, address: Address, data: &[u8]) -> Result<Vec<u8>> {
        Ok(SysExMessage::data_set(self.identity, address, data)?.to_bytes())
    }
}

impl SysExTransport for RecordingTransport {
    fn request_data(&self, address: Address, length: u32) -> Result<()> {
        SysExMessage::data_request(self.identity, address, length)?;
        self.sent
            .lock()
            .push(OutboundMessage::Request { address, length });
        Ok(())
    }

    fn send_data(&self, address: Address, data: &[u8]) -> Result<()> {
        SysExMessage::data_set(self.identity, address, data)?;
        self.sent.lock().push(OutboundMessage::Write {
            address,
            data: data.to_vec(),
        });
        Ok(())
    }
}
