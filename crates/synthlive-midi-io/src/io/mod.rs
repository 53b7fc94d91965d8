//! Hardware MIDI I/O.
//!
//! Device enumeration, connection, and SysEx exchange via midir.
//! Requires the `midi-io` feature.

mod input;
mod link;
mod output;

pub use input::{MidiInputDevice, MidiInputManager};
pub use output::{MidiOutputDevice, MidiOutputManager};

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::request::{RequestTracker, RetryPolicy};
use crate::sysex::{DeviceIdentity, SysExMessage};
use crate::transport::{SysExTransport, TransportEvent};

/// Inbound events buffered between the driver callback and the dispatcher.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// midir-backed transport talking Roland SysEx to one instrument.
///
/// Outbound messages go through the output thread; inbound events are
/// available from [`HardwareTransport::events`].
pub struct HardwareTransport {
    identity: DeviceIdentity,
    input: MidiInputManager,
    output: MidiOutputManager,
    tracker: Arc<RequestTracker>,
    events: Receiver<TransportEvent>,
}

impl HardwareTransport {
    pub fn new(identity: DeviceIdentity, retry: RetryPolicy) -> Result<Self> {
        let tracker = Arc::new(RequestTracker::new(retry));
        let (sender, events) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        let input = MidiInputManager::new(sender, Arc::clone(&tracker))?;
        let output = MidiOutputManager::new(identity, Arc::clone(&tracker))?;

        Ok(Self {
            identity,
            input,
            output,
            tracker,
            events,
        })
    }

    pub fn list_input_devices() -> Vec<MidiInputDevice> {
        MidiInputManager::list_devices()
    }

    pub fn list_output_devices() -> Vec<MidiOutputDevice> {
        MidiOutputManager::list_devices()
    }

    /// Connect input and output ports by index. Connection completes asynchronously.
    pub fn connect(&self, input_index: usize, output_index: usize) -> Result<()> {
        self.input.connect(input_index)?;
        self.output.connect(output_index)
    }

    /// Connect input and output ports by partial name match.
    pub fn connect_by_name(&self, input_name: &str, output_name: &str) -> Result<()> {
        self.input.connect_by_name(input_name)?;
        self.output.connect_by_name(output_name)
    }

    pub fn disconnect(&self) {
        self.input.disconnect();
        self.output.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_connected() && self.output.is_connected()
    }

    pub fn connected_device_names(&self) -> (Option<String>, Option<String>) {
        (
            self.input.connected_device_name(),
            self.output.connected_device_name(),
        )
    }

    /// Receiver of inbound events. Clone it to consume from another thread.
    pub fn events(&self) -> &Receiver<TransportEvent> {
        &self.events
    }

    pub fn pending_requests(&self) -> usize {
        self.tracker.len()
    }
}

impl SysExTransport for HardwareTransport {
    /// Requests made while the output port is still opening are tracked and
    /// go out from the retry loop once the port is up.
    fn request_data(&self, address: Address, length: u32) -> Result<()> {
        let msg = SysExMessage::data_request(self.identity, address, length)?;
        self.tracker.track(address, length, Instant::now());
        match self.output.send(msg.to_bytes()) {
            Err(Error::NotConnected) => {
                debug!("Output not open yet; request {} left to the retry loop", address);
                Ok(())
            }
            result => result,
        }
    }

    fn send_data(&self, address: Address, data: &[u8]) -> Result<()> {
        let msg = SysExMessage::data_set(self.identity, address, data)?;
        self.output.send(msg.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_before_connect_is_kept_for_retry() {
        let transport =
            HardwareTransport::new(DeviceIdentity::default(), RetryPolicy::default()).unwrap();
        let common = Address::from_bytes([0x01, 0x00, 0x00, 0x00]);

        transport.request_data(common, 0x42).unwrap();
        assert_eq!(transport.pending_requests(), 1);
        assert!(matches!(
            transport.send_data(common, &[0x00]),
            Err(Error::NotConnected)
        ));
    }
}
