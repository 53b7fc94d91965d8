//! Inbound side of the hardware link.
//!
//! A worker thread owns the midir connection. The driver callback sorts raw
//! bytes into [`TransportEvent`]s: SysEx answering a tracked request becomes
//! `SysExRequested`, any other SysEx becomes `SysExEdit`.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{debug, info, warn};

use super::link::{self, LinkState};
use crate::channel::ChannelEvent;
use crate::error::{Error, Result};
use crate::request::RequestTracker;
use crate::sysex::{SysExMessage, SYSEX_START};
use crate::transport::TransportEvent;

const CLIENT_NAME: &str = "synthlive-in";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiInputDevice {
    pub index: usize,
    pub name: String,
}

enum Inbound {
    Open(usize),
    Close,
    Stop,
}

struct InputWorker {
    link: LinkState,
    events: Sender<TransportEvent>,
    tracker: Arc<RequestTracker>,
    connection: Option<MidiInputConnection<()>>,
}

impl InputWorker {
    fn run(mut self, inbox: Receiver<Inbound>) {
        for command in inbox {
            match command {
                Inbound::Open(index) => self.open(index),
                Inbound::Close => self.close(),
                Inbound::Stop => break,
            }
        }
        self.close();
    }

    fn open(&mut self, index: usize) {
        self.close();
        match self.connect(index) {
            Ok((connection, name)) => {
                info!("MIDI input open on {}", name);
                self.connection = Some(connection);
                self.link.mark_up(name);
            }
            Err(e) => warn!("Could not open MIDI input {}: {}", index, e),
        }
    }

    fn connect(&self, index: usize) -> Result<(MidiInputConnection<()>, String)> {
        let mut backend = MidiInput::new(CLIENT_NAME)?;
        // midir filters SysEx unless told otherwise.
        backend.ignore(Ignore::None);
        let (port, name) = link::open_port(&backend, index)?;

        let events = self.events.clone();
        let tracker = Arc::clone(&self.tracker);
        let connection = backend.connect(
            &port,
            "synthlive-sysex-in",
            move |_stamp, bytes, _| forward(bytes, &tracker, &events),
            (),
        )?;
        Ok((connection, name))
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            self.link.mark_down();
        }
    }
}

fn forward(bytes: &[u8], tracker: &RequestTracker, events: &Sender<TransportEvent>) {
    let Some(event) = classify(bytes, tracker) else {
        return;
    };
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!("Inbound queue full, event dropped"),
        Err(TrySendError::Disconnected(_)) => debug!("Inbound queue closed, event dropped"),
    }
}

/// Handle to the input worker thread. Dropping it stops the thread.
pub struct MidiInputManager {
    inbox: Sender<Inbound>,
    link: LinkState,
}

impl MidiInputManager {
    pub fn new(events: Sender<TransportEvent>, tracker: Arc<RequestTracker>) -> Result<Self> {
        let (inbox, commands) = bounded(16);
        let link = LinkState::new();
        let worker = InputWorker {
            link: link.clone(),
            events,
            tracker,
            connection: None,
        };

        thread::Builder::new()
            .name("midi-input-thread".to_string())
            .spawn(move || worker.run(commands))
            .map_err(|e| Error::MidiDevice(format!("cannot start input thread: {}", e)))?;

        Ok(Self { inbox, link })
    }

    pub fn list_devices() -> Vec<MidiInputDevice> {
        let Ok(backend) = MidiInput::new(CLIENT_NAME) else {
            return Vec::new();
        };
        link::port_names(&backend)
            .into_iter()
            .map(|(index, name)| MidiInputDevice { index, name })
            .collect()
    }

    pub fn connect(&self, index: usize) -> Result<()> {
        self.inbox
            .send(Inbound::Open(index))
            .map_err(|_| Error::WorkerStopped("input"))
    }

    pub fn connect_by_name(&self, pattern: &str) -> Result<()> {
        let ports: Vec<(usize, String)> = Self::list_devices()
            .into_iter()
            .map(|device| (device.index, device.name))
            .collect();
        self.connect(link::match_port(&ports, pattern, "input")?)
    }

    pub fn disconnect(&self) {
        if self.inbox.send(Inbound::Close).is_err() {
            debug!("Input worker already stopped");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_up()
    }

    pub fn connected_device_name(&self) -> Option<String> {
        self.link.port_name()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        let _ = self.inbox.send(Inbound::Stop);
    }
}

/// Turn raw input bytes into a transport event.
///
/// SysEx that cannot be parsed is still forwarded as an edit so the router
/// can report it; unparseable channel data is dropped here.
pub(crate) fn classify(message: &[u8], tracker: &RequestTracker) -> Option<TransportEvent> {
    match message.first() {
        Some(&SYSEX_START) => {
            let solicited = SysExMessage::parse(message)
                .map(|msg| tracker.complete(msg.address()))
                .unwrap_or(false);
            if solicited {
                Some(TransportEvent::SysExRequested(message.to_vec()))
            } else {
                Some(TransportEvent::SysExEdit(message.to_vec()))
            }
        }
        Some(_) => match ChannelEvent::from_bytes(message) {
            Ok(event) => Some(TransportEvent::Channel(event)),
            Err(e) => {
                debug!("Ignoring MIDI message: {}", e);
                None
            }
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::sysex::DeviceIdentity;
    use std::time::Instant;

    fn dt1(address: Address, data: &[u8]) -> Vec<u8> {
        SysExMessage::data_set(DeviceIdentity::default(), address, data)
            .unwrap()
            .to_bytes()
    }

    #[test]
    fn test_classify_requested_vs_edit() {
        let tracker = RequestTracker::default();
        let base = Address::from_bytes([0x01, 0x00, 0x10, 0x00]);
        tracker.track(base, 0x18, Instant::now());

        let bytes = dt1(base, &[0u8; 0x18]);
        assert_eq!(
            classify(&bytes, &tracker),
            Some(TransportEvent::SysExRequested(bytes.clone()))
        );

        // Request completed, so the same data again is an edit.
        assert_eq!(
            classify(&bytes, &tracker),
            Some(TransportEvent::SysExEdit(bytes))
        );
    }

    #[test]
    fn test_classify_channel_message() {
        let tracker = RequestTracker::default();
        assert_eq!(
            classify(&[0xC0, 12], &tracker),
            Some(TransportEvent::Channel(ChannelEvent::program_change(0, 12)))
        );
        assert_eq!(classify(&[], &tracker), None);
    }

    #[test]
    fn test_classify_malformed_sysex_is_edit() {
        let tracker = RequestTracker::default();
        let bytes = vec![0xF0, 0x41, 0xF7];
        assert_eq!(
            classify(&bytes, &tracker),
            Some(TransportEvent::SysExEdit(bytes))
        );
    }
}
