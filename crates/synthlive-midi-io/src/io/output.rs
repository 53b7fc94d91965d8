//! Outbound side of the hardware link.
//!
//! A worker thread owns the midir connection. Besides writing queued SysEx,
//! it resends timed-out data requests whenever its queue has been idle for
//! one poll interval.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use midir::{MidiOutput, MidiOutputConnection};
use tracing::{debug, info, warn};

use super::link::{self, LinkState};
use crate::error::{Error, Result};
use crate::request::RequestTracker;
use crate::sysex::{DeviceIdentity, SysExMessage};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const OUTBOX_CAPACITY: usize = 1024;
const CLIENT_NAME: &str = "synthlive-out";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiOutputDevice {
    pub index: usize,
    pub name: String,
}

enum Outbound {
    Open(usize),
    Close,
    Bytes(Vec<u8>),
    Stop,
}

struct OutputWorker {
    link: LinkState,
    identity: DeviceIdentity,
    tracker: Arc<RequestTracker>,
    connection: Option<MidiOutputConnection>,
}

impl OutputWorker {
    fn run(mut self, inbox: Receiver<Outbound>) {
        loop {
            let command = match inbox.recv_timeout(POLL_INTERVAL) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    self.resend_due();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match command {
                Outbound::Open(index) => self.open(index),
                Outbound::Close => {
                    self.close();
                    self.tracker.clear();
                }
                Outbound::Bytes(bytes) => self.write(&bytes),
                Outbound::Stop => break,
            }
        }
        self.close();
    }

    fn open(&mut self, index: usize) {
        self.close();
        let opened = MidiOutput::new(CLIENT_NAME)
            .map_err(Error::from)
            .and_then(|backend| {
                let (port, name) = link::open_port(&backend, index)?;
                let connection = backend.connect(&port, "synthlive-sysex-out")?;
                Ok((connection, name))
            });

        match opened {
            Ok((connection, name)) => {
                info!("MIDI output open on {}", name);
                self.connection = Some(connection);
                self.link.mark_up(name);
            }
            Err(e) => warn!("Could not open MIDI output {}: {}", index, e),
        }
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            self.link.mark_down();
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        match self.connection.as_mut() {
            Some(connection) => {
                if let Err(e) = connection.send(bytes) {
                    warn!("MIDI write of {} bytes failed: {}", bytes.len(), e);
                }
            }
            None => debug!("Dropping {} outbound bytes, port closed", bytes.len()),
        }
    }

    fn resend_due(&mut self) {
        if self.connection.is_none() {
            return;
        }
        for request in self.tracker.take_due(Instant::now()) {
            match SysExMessage::data_request(self.identity, request.address, request.length) {
                Ok(message) => {
                    debug!(
                        "Retrying request {} (retry {})",
                        request.address, request.retries
                    );
                    self.write(&message.to_bytes());
                }
                Err(e) => warn!("Cannot rebuild request {}: {}", request.address, e),
            }
        }
    }
}

/// Handle to the output worker thread. Dropping it stops the thread.
pub struct MidiOutputManager {
    outbox: Sender<Outbound>,
    link: LinkState,
}

impl MidiOutputManager {
    pub fn new(identity: DeviceIdentity, tracker: Arc<RequestTracker>) -> Result<Self> {
        let (outbox, inbox) = bounded(OUTBOX_CAPACITY);
        let link = LinkState::new();
        let worker = OutputWorker {
            link: link.clone(),
            identity,
            tracker,
            connection: None,
        };

        thread::Builder::new()
            .name("midi-output-thread".to_string())
            .spawn(move || worker.run(inbox))
            .map_err(|e| Error::MidiDevice(format!("cannot start output thread: {}", e)))?;

        Ok(Self { outbox, link })
    }

    pub fn list_devices() -> Vec<MidiOutputDevice> {
        MidiOutput::new(CLIENT_NAME)
            .map(|backend| {
                link::port_names(&backend)
                    .into_iter()
                    .map(|(index, name)| MidiOutputDevice { index, name })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Open port `index`. The worker connects asynchronously.
    pub fn connect(&self, index: usize) -> Result<()> {
        self.command(Outbound::Open(index))
    }

    pub fn connect_by_name(&self, pattern: &str) -> Result<()> {
        let ports: Vec<(usize, String)> = Self::list_devices()
            .into_iter()
            .map(|device| (device.index, device.name))
            .collect();
        self.connect(link::match_port(&ports, pattern, "output")?)
    }

    /// Close the port and forget outstanding requests.
    pub fn disconnect(&self) {
        if self.command(Outbound::Close).is_err() {
            debug!("Output worker already stopped");
        }
    }

    /// Queue raw bytes for the worker.
    pub fn send(&self, bytes: Vec<u8>) -> Result<()> {
        if !self.link.is_up() {
            return Err(Error::NotConnected);
        }
        self.outbox
            .try_send(Outbound::Bytes(bytes))
            .map_err(|e| match e {
                TrySendError::Full(_) => Error::MidiPort("output queue full".to_string()),
                TrySendError::Disconnected(_) => Error::WorkerStopped("output"),
            })
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_up()
    }

    pub fn connected_device_name(&self) -> Option<String> {
        self.link.port_name()
    }

    fn command(&self, command: Outbound) -> Result<()> {
        self.outbox
            .send(command)
            .map_err(|_| Error::WorkerStopped("output"))
    }
}

impl Drop for MidiOutputManager {
    fn drop(&mut self) {
        let _ = self.outbox.send(Outbound::Stop);
    }
}
