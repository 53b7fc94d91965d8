//! Builder for configuring and constructing a `Session`.

use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::info;

use synthlive_midi_io::{DeviceIdentity, RetryPolicy, SysExTransport, TransportEvent};
use synthlive_performance::{GroupCounts, PerformanceController};

#[cfg(feature = "midi-hardware")]
use std::sync::Arc;

#[cfg(feature = "midi-hardware")]
use synthlive_midi_io::HardwareTransport;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::session::Session;

/// With the `midi-hardware` feature and no explicit transport, `build()` opens
/// a midir transport and connects the configured ports. Supplying a transport
/// (e.g. a `RecordingTransport`) skips hardware entirely; inbound events then
/// come from the receiver passed to [`events`](Self::events).
///
/// # Example
///
/// ```ignore
/// use synthlive::prelude::*;
///
/// let transport = RecordingTransport::new(DeviceIdentity::default());
/// let session = Session::builder()
///     .groups(4, 4)
///     .transport(transport.clone())
///     .build()?;
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    transport: Option<Box<dyn SysExTransport>>,
    events: Option<Receiver<TransportEvent>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting with `config`.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: device 0x10, model 0x6A
    pub fn device(mut self, identity: DeviceIdentity) -> Self {
        self.config.device = identity;
        self
    }

    pub fn input_port(mut self, name: impl Into<String>) -> Self {
        self.config.input_port = Some(name.into());
        self
    }

    pub fn output_port(mut self, name: impl Into<String>) -> Self {
        self.config.output_port = Some(name.into());
        self
    }

    /// Default: 8 song channels, 8 fast channels
    pub fn groups(mut self, song_channels: usize, fast_channels: usize) -> Self {
        self.config.groups = GroupCounts {
            song_channels,
            fast_channels,
        };
        self
    }

    /// Default: 1s. Windows beyond `u64::MAX` milliseconds saturate.
    pub fn echo_window(mut self, window: Duration) -> Self {
        self.config.echo_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Only used by the hardware transport.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: SysExTransport + 'static,
    {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Inbound events for a custom transport.
    pub fn events(mut self, events: Receiver<TransportEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        let options = self.config.controller_options();

        if let Some(transport) = self.transport {
            let controller = PerformanceController::new(transport, options).into_shared();
            info!("Session started on a custom transport");
            return Ok(Session::from_parts(
                controller,
                self.events,
                self.config,
                #[cfg(feature = "midi-hardware")]
                None,
            ));
        }

        #[cfg(feature = "midi-hardware")]
        {
            let hardware = Arc::new(HardwareTransport::new(self.config.device, self.config.retry)?);
            match (&self.config.input_port, &self.config.output_port) {
                (Some(input), Some(output)) => hardware.connect_by_name(input, output)?,
                (None, None) => info!("No MIDI ports configured; connect through Session::hardware()"),
                _ => {
                    return Err(Error::InvalidConfig(
                        "input_port and output_port must be set together".to_string(),
                    ))
                }
            }

            let events = hardware.events().clone();
            let controller = PerformanceController::new(Arc::clone(&hardware), options).into_shared();
            Ok(Session::from_parts(
                controller,
                Some(events),
                self.config,
                Some(hardware),
            ))
        }

        #[cfg(not(feature = "midi-hardware"))]
        {
            Err(Error::InvalidConfig(
                "no transport supplied and hardware MIDI is disabled".to_string(),
            ))
        }
    }
}
