//! Running session: the shared controller plus the inbound event source.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use synthlive_midi_io::{ProgramSelection, TransportEvent};
use synthlive_performance::{Editor, SegmentGroup, SegmentReceived, SharedController};

#[cfg(feature = "midi-hardware")]
use synthlive_midi_io::HardwareTransport;

use crate::builder::SessionBuilder;
use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// One connection to one instrument.
///
/// # Example
///
/// ```ignore
/// use synthlive::prelude::*;
///
/// let session = Session::builder()
///     .input_port("UM-ONE")
///     .output_port("UM-ONE")
///     .build()?;
/// let _dispatcher = session.spawn_dispatcher()?;
///
/// let editor = session.editor(0)?;
/// session.request_all()?;
/// editor.set_tempo(132)?;
/// ```
pub struct Session {
    controller: SharedController,
    events: Option<Receiver<TransportEvent>>,
    config: SessionConfig,

    #[cfg(feature = "midi-hardware")]
    hardware: Option<Arc<HardwareTransport>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub(crate) fn from_parts(
        controller: SharedController,
        events: Option<Receiver<TransportEvent>>,
        config: SessionConfig,
        #[cfg(feature = "midi-hardware")] hardware: Option<Arc<HardwareTransport>>,
    ) -> Self {
        Self {
            controller,
            events,
            config,
            #[cfg(feature = "midi-hardware")]
            hardware,
        }
    }

    pub fn controller(&self) -> &SharedController {
        &self.controller
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Editor bound to part `channel`, already filled from the cached segments.
    pub fn editor(&self, channel: u8) -> Result<Editor> {
        Ok(Editor::attach(&self.controller, channel)?)
    }

    /// Apply one inbound event.
    pub fn dispatch(&self, event: &TransportEvent) -> Result<()> {
        self.controller.lock().handle_event(event)?;
        Ok(())
    }

    /// Apply every queued inbound event without blocking. Returns how many were taken.
    ///
    /// Events that fail to decode are logged and skipped.
    pub fn dispatch_pending(&self) -> Result<usize> {
        let events = self.events.as_ref().ok_or(Error::NoEventSource)?;
        let mut handled = 0;
        for event in events.try_iter() {
            if let Err(e) = self.controller.lock().handle_event(&event) {
                debug!("Skipped inbound event: {}", e);
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Dispatch inbound events on a background thread until the source closes.
    pub fn spawn_dispatcher(&self) -> Result<JoinHandle<()>> {
        let events = self.events.clone().ok_or(Error::NoEventSource)?;
        let controller = Arc::clone(&self.controller);
        let handle = thread::Builder::new()
            .name("synthlive-dispatch".to_string())
            .spawn(move || {
                for event in events {
                    if let Err(e) = controller.lock().handle_event(&event) {
                        debug!("Skipped inbound event: {}", e);
                    }
                }
                info!("Inbound event source closed");
            })?;
        Ok(handle)
    }

    /// Ask the device for every known segment.
    pub fn request_all(&self) -> Result<()> {
        self.controller.lock().request_all()?;
        Ok(())
    }

    /// Register a callback for group-level "segment received" notifications.
    ///
    /// The callback runs with the controller locked and must not call back into the session.
    pub fn on_segment_received<F>(&self, group: SegmentGroup, callback: F)
    where
        F: FnMut(&SegmentReceived) + Send + 'static,
    {
        self.controller.lock().on_segment_received(group, callback);
    }

    pub fn program_selection(&self) -> Option<ProgramSelection> {
        self.controller.lock().program_selection()
    }

    #[cfg(feature = "midi-hardware")]
    pub fn hardware(&self) -> Option<&HardwareTransport> {
        self.hardware.as_deref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("has_events", &self.events.is_some())
            .finish()
    }
}
