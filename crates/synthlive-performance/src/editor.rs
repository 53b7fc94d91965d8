//! Per-channel editor: a small cached view of tempo and part levels.
//!
//! One [`Editor`] type serves every part channel. Editors bound to the same
//! channel see each other's writes through the controller's fan-out, never
//! through direct references.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::controller::SharedController;
use crate::error::{Error, Result};
use crate::param::{ParamId, ParamValue};
use crate::params::{ChannelFilter, ParameterUpdate, SubscriberId};
use crate::xp50::{self, CommonParameter, PartParameter};

/// Parameters every editor tracks.
pub const EDITOR_COMMON: [CommonParameter; 1] = [CommonParameter::PerformanceTempo];
pub const EDITOR_PART: [PartParameter; 3] = [
    PartParameter::PartLevel,
    PartParameter::ChorusSendLevel,
    PartParameter::ReverbSendLevel,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Synced,
}

/// Change signal for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorChange {
    pub param: ParamId,
    pub channel: Option<u8>,
    pub value: u32,
}

type CacheKey = (ParamId, Option<u8>);

#[derive(Debug)]
struct EditorCache {
    state: SyncState,
    values: BTreeMap<CacheKey, u32>,
}

impl EditorCache {
    /// Store `value`, signalling if it differs from the cached one.
    fn store(&mut self, key: CacheKey, value: u32, signals: &Sender<EditorChange>) {
        if self.values.insert(key, value) == Some(value) {
            return;
        }
        let _ = signals.send(EditorChange {
            param: key.0,
            channel: key.1,
            value,
        });
    }
}

pub struct Editor {
    controller: SharedController,
    subscriber: SubscriberId,
    channel: u8,
    cache: Arc<Mutex<EditorCache>>,
    signals: Sender<EditorChange>,
    changes: Receiver<EditorChange>,
}

impl Editor {
    /// Subscribe to the tracked parameters of `channel` without reading
    /// anything yet. The editor stays [`SyncState::Uninitialized`] until
    /// [`sync`](Self::sync) succeeds.
    ///
    /// Must not be called while the controller lock is held.
    pub fn new(controller: &SharedController, channel: u8) -> Result<Self> {
        if channel as usize >= xp50::PART_COUNT {
            return Err(Error::UnknownChannel(channel));
        }

        let (signals, changes) = unbounded();
        let cache = Arc::new(Mutex::new(EditorCache {
            state: SyncState::Uninitialized,
            values: BTreeMap::new(),
        }));

        let callback_cache = Arc::clone(&cache);
        let callback_signals = signals.clone();
        let callback = move |update: &ParameterUpdate| {
            let Some(value) = update.value.as_number() else {
                return;
            };
            callback_cache
                .lock()
                .store((update.param, update.channel), value, &callback_signals);
        };
        let subscriber = controller
            .lock()
            .subscribe(ChannelFilter::Channel(channel), callback);

        Ok(Self {
            controller: Arc::clone(controller),
            subscriber,
            channel,
            cache,
            signals,
            changes,
        })
    }

    /// Fill the cache from the controller's segments and ask the device for
    /// fresh data. May be called again after a failure.
    pub fn sync(&self) -> Result<()> {
        let params = EDITOR_COMMON
            .iter()
            .map(|&p| ParamId::from(p))
            .chain(EDITOR_PART.iter().map(|&p| ParamId::from(p)));

        let mut ctl = self.controller.lock();
        ctl.request_parameters(self.subscriber, params)?;
        self.cache.lock().state = SyncState::Synced;
        debug!("Editor {} synced on channel {}", self.subscriber, self.channel);
        Ok(())
    }

    /// [`new`](Self::new) followed by [`sync`](Self::sync).
    pub fn attach(controller: &SharedController, channel: u8) -> Result<Self> {
        let editor = Self::new(controller, channel)?;
        editor.sync()?;
        Ok(editor)
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    pub fn state(&self) -> SyncState {
        self.cache.lock().state
    }

    pub fn changes(&self) -> &Receiver<EditorChange> {
        &self.changes
    }

    /// Drain queued change signals.
    pub fn take_changes(&self) -> Vec<EditorChange> {
        self.changes.try_iter().collect()
    }

    pub fn tempo(&self) -> Option<u32> {
        self.common(CommonParameter::PerformanceTempo)
    }

    pub fn common(&self, param: CommonParameter) -> Option<u32> {
        self.cache.lock().values.get(&(param.into(), None)).copied()
    }

    /// Cached part value for this editor's channel.
    pub fn part(&self, param: PartParameter) -> Option<u32> {
        self.cache
            .lock()
            .values
            .get(&(param.into(), Some(self.channel)))
            .copied()
    }

    /// Clamp `raw` into the parameter's range and write it. Returns the value sent.
    pub fn set_common(&self, param: CommonParameter, raw: i64) -> Result<u32> {
        let value = param.range().clamp(raw);
        self.write(param.into(), None, value)?;
        Ok(value)
    }

    /// Clamp and write a part parameter on any channel.
    pub fn set_part(&self, param: PartParameter, channel: u8, raw: i64) -> Result<u32> {
        let value = param.range().clamp(raw);
        self.write(param.into(), Some(channel), value)?;
        Ok(value)
    }

    pub fn set_tempo(&self, raw: i64) -> Result<u32> {
        self.set_common(CommonParameter::PerformanceTempo, raw)
    }

    /// [`set_part`](Self::set_part) on this editor's own channel.
    pub fn set_own_part(&self, param: PartParameter, raw: i64) -> Result<u32> {
        self.set_part(param, self.channel, raw)
    }

    fn write(&self, param: ParamId, channel: Option<u8>, value: u32) -> Result<()> {
        // Store before releasing the controller; inbound fan-out takes the same order.
        let mut ctl = self.controller.lock();
        ctl.set_value(
            Some(self.subscriber),
            param,
            channel,
            &ParamValue::Number(value),
        )?;

        let tracked = match param {
            ParamId::Common(p) => EDITOR_COMMON.contains(&p),
            ParamId::Part(p) => EDITOR_PART.contains(&p) && channel == Some(self.channel),
        };
        if tracked {
            self.cache.lock().store((param, channel), value, &self.signals);
        }
        drop(ctl);
        Ok(())
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        let _ = self.controller.lock().unsubscribe(self.subscriber);
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("subscriber", &self.subscriber)
            .field("channel", &self.channel)
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use synthlive_midi_io::{DeviceIdentity, RecordingTransport, TransportEvent};

    use super::*;
    use crate::controller::{ControllerOptions, PerformanceController};

    fn shared() -> (SharedController, RecordingTransport) {
        let transport = RecordingTransport::new(DeviceIdentity::default());
        let controller =
            PerformanceController::new(transport.clone(), ControllerOptions::default()).into_shared();
        (controller, transport)
    }

    #[test]
    fn test_attach_syncs_from_cache() {
        let (controller, transport) = shared();
        let editor = Editor::attach(&controller, 2).unwrap();
        assert_eq!(editor.state(), SyncState::Synced);
        assert_eq!(editor.tempo(), Some(0));
        assert_eq!(editor.part(PartParameter::PartLevel), Some(0));
        assert_eq!(editor.take_changes().len(), 4);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_new_editor_waits_for_sync() {
        let (controller, transport) = shared();
        let editor = Editor::new(&controller, 4).unwrap();
        assert_eq!(editor.state(), SyncState::Uninitialized);
        assert_eq!(editor.tempo(), None);
        assert!(transport.requests().is_empty());

        editor.sync().unwrap();
        assert_eq!(editor.state(), SyncState::Synced);
        assert_eq!(editor.part(PartParameter::PartLevel), Some(0));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_attach_rejects_bad_channel() {
        let (controller, _) = shared();
        assert!(matches!(
            Editor::attach(&controller, 16),
            Err(Error::UnknownChannel(16))
        ));
        assert_eq!(controller.lock().parameters().subscriber_count(), 0);
    }

    #[test]
    fn test_set_tempo_clamps_and_caches() {
        let (controller, transport) = shared();
        let editor = Editor::attach(&controller, 0).unwrap();
        editor.take_changes();

        assert_eq!(editor.set_tempo(10).unwrap(), 20);
        assert_eq!(editor.set_tempo(300).unwrap(), 250);
        assert_eq!(editor.tempo(), Some(250));
        assert_eq!(
            transport.writes().last().unwrap().1,
            vec![0x0F, 0x0A]
        );
        assert_eq!(editor.take_changes().len(), 2);
    }

    #[test]
    fn test_set_part_clamps() {
        let (controller, _) = shared();
        let editor = Editor::attach(&controller, 1).unwrap();
        assert_eq!(editor.set_own_part(PartParameter::ReverbSendLevel, -5).unwrap(), 0);
        assert_eq!(editor.set_own_part(PartParameter::ReverbSendLevel, 200).unwrap(), 127);
        assert_eq!(editor.part(PartParameter::ReverbSendLevel), Some(127));
    }

    #[test]
    fn test_editors_on_same_channel_follow_each_other() {
        let (controller, _) = shared();
        let a = Editor::attach(&controller, 5).unwrap();
        let b = Editor::attach(&controller, 5).unwrap();
        let other = Editor::attach(&controller, 6).unwrap();
        b.take_changes();
        other.take_changes();

        a.set_own_part(PartParameter::ChorusSendLevel, 90).unwrap();
        assert_eq!(b.part(PartParameter::ChorusSendLevel), Some(90));
        assert_eq!(other.part(PartParameter::ChorusSendLevel), Some(0));
        assert!(other.take_changes().is_empty());
        assert_eq!(b.take_changes().len(), 1);
    }

    #[test]
    fn test_echo_does_not_overwrite_tempo() {
        let (controller, transport) = shared();
        let editor = Editor::attach(&controller, 0).unwrap();
        editor.take_changes();

        editor.set_tempo(100).unwrap();
        let (address, data) = transport.writes().pop().unwrap();
        let echo = transport.echo_of(address, &data).unwrap();
        controller
            .lock()
            .handle_event(&TransportEvent::SysExEdit(echo))
            .unwrap();

        assert_eq!(editor.tempo(), Some(100));
        assert_eq!(editor.take_changes().len(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (controller, _) = shared();
        {
            let _editor = Editor::attach(&controller, 0).unwrap();
            assert_eq!(controller.lock().parameters().subscriber_count(), 1);
        }
        assert_eq!(controller.lock().parameters().subscriber_count(), 0);
    }
}
