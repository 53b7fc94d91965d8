//! Parameter subscriptions, local writes, and fan-out of decoded changes.
//!
//! Interest is kept as an ordered list of subscribers per [`ParamId`];
//! fan-out walks that list in subscription order.
//!
//! Echo handling: every local write queues the written bytes for its
//! `(target, param)`. When inbound data covers the field and its bytes equal a
//! queued entry, the entry and everything older is consumed and nobody is
//! notified. If newer writes are still queued, the latest local bytes are put
//! back into the segment so a late echo cannot roll the cache back. Inbound
//! bytes matching no queued entry are a device-side change: the queue is
//! cleared and the change fans out as usual. Queued entries older than the
//! echo window are discarded on every write and every inbound decode, and each
//! field keeps at most [`MAX_PENDING_ECHOES`] of them.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, trace};

use synthlive_midi_io::{Address, SysExError, SysExTransport};

use crate::error::{Error, Result};
use crate::param::{ParamId, ParamValue};
use crate::router::{RoutedData, SegmentRegistry};
use crate::segment::ParameterField;
use crate::xp50;

pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_millis(1000);

/// Unechoed writes remembered per field; older ones are forgotten first.
pub const MAX_PENDING_ECHOES: usize = 32;

/// Opaque handle for one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which part channels a subscriber hears about. Common parameters pass every filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFilter {
    All,
    Channel(u8),
}

impl ChannelFilter {
    pub fn accepts(self, channel: Option<u8>) -> bool {
        match (self, channel) {
            (ChannelFilter::All, _) | (ChannelFilter::Channel(_), None) => true,
            (ChannelFilter::Channel(wanted), Some(channel)) => wanted == channel,
        }
    }

    fn channels(self) -> Vec<u8> {
        match self {
            ChannelFilter::All => (0..xp50::PART_COUNT as u8).collect(),
            ChannelFilter::Channel(channel) => vec![channel],
        }
    }
}

/// One decoded value delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterUpdate {
    pub param: ParamId,
    /// Part channel for part parameters, `None` for common ones.
    pub channel: Option<u8>,
    pub value: ParamValue,
}

pub type ParameterCallback = Box<dyn FnMut(&ParameterUpdate) + Send>;

struct Subscription {
    filter: ChannelFilter,
    params: BTreeSet<ParamId>,
    callback: ParameterCallback,
}

#[derive(Debug, Clone)]
struct PendingEcho {
    bytes: Vec<u8>,
    written_at: Instant,
}

pub struct ParameterManager {
    next_id: u64,
    subscriptions: HashMap<SubscriberId, Subscription>,
    interest: BTreeMap<ParamId, SmallVec<[SubscriberId; 4]>>,
    pending: HashMap<(usize, ParamId), VecDeque<PendingEcho>>,
    echo_window: Duration,
}

impl ParameterManager {
    pub fn new(echo_window: Duration) -> Self {
        Self {
            next_id: 0,
            subscriptions: HashMap::new(),
            interest: BTreeMap::new(),
            pending: HashMap::new(),
            echo_window,
        }
    }

    pub fn echo_window(&self) -> Duration {
        self.echo_window
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Local writes still waiting for their echo.
    pub fn pending_echoes(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    /// Register a consumer. It receives nothing until it requests parameters.
    pub fn subscribe<F>(&mut self, filter: ChannelFilter, callback: F) -> SubscriberId
    where
        F: FnMut(&ParameterUpdate) + Send + 'static,
    {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                filter,
                params: BTreeSet::new(),
                callback: Box::new(callback),
            },
        );
        debug!("Subscriber {} registered ({:?})", id, filter);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> Result<()> {
        let subscription = self
            .subscriptions
            .remove(&id)
            .ok_or(Error::UnknownSubscriber(id.raw()))?;
        for param in &subscription.params {
            if let Some(ids) = self.interest.get_mut(param) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.interest.remove(param);
                }
            }
        }
        debug!("Subscriber {} removed", id);
        Ok(())
    }

    /// Add `params` to a subscriber's interest set, deliver the cached values
    /// synchronously, then ask the device for every segment involved.
    ///
    /// Nothing is registered if any parameter cannot be resolved.
    pub fn request_parameters<I>(
        &mut self,
        registry: &SegmentRegistry,
        transport: &dyn SysExTransport,
        id: SubscriberId,
        params: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = ParamId>,
    {
        let filter = self
            .subscriptions
            .get(&id)
            .map(|s| s.filter)
            .ok_or(Error::UnknownSubscriber(id.raw()))?;

        let params: Vec<ParamId> = params.into_iter().collect();
        let mut deliveries = Vec::new();
        let mut segments = BTreeMap::new();
        for &param in &params {
            let channels: Vec<Option<u8>> = if param.is_part() {
                filter.channels().into_iter().map(Some).collect()
            } else {
                vec![None]
            };
            for channel in channels {
                let segment = registry.segment_for(param, channel)?;
                let value = segment.read_value(param)?;
                segments.insert(segment.address(), segment.len() as u32);
                deliveries.push(ParameterUpdate {
                    param,
                    channel,
                    value,
                });
            }
        }

        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return Err(Error::UnknownSubscriber(id.raw()));
        };
        for &param in &params {
            if subscription.params.insert(param) {
                self.interest.entry(param).or_default().push(id);
            }
        }
        for update in &deliveries {
            (subscription.callback)(update);
        }

        for (address, length) in segments {
            debug!("Requesting {} bytes at {} for subscriber {}", length, address, id);
            transport.request_data(address, length)?;
        }
        Ok(())
    }

    /// Write `value` into the owning segment, send it to the device, and tell
    /// every other interested subscriber.
    ///
    /// Unknown parameters, wrong lengths, and bytes above 0x7F are rejected
    /// before the segment or the transport is touched. If the transport refuses
    /// the write, the segment keeps its previous bytes and nobody is notified.
    #[allow(clippy::too_many_arguments)]
    pub fn set_parameter(
        &mut self,
        registry: &mut SegmentRegistry,
        transport: &dyn SysExTransport,
        setter: Option<SubscriberId>,
        param: ParamId,
        channel: Option<u8>,
        value: &[u8],
        now: Instant,
    ) -> Result<()> {
        if let Some(id) = setter {
            if !self.subscriptions.contains_key(&id) {
                return Err(Error::UnknownSubscriber(id.raw()));
            }
        }
        if let Some(&byte) = value.iter().find(|&&b| b > 0x7F) {
            return Err(Error::ValueOutOfRange { param, value: byte });
        }

        let segment = registry.segment_for_mut(param, channel)?;
        let field = *segment.field(param)?;
        let base = segment.address();
        let address = field_address(base, &field).ok_or(SysExError::AddressOverflow(base))?;
        let previous = segment.read_field(param)?.to_vec();
        segment.write_field(param, value)?;

        if let Err(e) = transport.send_data(address, value) {
            segment.write_field(param, &previous)?;
            debug!("Write of {:?} at {} failed, segment left unchanged: {}", param, address, e);
            return Err(e.into());
        }
        let target = segment.target();
        let decoded = field.codec().decode(value);
        debug!("Wrote {:?} = {} at {}", param, decoded, address);

        let channel = SegmentRegistry::channel_of(target);
        self.notify(param, channel, &decoded, setter);
        self.queue_echo(target, param, value, now);
        Ok(())
    }

    /// Drop expired echoes everywhere, then queue `bytes` for `(target, param)`,
    /// keeping at most [`MAX_PENDING_ECHOES`] per field.
    fn queue_echo(&mut self, target: usize, param: ParamId, bytes: &[u8], now: Instant) {
        let window = self.echo_window;
        self.pending.retain(|_, queue| {
            queue.retain(|echo| now.saturating_duration_since(echo.written_at) <= window);
            !queue.is_empty()
        });

        let queue = self.pending.entry((target, param)).or_default();
        if queue.len() >= MAX_PENDING_ECHOES {
            queue.pop_front();
        }
        queue.push_back(PendingEcho {
            bytes: bytes.to_vec(),
            written_at: now,
        });
    }

    /// Apply the echo policy and fan out every field changed by `routed`.
    pub fn on_segment_decoded(
        &mut self,
        registry: &mut SegmentRegistry,
        routed: &RoutedData,
        now: Instant,
    ) {
        let Some(segment) = registry.segment(routed.segment) else {
            return;
        };
        let fields: Vec<ParameterField> = segment
            .fields_overlapping(routed.range.clone())
            .copied()
            .collect();
        let channel = SegmentRegistry::channel_of(routed.target);

        for field in fields {
            let param = field.id();
            let Some(current) = registry
                .segment(routed.segment)
                .and_then(|segment| segment.read_field(param).ok())
                .map(<[u8]>::to_vec)
            else {
                continue;
            };

            match self.match_echo(routed.target, param, &current, now) {
                EchoMatch::Consumed { latest } => {
                    if let Some(latest) = latest {
                        if let Some(segment) = registry.segment_mut(routed.segment) {
                            if let Err(e) = segment.write_field(param, &latest) {
                                debug!("Could not restore {:?}: {}", param, e);
                            }
                        }
                    }
                    continue;
                }
                EchoMatch::Foreign | EchoMatch::NothingPending => {}
            }

            let previous = previous_field_bytes(&field, &current, routed);
            if previous == current {
                trace!("{:?} unchanged", param);
                continue;
            }
            let value = field.codec().decode(&current);
            self.notify(param, channel, &value, None);
        }
    }

    fn match_echo(&mut self, target: usize, param: ParamId, current: &[u8], now: Instant) -> EchoMatch {
        let key = (target, param);
        let Some(queue) = self.pending.get_mut(&key) else {
            return EchoMatch::NothingPending;
        };

        let window = self.echo_window;
        queue.retain(|echo| now.saturating_duration_since(echo.written_at) <= window);

        let outcome = match queue.iter().position(|echo| echo.bytes == current) {
            Some(index) => {
                queue.drain(..=index);
                debug!("Suppressed echo of {:?} on target {}", param, target);
                EchoMatch::Consumed {
                    latest: queue.back().map(|echo| echo.bytes.clone()),
                }
            }
            None if queue.is_empty() => EchoMatch::NothingPending,
            None => {
                debug!("{:?} on target {} changed on the device; dropping pending echoes", param, target);
                queue.clear();
                EchoMatch::Foreign
            }
        };
        if queue.is_empty() {
            self.pending.remove(&key);
        }
        outcome
    }

    fn notify(
        &mut self,
        param: ParamId,
        channel: Option<u8>,
        value: &ParamValue,
        exclude: Option<SubscriberId>,
    ) {
        let Some(ids) = self.interest.get(&param) else {
            return;
        };
        let update = ParameterUpdate {
            param,
            channel,
            value: value.clone(),
        };
        for id in ids {
            if Some(*id) == exclude {
                continue;
            }
            if let Some(subscription) = self.subscriptions.get_mut(id) {
                if subscription.filter.accepts(channel) {
                    (subscription.callback)(&update);
                }
            }
        }
    }
}

impl Default for ParameterManager {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_WINDOW)
    }
}

impl fmt::Debug for ParameterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterManager")
            .field("subscribers", &self.subscriptions.len())
            .field("pending_echoes", &self.pending_echoes())
            .field("echo_window", &self.echo_window)
            .finish()
    }
}

enum EchoMatch {
    /// Inbound bytes were one of our writes. `latest` holds newer local bytes still in flight.
    Consumed { latest: Option<Vec<u8>> },
    Foreign,
    NothingPending,
}

/// Field bytes as they were before `routed` overwrote part of them.
fn previous_field_bytes(field: &ParameterField, current: &[u8], routed: &RoutedData) -> Vec<u8> {
    let mut previous = current.to_vec();
    let start = field.offset().max(routed.range.start);
    let end = (field.offset() + field.length()).min(routed.range.end);
    for index in start..end {
        if let Some(&byte) = routed.previous.get(index - routed.range.start) {
            previous[index - field.offset()] = byte;
        }
    }
    previous
}

/// Device address of `field` inside the segment at `base`.
pub fn field_address(base: Address, field: &ParameterField) -> Option<Address> {
    base.offset(field.offset() as u32)
}
