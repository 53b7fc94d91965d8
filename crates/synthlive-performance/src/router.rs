//! Segment registry and inbound message router.
//!
//! The registry owns every known [`Segment`], keyed by base address. Inbound
//! DT1 messages are matched to the segment whose byte range contains the
//! message address, decoded into it, and classified into a logical group so
//! group listeners can react without knowing about individual segments.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use synthlive_midi_io::{Address, SysExCommand, SysExMessage};

use crate::error::{Error, Result};
use crate::param::ParamId;
use crate::segment::Segment;
use crate::xp50;

/// Channel counts that partition targets into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupCounts {
    pub song_channels: usize,
    pub fast_channels: usize,
}

impl Default for GroupCounts {
    fn default() -> Self {
        Self {
            song_channels: 8,
            fast_channels: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentGroup {
    /// Low part range plus the common segment.
    Song,
    Fast,
}

/// Group of `target`, or `None` if it belongs to neither.
///
/// Song: `[0, song_channels)` and the common target. Fast:
/// `[song_channels, song_channels + fast_channels)`.
pub fn classify(target: usize, counts: GroupCounts) -> Option<SegmentGroup> {
    if target < counts.song_channels || target == xp50::COMMON_TARGET {
        Some(SegmentGroup::Song)
    } else if target < counts.song_channels + counts.fast_channels {
        Some(SegmentGroup::Fast)
    } else {
        None
    }
}

/// Group-level notification raised after a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentReceived {
    pub group: SegmentGroup,
    pub target: usize,
}

pub type GroupListener = Box<dyn FnMut(&SegmentReceived) + Send>;

/// Result of routing one DT1 into a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedData {
    pub segment: Address,
    pub target: usize,
    /// Byte range of the segment overwritten by the payload.
    pub range: Range<usize>,
    /// Bytes of `range` before the decode.
    pub previous: Vec<u8>,
    pub group: Option<SegmentGroup>,
}

pub struct SegmentRegistry {
    segments: BTreeMap<Address, Segment>,
    targets: HashMap<usize, Address>,
    counts: GroupCounts,
    listeners: Vec<(SegmentGroup, GroupListener)>,
}

impl SegmentRegistry {
    pub fn new(counts: GroupCounts) -> Self {
        Self {
            segments: BTreeMap::new(),
            targets: HashMap::new(),
            counts,
            listeners: Vec::new(),
        }
    }

    /// Registry holding the temporary performance: sixteen parts and the common segment.
    pub fn xp50(counts: GroupCounts) -> Self {
        let mut registry = Self::new(counts);
        let part_layout = xp50::part_layout();
        for index in 0..xp50::PART_COUNT as u8 {
            registry.insert(Segment::new(
                xp50::part_address(index),
                index as usize,
                part_layout.clone(),
            ));
        }
        registry.insert(Segment::new(
            xp50::PERFORMANCE_COMMON,
            xp50::COMMON_TARGET,
            xp50::common_layout(),
        ));
        registry
    }

    fn insert(&mut self, segment: Segment) {
        self.targets.insert(segment.target(), segment.address());
        self.segments.insert(segment.address(), segment);
    }

    pub fn register(&mut self, segment: Segment) -> Result<()> {
        if self.segments.contains_key(&segment.address()) {
            return Err(Error::DuplicateSegment(segment.address()));
        }
        self.insert(segment);
        Ok(())
    }

    pub fn counts(&self) -> GroupCounts {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn segment(&self, address: Address) -> Option<&Segment> {
        self.segments.get(&address)
    }

    pub fn segment_mut(&mut self, address: Address) -> Option<&mut Segment> {
        self.segments.get_mut(&address)
    }

    pub fn by_target(&self, target: usize) -> Option<&Segment> {
        self.targets
            .get(&target)
            .and_then(|address| self.segments.get(address))
    }

    /// Segment whose byte range contains `address`, with the byte offset into it.
    pub fn find_containing(&self, address: Address) -> Option<(&Segment, usize)> {
        let (_, segment) = self.segments.range(..=address).next_back()?;
        segment.locate(address).map(|offset| (segment, offset))
    }

    /// Target index holding `param`; part parameters need `channel`.
    pub fn target_for(&self, param: ParamId, channel: Option<u8>) -> Result<usize> {
        match param {
            ParamId::Common(_) => Ok(xp50::COMMON_TARGET),
            ParamId::Part(_) => {
                let channel = channel.ok_or(Error::ChannelRequired(param))?;
                let target = channel as usize;
                if target >= xp50::PART_COUNT || !self.targets.contains_key(&target) {
                    return Err(Error::UnknownChannel(channel));
                }
                Ok(target)
            }
        }
    }

    pub fn segment_for(&self, param: ParamId, channel: Option<u8>) -> Result<&Segment> {
        let target = self.target_for(param, channel)?;
        self.by_target(target)
            .ok_or(Error::UnknownChannel(target as u8))
    }

    pub fn segment_for_mut(&mut self, param: ParamId, channel: Option<u8>) -> Result<&mut Segment> {
        let target = self.target_for(param, channel)?;
        let address = *self
            .targets
            .get(&target)
            .ok_or(Error::UnknownChannel(target as u8))?;
        self.segments
            .get_mut(&address)
            .ok_or(Error::UnknownSegment(address))
    }

    /// Part channel for a target, `None` for the common segment.
    pub fn channel_of(target: usize) -> Option<u8> {
        (target < xp50::PART_COUNT).then_some(target as u8)
    }

    pub fn subscribe_group<F>(&mut self, group: SegmentGroup, listener: F)
    where
        F: FnMut(&SegmentReceived) + Send + 'static,
    {
        self.listeners.push((group, Box::new(listener)));
    }

    /// Decode a DT1 into the segment that contains its address.
    ///
    /// Returns `Ok(None)` for messages that touch no known segment and for
    /// data requests. A payload that does not fit leaves the segment as it
    /// was and is returned as [`Error::Decode`].
    pub fn route(&mut self, message: &SysExMessage) -> Result<Option<RoutedData>> {
        if message.command() != SysExCommand::DataSet {
            debug!("Ignoring inbound data request for {}", message.address());
            return Ok(None);
        }

        let address = message.address();
        let Some((base, offset)) = self
            .find_containing(address)
            .map(|(segment, offset)| (segment.address(), offset))
        else {
            debug!("Dropping data for unknown address {}", address);
            return Ok(None);
        };

        let Some(segment) = self.segments.get_mut(&base) else {
            return Ok(None);
        };
        let payload = message.payload();

        let range = offset..offset + payload.len();
        let previous = segment
            .as_bytes()
            .get(range.clone())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let decoded = if offset == 0 && payload.len() == segment.len() {
            segment.decode(payload)
        } else {
            segment.decode_at(offset, payload)
        };
        if let Err(e) = decoded {
            warn!("Failed to decode {} bytes at {}: {}", payload.len(), address, e);
            return Err(e.into());
        }

        let target = segment.target();
        let group = classify(target, self.counts);
        debug!(
            "Decoded {} bytes into segment {} (target {}, group {:?})",
            payload.len(),
            base,
            target,
            group
        );

        if let Some(group) = group {
            let event = SegmentReceived { group, target };
            for (wanted, listener) in self.listeners.iter_mut() {
                if *wanted == group {
                    listener(&event);
                }
            }
        }

        Ok(Some(RoutedData {
            segment: base,
            target,
            range,
            previous,
            group,
        }))
    }
}

impl std::fmt::Debug for SegmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRegistry")
            .field("segments", &self.segments.len())
            .field("counts", &self.counts)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
