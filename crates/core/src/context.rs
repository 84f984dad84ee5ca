// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-stream context shared with every node of a stream.
//!
//! Nodes receive a [`StreamContext`] when they are activated. Through it they
//! reach the [`Core`], publish [`StreamInfo`] updates, read and write stream
//! properties, turn partial seek requests into complete [`SeekPoint`]s and
//! post [`StreamEvent`]s to whoever listens on the stream.

use crate::core::Core;
use crate::error::{Result, TuneKitError};
use crate::properties::Properties;
use crate::stream::NodeId;
use crate::time::TimeStamp;
use bitflags::bitflags;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

bitflags! {
    /// Which [`StreamInfo`] fields are valid, or were updated.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StreamInfoMask: u32 {
        const NOMINAL_BITRATE = 0x001;
        const AVERAGE_BITRATE = 0x002;
        const INSTANT_BITRATE = 0x004;
        const SIZE = 0x008;
        const DURATION = 0x010;
        const SAMPLE_RATE = 0x020;
        const CHANNEL_COUNT = 0x040;
        const FLAGS = 0x080;
        const DATA_TYPE = 0x100;
        const ALL = 0xFFFF;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StreamInfoFlags: u32 {
        /// Variable bitrate.
        const VBR = 0x01;
        /// A continuous stream with no known end (for example a live source).
        const CONTINUOUS = 0x02;
    }
}

/// Descriptive information about the media flowing through a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub mask: StreamInfoMask,
    pub nominal_bitrate: u32,
    pub average_bitrate: u32,
    pub instant_bitrate: u32,
    /// Size in bytes.
    pub size: u64,
    /// Duration in milliseconds.
    pub duration: u64,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub flags: StreamInfoFlags,
    /// Human readable data type, such as `"PCM"`.
    pub data_type: Option<String>,
}

impl StreamInfo {
    /// Copies the fields selected by `update.mask` that differ from `self`.
    ///
    /// Returns the mask of fields that actually changed.
    pub fn apply(&mut self, update: &Self) -> StreamInfoMask {
        let mut changed = StreamInfoMask::empty();
        macro_rules! merge {
            ($flag:ident, $field:ident) => {
                if update.mask.contains(StreamInfoMask::$flag) && self.$field != update.$field {
                    self.$field = update.$field.clone();
                    changed |= StreamInfoMask::$flag;
                }
            };
        }
        merge!(NOMINAL_BITRATE, nominal_bitrate);
        merge!(AVERAGE_BITRATE, average_bitrate);
        merge!(INSTANT_BITRATE, instant_bitrate);
        merge!(SIZE, size);
        merge!(DURATION, duration);
        merge!(SAMPLE_RATE, sample_rate);
        merge!(CHANNEL_COUNT, channel_count);
        merge!(FLAGS, flags);
        merge!(DATA_TYPE, data_type);
        self.mask |= changed;
        changed
    }
}

/// How a seek request is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekMode {
    /// A node already performed the seek. Upstream nodes leave their position alone.
    Ignore,
    ByTimeStamp,
    ByPosition,
    ByOffset,
    BySample,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SeekPointMask: u32 {
        const TIME_STAMP = 0x01;
        const POSITION = 0x02;
        const OFFSET = 0x04;
        const SAMPLE = 0x08;
    }
}

/// A relative position: `offset` out of `range`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub offset: u64,
    pub range: u64,
}

/// A seek target, expressed in any combination of units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekPoint {
    pub mask: SeekPointMask,
    pub time_stamp: TimeStamp,
    pub position: StreamPosition,
    /// Absolute byte offset.
    pub offset: u64,
    /// Sample index.
    pub sample: u64,
}

/// What happened to a node in the stream topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyChange {
    NodeAdded,
    NodeRemoved,
    NodeConnected,
}

/// Notifications posted by a stream and its nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Stream info changed. `info` is the full, updated record.
    Info { update_mask: StreamInfoMask, info: StreamInfo },
    Topology { change: TopologyChange, node: NodeId, name: String },
}

struct ContextInner {
    core: Core,
    info: Mutex<StreamInfo>,
    properties: Properties,
    events: Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>,
}

/// Cloneable handle to the state a stream shares with its nodes.
#[derive(Clone)]
pub struct StreamContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("info", &*self.inner.info.lock())
            .finish_non_exhaustive()
    }
}

impl StreamContext {
    pub fn new(core: Core) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                core,
                info: Mutex::new(StreamInfo::default()),
                properties: Properties::new(),
                events: Mutex::new(None),
            }),
        }
    }

    pub fn core(&self) -> &Core {
        &self.inner.core
    }

    pub fn info(&self) -> StreamInfo {
        self.inner.info.lock().clone()
    }

    /// Merges the masked fields of `info` and posts an info event if anything changed.
    pub fn set_info(&self, info: &StreamInfo) -> StreamInfoMask {
        let (changed, snapshot) = {
            let mut current = self.inner.info.lock();
            let changed = current.apply(info);
            (changed, current.clone())
        };
        if !changed.is_empty() {
            tracing::trace!(update_mask = changed.bits(), "stream info updated");
            self.post_event(StreamEvent::Info { update_mask: changed, info: snapshot });
        }
        changed
    }

    /// Clears every info field without notifying anyone.
    pub fn reset_info(&self) {
        *self.inner.info.lock() = StreamInfo::default();
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// Routes stream events to `listener`, replacing any previous one.
    pub fn set_event_listener(&self, listener: Option<mpsc::UnboundedSender<StreamEvent>>) {
        *self.inner.events.lock() = listener;
    }

    pub fn post_event(&self, event: StreamEvent) {
        let mut events = self.inner.events.lock();
        if let Some(tx) = events.as_ref() {
            if tx.send(event).is_err() {
                tracing::debug!("stream event listener gone, dropping it");
                *events = None;
            }
        }
    }

    /// Fills in the fields of `point` that can be derived from the one `mode` names,
    /// using the current stream size, duration and sample rate.
    ///
    /// # Errors
    ///
    /// Returns `Failure` if `point` lacks the field `mode` relies on, or if a
    /// time based seek is requested on a stream of unknown duration.
    pub fn estimate_seek_point(&self, mode: SeekMode, point: &mut SeekPoint) -> Result<()> {
        let info = self.info();
        estimate_seek_point(&info, mode, point)
    }
}

fn scale(value: u64, numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    u64::try_from(u128::from(value) * u128::from(numerator) / u128::from(denominator))
        .unwrap_or(u64::MAX)
}

/// Seek point estimation over a snapshot of the stream info.
pub fn estimate_seek_point(info: &StreamInfo, mode: SeekMode, point: &mut SeekPoint) -> Result<()> {
    let missing = |what: &str| TuneKitError::Failure(format!("seek point has no {what}"));
    match mode {
        SeekMode::Ignore => return Ok(()),
        SeekMode::ByTimeStamp => {
            if !point.mask.contains(SeekPointMask::TIME_STAMP) || info.duration == 0 {
                return Err(missing("time stamp or the stream has no duration"));
            }
            let offset = scale(point.time_stamp.to_millis(), info.size, info.duration);
            if !point.mask.contains(SeekPointMask::OFFSET) {
                point.offset = offset;
                point.mask |= SeekPointMask::OFFSET;
            }
            if !point.mask.contains(SeekPointMask::POSITION) {
                point.position = StreamPosition { offset, range: info.size };
                point.mask |= SeekPointMask::POSITION;
            }
        },
        SeekMode::ByPosition => {
            if !point.mask.contains(SeekPointMask::POSITION) {
                return Err(missing("position"));
            }
            if !point.mask.contains(SeekPointMask::OFFSET) {
                point.offset = scale(point.position.offset, info.size, point.position.range);
                point.mask |= SeekPointMask::OFFSET;
            }
            if !point.mask.contains(SeekPointMask::TIME_STAMP) && point.position.range != 0 {
                let ms = scale(info.duration, point.position.offset, point.position.range);
                point.time_stamp = TimeStamp::from_millis(ms);
                point.mask |= SeekPointMask::TIME_STAMP;
            }
        },
        SeekMode::ByOffset => {
            if !point.mask.contains(SeekPointMask::OFFSET) {
                return Err(missing("offset"));
            }
            if !point.mask.contains(SeekPointMask::TIME_STAMP) && info.size != 0 {
                let ms = scale(info.duration, point.offset, info.size);
                point.time_stamp = TimeStamp::from_millis(ms);
                point.mask |= SeekPointMask::TIME_STAMP;
            }
            if !point.mask.contains(SeekPointMask::POSITION) && info.size != 0 {
                point.position = StreamPosition { offset: point.offset, range: info.size };
                point.mask |= SeekPointMask::POSITION;
            }
        },
        SeekMode::BySample => {
            if !point.mask.contains(SeekPointMask::SAMPLE) {
                return Err(missing("sample"));
            }
            if info.duration != 0 && info.sample_rate != 0 {
                // positions are computed in units of 100 samples
                let samples = scale(info.duration, u64::from(info.sample_rate), 1000);
                let range = samples / 100;
                let sample = point.sample / 100;
                point.position = StreamPosition { offset: sample, range };
                point.mask |= SeekPointMask::POSITION;

                point.offset = scale(info.size, sample, range);
                point.mask |= SeekPointMask::OFFSET;

                let ms = scale(point.sample, 1000, u64::from(info.sample_rate));
                point.time_stamp = TimeStamp::from_millis(ms);
                point.mask |= SeekPointMask::TIME_STAMP;
            }
        },
    }

    if point.mask.contains(SeekPointMask::TIME_STAMP)
        && !point.mask.contains(SeekPointMask::SAMPLE)
        && info.sample_rate != 0
    {
        point.sample = scale(point.time_stamp.to_millis(), u64::from(info.sample_rate), 1000);
        point.mask |= SeekPointMask::SAMPLE;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(size: u64, duration: u64, sample_rate: u32) -> StreamInfo {
        StreamInfo {
            mask: StreamInfoMask::SIZE | StreamInfoMask::DURATION | StreamInfoMask::SAMPLE_RATE,
            size,
            duration,
            sample_rate,
            ..StreamInfo::default()
        }
    }

    #[test]
    fn test_apply_reports_only_changes() {
        let mut current = StreamInfo::default();
        let update = StreamInfo {
            mask: StreamInfoMask::SAMPLE_RATE | StreamInfoMask::DATA_TYPE,
            sample_rate: 44_100,
            channel_count: 2,
            data_type: Some("PCM".to_string()),
            ..StreamInfo::default()
        };
        assert_eq!(current.apply(&update), StreamInfoMask::SAMPLE_RATE | StreamInfoMask::DATA_TYPE);
        assert_eq!(current.channel_count, 0);
        assert!(current.apply(&update).is_empty());
    }

    #[test]
    fn test_estimate_by_time_stamp() {
        let info = info(1_000_000, 10_000, 8000);
        let mut point = SeekPoint {
            mask: SeekPointMask::TIME_STAMP,
            time_stamp: TimeStamp::from_millis(2500),
            ..SeekPoint::default()
        };
        estimate_seek_point(&info, SeekMode::ByTimeStamp, &mut point).unwrap();
        assert_eq!(point.offset, 250_000);
        assert_eq!(point.position, StreamPosition { offset: 250_000, range: 1_000_000 });
        assert_eq!(point.sample, 20_000);
        assert!(point.mask.contains(SeekPointMask::all()));
    }

    #[test]
    fn test_estimate_by_time_stamp_needs_duration() {
        let info = info(1000, 0, 8000);
        let mut point = SeekPoint { mask: SeekPointMask::TIME_STAMP, ..SeekPoint::default() };
        assert!(estimate_seek_point(&info, SeekMode::ByTimeStamp, &mut point).is_err());
        assert!(estimate_seek_point(&info, SeekMode::Ignore, &mut point).is_ok());
    }

    #[test]
    fn test_estimate_by_position_and_offset() {
        let info = info(4000, 2000, 1000);
        let mut point = SeekPoint {
            mask: SeekPointMask::POSITION,
            position: StreamPosition { offset: 100, range: 400 },
            ..SeekPoint::default()
        };
        estimate_seek_point(&info, SeekMode::ByPosition, &mut point).unwrap();
        assert_eq!(point.offset, 1000);
        assert_eq!(point.time_stamp, TimeStamp::from_millis(500));
        assert_eq!(point.sample, 500);

        let mut point =
            SeekPoint { mask: SeekPointMask::OFFSET, offset: 3000, ..SeekPoint::default() };
        estimate_seek_point(&info, SeekMode::ByOffset, &mut point).unwrap();
        assert_eq!(point.time_stamp, TimeStamp::from_millis(1500));
        assert_eq!(point.position, StreamPosition { offset: 3000, range: 4000 });
    }

    #[test]
    fn test_estimate_by_sample_and_zero_range() {
        let info = info(48_000, 1000, 48_000);
        let mut point =
            SeekPoint { mask: SeekPointMask::SAMPLE, sample: 24_000, ..SeekPoint::default() };
        estimate_seek_point(&info, SeekMode::BySample, &mut point).unwrap();
        assert_eq!(point.position, StreamPosition { offset: 240, range: 480 });
        assert_eq!(point.offset, 24_000);
        assert_eq!(point.time_stamp, TimeStamp::from_millis(500));

        let mut point = SeekPoint {
            mask: SeekPointMask::POSITION,
            position: StreamPosition { offset: 0, range: 0 },
            ..SeekPoint::default()
        };
        estimate_seek_point(&info, SeekMode::ByPosition, &mut point).unwrap();
        assert_eq!(point.offset, 0);
        assert!(!point.mask.contains(SeekPointMask::TIME_STAMP));
    }
}
