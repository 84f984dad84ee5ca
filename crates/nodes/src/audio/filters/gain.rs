// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Replay gain filter
//!
//! Applies the replay gain published on the stream properties to 16-bit PCM
//! packets. Gains are integers in hundredths of a dB. The album gain wins over
//! the track gain unless configured otherwise, and a gain of 0 disables the
//! filter.

use serde::Deserialize;
use tokio::sync::mpsc;
use tunekit_core::context::{SeekMode, SeekPoint, StreamContext};
use tunekit_core::media::{PcmSampleFormat, MEDIA_TYPE_ID_AUDIO_PCM};
use tunekit_core::module::{MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbeMatch};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::packet::MediaPacket;
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::properties::{ListenerId, PropertyChange, Properties};
use tunekit_core::{Core, MediaType, Result, TuneKitError};

use crate::constants::{REPLAY_GAIN_ALBUM_PROPERTY, REPLAY_GAIN_TRACK_PROPERTY};

pub const GAIN_CONTROL_FILTER_MODULE: &str = "GainControlFilter";

/// Fixed point unity factor.
const FACTOR_RANGE: i32 = 1024;
const MAX_FACTOR: i32 = 16 * 1024;

/// Configuration for the GainControlFilter.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GainControlConfig {
    /// Use the album gain when both album and track gains are known.
    pub prefer_album: bool,
}

impl Default for GainControlConfig {
    fn default() -> Self {
        Self { prefer_album: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GainMode {
    Inactive,
    Amplify(i32),
    Attenuate(i32),
}

/// Converts a gain in hundredths of a dB into a fixed point factor.
/// Factors outside `[1x, 16x]` fall back to unity.
fn db_to_factor(gain: i64) -> i32 {
    #[allow(clippy::cast_precision_loss)]
    let f = f64::from(FACTOR_RANGE) * 10f64.powf(gain as f64 / 2000.0);
    if (f64::from(FACTOR_RANGE)..=f64::from(MAX_FACTOR)).contains(&f) {
        #[allow(clippy::cast_possible_truncation)]
        let factor = f as i32;
        factor
    } else {
        FACTOR_RANGE
    }
}

fn gain_mode(gain: i64) -> GainMode {
    match gain {
        0 => GainMode::Inactive,
        g if g > 0 => GainMode::Amplify(db_to_factor(g)),
        g => GainMode::Attenuate(db_to_factor(-g)),
    }
}

fn apply_gain(payload: &mut [u8], mode: GainMode) {
    let scale = |sample: i32| -> i32 {
        match mode {
            GainMode::Inactive => sample,
            GainMode::Amplify(factor) => sample * factor / FACTOR_RANGE,
            GainMode::Attenuate(factor) => sample * FACTOR_RANGE / factor,
        }
    };
    for chunk in payload.chunks_exact_mut(2) {
        let sample = i32::from(i16::from_le_bytes([chunk[0], chunk[1]]));
        let scaled = scale(sample).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        #[allow(clippy::cast_possible_truncation)]
        chunk.copy_from_slice(&(scaled as i16).to_le_bytes());
    }
}

#[derive(Debug, Default)]
pub struct GainControlFilterModule {
    config: GainControlConfig,
}

impl GainControlFilterModule {
    pub const fn new(config: GainControlConfig) -> Self {
        Self { config }
    }
}

impl Module for GainControlFilterModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(GAIN_CONTROL_FILTER_MODULE, ModuleId::from_tag(GAIN_CONTROL_FILTER_MODULE))
    }

    /// Only created by name, for packets of `audio/pcm` (or unspecified) type.
    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        let reject = |what: &str| {
            Err(TuneKitError::InvalidParameters(format!("{GAIN_CONTROL_FILTER_MODULE}: {what}")))
        };
        if constructor.name() != Some(GAIN_CONTROL_FILTER_MODULE) {
            return reject("only created by name");
        }
        let spec = &constructor.spec;
        if !spec.input.protocol.accepts(PortProtocol::Packet)
            || !spec.output.protocol.accepts(PortProtocol::Packet)
        {
            return reject("packet ports only");
        }
        let pcm_or_unknown = |media_type: &MediaType| {
            media_type.is_unknown() || media_type.id == MEDIA_TYPE_ID_AUDIO_PCM
        };
        if !pcm_or_unknown(constructor.input_type()) || !pcm_or_unknown(constructor.output_type()) {
            return reject("PCM only");
        }
        Ok(ProbeMatch::EXACT)
    }

    fn create_instance(
        &self,
        _core: &Core,
        _constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        Ok(Box::new(GainControlFilter::new(self.config.clone())))
    }
}

struct PropertyWatch {
    properties: Properties,
    id: ListenerId,
    changes: mpsc::UnboundedReceiver<PropertyChange>,
}

/// PACKET PCM in, PACKET PCM out, holding at most one packet.
pub struct GainControlFilter {
    config: GainControlConfig,
    pending: Option<MediaPacket>,
    track_gain: Option<i64>,
    album_gain: Option<i64>,
    mode: GainMode,
    watch: Option<PropertyWatch>,
}

impl GainControlFilter {
    pub const fn new(config: GainControlConfig) -> Self {
        Self {
            config,
            pending: None,
            track_gain: None,
            album_gain: None,
            mode: GainMode::Inactive,
            watch: None,
        }
    }

    fn update_mode(&mut self) {
        let gain = if self.config.prefer_album {
            self.album_gain.or(self.track_gain)
        } else {
            self.track_gain.or(self.album_gain)
        }
        .unwrap_or(0);
        let mode = gain_mode(gain);
        if mode != self.mode {
            tracing::debug!(gain, ?mode, "replay gain changed");
            self.mode = mode;
        }
    }

    fn apply_change(&mut self, name: &str, value: Option<i64>) {
        match name {
            REPLAY_GAIN_TRACK_PROPERTY => self.track_gain = value,
            REPLAY_GAIN_ALBUM_PROPERTY => self.album_gain = value,
            _ => return,
        }
        self.update_mode();
    }

    fn poll_properties(&mut self) {
        let mut changes = Vec::new();
        if let Some(watch) = self.watch.as_mut() {
            while let Ok(change) = watch.changes.try_recv() {
                changes.push(change);
            }
        }
        for change in changes {
            let value = change.value.as_ref().and_then(tunekit_core::PropertyValue::as_integer);
            self.apply_change(&change.name, value);
        }
    }
}

impl MediaNode for GainControlFilter {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo { module: GAIN_CONTROL_FILTER_MODULE.to_string(), name: None }
    }

    fn ports(&self) -> Vec<MediaPort> {
        let pcm = MediaType::new(MEDIA_TYPE_ID_AUDIO_PCM);
        vec![
            MediaPort::input(PortProtocol::Packet, [pcm.clone()]),
            MediaPort::output(PortProtocol::Packet, [pcm]),
        ]
    }

    fn activate(&mut self, context: &StreamContext) -> Result<()> {
        let properties = context.properties().clone();
        let (id, changes) = properties.add_listener(Some("ReplayGain."));
        self.track_gain = properties.get_integer(REPLAY_GAIN_TRACK_PROPERTY);
        self.album_gain = properties.get_integer(REPLAY_GAIN_ALBUM_PROPERTY);
        self.watch = Some(PropertyWatch { properties, id, changes });
        self.update_mode();
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        if let Some(watch) = self.watch.take() {
            watch.properties.remove_listener(watch.id);
        }
        self.track_gain = None;
        self.album_gain = None;
        self.mode = GainMode::Inactive;
        Ok(())
    }

    fn seek(&mut self, _mode: &mut SeekMode, _point: &mut SeekPoint) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    fn check_media_type(&self, _port: &str, media_type: &MediaType) -> Result<()> {
        if media_type.id == MEDIA_TYPE_ID_AUDIO_PCM {
            Ok(())
        } else {
            Err(TuneKitError::InvalidMediaFormat)
        }
    }

    fn put_packet(&mut self, port: &str, mut packet: MediaPacket) -> Result<()> {
        self.check_media_type(port, packet.media_type())?;
        self.poll_properties();

        let sixteen_bit_le = packet.media_type().pcm_format().is_some_and(|pcm| {
            pcm.bits_per_sample == 16 && pcm.sample_format == PcmSampleFormat::SignedLe
        });
        if self.mode != GainMode::Inactive && sixteen_bit_le {
            apply_gain(packet.payload_mut(), self.mode);
        }
        self.pending = Some(packet);
        Ok(())
    }

    fn get_packet(&mut self, _port: &str) -> Result<MediaPacket> {
        self.pending.take().ok_or(TuneKitError::PortHasNoData)
    }
}
