// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Scenario tests for the player and its server thread.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod commands;

use crate::messages::{CommandKind, PlayerEvent};
use crate::{DecoderServerConfig, Player};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tunekit_core::context::{SeekMode, SeekPoint, SeekPointMask, StreamInfo, StreamInfoMask};
use tunekit_core::{
    Core, MediaNode, MediaNodeConstructor, MediaNodeInfo, MediaPacket, MediaPort, MediaType,
    Module, ModuleId, ModuleInfo, PcmFormat, PcmSampleFormat, PortProtocol, ProbeMatch, Result,
    StreamContext, TimeStamp, TuneKitError,
};

pub const TONE_MODULE: &str = "Tone";
/// `tone://forever` never ends, `tone://N` ends after N packets.
pub const TONE_PREFIX: &str = "tone://";
pub const TONE_PACKET_MS: u64 = 250;
/// Size and duration the tone source reports, so that 1 ms maps to 1 byte.
pub const TONE_LENGTH: u64 = 10_000;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn tone_type() -> MediaType {
    MediaType::pcm(PcmFormat {
        sample_rate: 8000,
        channel_count: 1,
        bits_per_sample: 16,
        sample_format: PcmSampleFormat::SignedLe,
    })
}

/// A packet source producing silent PCM packets every [`TONE_PACKET_MS`].
pub struct ToneModule;

impl Module for ToneModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(TONE_MODULE, ModuleId::from_tag("tone"))
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        match constructor.name() {
            Some(name) if name.starts_with(TONE_PREFIX) => Ok(ProbeMatch::EXACT),
            _ => Err(TuneKitError::NotSupported),
        }
    }

    fn create_instance(
        &self,
        _core: &Core,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        let name = constructor.name().unwrap_or_default();
        let packets = match name.strip_prefix(TONE_PREFIX) {
            Some("forever") => None,
            Some(count) => Some(
                count.parse::<u64>().map_err(|e| TuneKitError::InvalidParameters(e.to_string()))?,
            ),
            None => return Err(TuneKitError::InvalidParameters(name.to_string())),
        };
        Ok(Box::new(ToneSource { packets, next: 0 }))
    }
}

struct ToneSource {
    packets: Option<u64>,
    next: u64,
}

impl MediaNode for ToneSource {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo { module: TONE_MODULE.to_string(), name: None }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![MediaPort::output(PortProtocol::Packet, [tone_type()])]
    }

    fn activate(&mut self, context: &StreamContext) -> Result<()> {
        context.set_info(&StreamInfo {
            mask: StreamInfoMask::SIZE | StreamInfoMask::DURATION,
            size: TONE_LENGTH,
            duration: TONE_LENGTH,
            ..StreamInfo::default()
        });
        Ok(())
    }

    fn seek(&mut self, mode: &mut SeekMode, point: &mut SeekPoint) -> Result<()> {
        if point.mask.contains(SeekPointMask::TIME_STAMP) {
            self.next = point.time_stamp.to_millis() / TONE_PACKET_MS;
        }
        *mode = SeekMode::Ignore;
        Ok(())
    }

    fn get_packet(&mut self, _port: &str) -> Result<MediaPacket> {
        if self.packets.is_some_and(|count| self.next >= count) {
            return Err(TuneKitError::Eos);
        }
        let mut packet = MediaPacket::from_slice(&[0; 64], tone_type());
        packet.set_time_stamp(TimeStamp::from_millis(self.next * TONE_PACKET_MS));
        self.next += 1;
        Ok(packet)
    }
}

/// A 16-bit mono PCM WAV file holding `data`. Returns its path.
pub fn wav_file(dir: &Path, name: &str, sample_rate: u32, data: &[u8]) -> String {
    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut chunk = id.to_vec();
        chunk.extend_from_slice(&u32::try_from(body.len()).unwrap().to_le_bytes());
        chunk.extend_from_slice(body);
        chunk
    }

    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let mut body = b"WAVE".to_vec();
    body.extend(chunk(b"fmt ", &fmt));
    body.extend(chunk(b"data", data));

    let path = dir.join(name);
    std::fs::write(&path, chunk(b"RIFF", &body)).unwrap();
    path.to_str().unwrap().to_string()
}

/// Short labels for the events a test cares about most.
pub fn label(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::Ack { command } => format!("ack:{command}"),
        PlayerEvent::Nack { command, .. } => format!("nack:{command}"),
        PlayerEvent::DecoderState(state) => format!("state:{state}"),
        PlayerEvent::StreamTimeCode(time_code) => format!("time:{time_code}"),
        PlayerEvent::StreamPosition(position) => {
            format!("position:{}/{}", position.offset, position.range)
        },
        PlayerEvent::StreamInfo { .. } => "info".to_string(),
        PlayerEvent::Property { scope, name, .. } => format!("property:{}:{name}", scope.as_str()),
        PlayerEvent::Pong { cookie } => format!("pong:{cookie}"),
    }
}

/// Keeps only replies and state changes, the part of the event flow that is deterministic.
pub fn replies_and_states(events: &[PlayerEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                PlayerEvent::Ack { .. } | PlayerEvent::Nack { .. } | PlayerEvent::DecoderState(_)
            )
        })
        .map(label)
        .collect()
}

pub async fn next_event(player: &mut Player) -> PlayerEvent {
    player.pump_message_timeout(EVENT_TIMEOUT).await.unwrap().expect("unexpected wake up")
}

/// Pumps events up to and including the reply to `command`.
pub async fn until_reply(player: &mut Player, command: CommandKind) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(player).await;
        let reply = event.reply_to();
        events.push(event);
        if let Some(kind) = reply {
            assert_eq!(kind, command, "reply out of order: {events:?}");
            return events;
        }
    }
}

/// Pumps events until one matches `done`, returning all of them.
pub async fn until(player: &mut Player, done: impl Fn(&PlayerEvent) -> bool) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(player).await;
        let stop = done(&event);
        events.push(event);
        if stop {
            return events;
        }
    }
}

/// A player with the tone module registered and its startup events consumed.
pub async fn tone_player(config: &DecoderServerConfig) -> Player {
    init_tracing();
    let mut player = Player::new(config).unwrap();
    for _ in 0..3 {
        next_event(&mut player).await;
    }
    player.register_module(Arc::new(ToneModule)).unwrap();
    until_reply(&mut player, CommandKind::RegisterModule).await;
    player
}
