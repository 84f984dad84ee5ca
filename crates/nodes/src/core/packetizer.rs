// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Stream packetizer - Cuts a byte stream into fixed-size packets
//!
//! The packetizer turns a STREAM_PULL input into a PACKET output without
//! looking at the bytes. The first packet carries `START_OF_STREAM`; when the
//! input ends, one empty `END_OF_STREAM` packet is emitted, after which the
//! output reports `Eos` until the next seek or the next input stream.
//! For complete PCM types, packet time stamps are derived from the number of
//! sample frames produced so far.

use serde::Deserialize;
use tunekit_core::byte_stream::{InputStream, SharedInputStream};
use tunekit_core::context::{
    SeekMode, SeekPoint, SeekPointMask, StreamContext, StreamInfo, StreamInfoMask,
};
use tunekit_core::module::{
    MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbeMatch, ProbePolicy,
};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::packet::{MediaPacket, PacketFlags};
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::{Core, MediaType, Result, TimeStamp, TuneKitError};

use crate::constants::{DEFAULT_PACKET_SIZE, DEFAULT_PACKET_SIZE_24BITS};

pub const STREAM_PACKETIZER_MODULE: &str = "StreamPacketizer";

/// Configuration for the StreamPacketizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacketizerConfig {
    /// Bytes per packet.
    pub packet_size: usize,
    /// Bytes per packet when the input is 24-bit PCM.
    pub packet_size_24bits: usize,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self { packet_size: DEFAULT_PACKET_SIZE, packet_size_24bits: DEFAULT_PACKET_SIZE_24BITS }
    }
}

impl PacketizerConfig {
    /// # Errors
    ///
    /// Returns an error if a packet size is zero.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.packet_size == 0 || self.packet_size_24bits == 0 {
            return Err("packet sizes must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StreamPacketizerModule {
    config: PacketizerConfig,
}

impl StreamPacketizerModule {
    pub const fn new(config: PacketizerConfig) -> Self {
        Self { config }
    }
}

impl Module for StreamPacketizerModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(STREAM_PACKETIZER_MODULE, ModuleId::from_tag(STREAM_PACKETIZER_MODULE))
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        let policy = ProbePolicy {
            module: STREAM_PACKETIZER_MODULE,
            input_protocol: PortProtocol::StreamPull,
            output_protocol: PortProtocol::Packet,
            input_type: None,
            output_type: None,
            default_score: Some(ProbeMatch::DEFAULT),
        };
        policy.check_interface(constructor)?;

        // the packetizer never changes the media type
        let (input, output) = (constructor.input_type(), constructor.output_type());
        if !input.is_unknown() && !output.is_unknown() && input.id != output.id {
            return Err(TuneKitError::InvalidParameters(format!(
                "{STREAM_PACKETIZER_MODULE}: cannot turn type {} into {}",
                input.id, output.id
            )));
        }
        policy.score_name(constructor)
    }

    fn create_instance(
        &self,
        core: &Core,
        _constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        Ok(Box::new(StreamPacketizer::new(core.clone(), self.config.clone())))
    }
}

pub struct StreamPacketizer {
    core: Core,
    config: PacketizerConfig,
    context: Option<StreamContext>,
    stream: Option<SharedInputStream>,
    media_type: MediaType,
    packet_size: usize,
    packet_count: u64,
    sample_count: u64,
    eos: bool,
}

impl StreamPacketizer {
    pub fn new(core: Core, config: PacketizerConfig) -> Self {
        let packet_size = config.packet_size;
        Self {
            core,
            config,
            context: None,
            stream: None,
            media_type: MediaType::none(),
            packet_size,
            packet_count: 0,
            sample_count: 0,
            eos: false,
        }
    }
}

impl MediaNode for StreamPacketizer {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo { module: STREAM_PACKETIZER_MODULE.to_string(), name: None }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![
            MediaPort::input(PortProtocol::StreamPull, [MediaType::unknown()]),
            MediaPort::output(PortProtocol::Packet, [self.media_type.clone()]),
        ]
    }

    fn activate(&mut self, context: &StreamContext) -> Result<()> {
        self.context = Some(context.clone());
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.context = None;
        Ok(())
    }

    fn set_stream(
        &mut self,
        _port: &str,
        stream: SharedInputStream,
        media_type: &MediaType,
    ) -> Result<()> {
        self.media_type = media_type.clone();
        self.packet_size = match media_type.pcm_format() {
            Some(pcm) if usize::from(pcm.bits_per_sample).div_ceil(8) == 3 => {
                self.config.packet_size_24bits
            },
            _ => self.config.packet_size,
        };
        self.packet_count = 0;
        self.sample_count = 0;
        self.eos = false;

        let size = stream.with(|s| s.size()).ok().flatten();
        if let (Some(size), Some(context)) = (size, self.context.as_ref()) {
            context.set_info(&StreamInfo {
                mask: StreamInfoMask::SIZE,
                size,
                ..StreamInfo::default()
            });
        }
        tracing::debug!(
            media_type = %self.media_type,
            packet_size = self.packet_size,
            "packetizer got a stream"
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn get_packet(&mut self, _port: &str) -> Result<MediaPacket> {
        if self.eos {
            return Err(TuneKitError::Eos);
        }
        let stream = self.stream.as_mut().ok_or(TuneKitError::PortHasNoData)?;

        let mut packet = self.core.create_media_packet(self.packet_size, self.media_type.clone());
        let packet_size = self.packet_size;
        let bytes_read = match stream.read(&mut packet.payload_buffer_mut()[..packet_size]) {
            Ok(count) => count,
            Err(TuneKitError::Eos) => {
                tracing::debug!(packets = self.packet_count, "packetizer input ended");
                self.eos = true;
                packet.set_flags(PacketFlags::END_OF_STREAM);
                0
            },
            Err(e) => return Err(e),
        };
        packet.set_payload_size(bytes_read)?;

        if self.packet_count == 0 {
            packet.set_flags(PacketFlags::START_OF_STREAM);
        }
        self.packet_count += 1;

        if let Some(pcm) = self.media_type.pcm_format().filter(|pcm| pcm.is_complete()) {
            packet.set_time_stamp(TimeStamp::from_samples(self.sample_count, pcm.sample_rate));
            self.sample_count += (bytes_read / pcm.frame_size()) as u64;
        }
        Ok(packet)
    }

    fn seek(&mut self, mode: &mut SeekMode, point: &mut SeekPoint) -> Result<()> {
        self.eos = false;
        if *mode == SeekMode::Ignore {
            return Ok(());
        }
        if let Some(context) = &self.context {
            context.estimate_seek_point(*mode, point)?;
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.seek(point.offset) {
                tracing::debug!(offset = point.offset, error = %e, "packetizer input seek failed");
            }
        }
        if point.mask.contains(SeekPointMask::SAMPLE) {
            self.sample_count = point.sample;
        }
        Ok(())
    }
}
