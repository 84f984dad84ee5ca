// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! WAV parser - Exposes the sample data of a RIFF/WAVE stream as a PCM byte stream
//!
//! The parser reads the `fmt ` and `data` chunks, publishes the stream info
//! (sample rate, channels, size, duration, bitrate) and hands out a sub-stream
//! covering the sample data only. Integer PCM and IEEE float are supported.

use std::sync::atomic::{AtomicU32, Ordering};
use tunekit_core::byte_stream::{InputStream, SharedInputStream, SubInputStream};
use tunekit_core::context::{
    SeekMode, SeekPoint, SeekPointMask, StreamContext, StreamInfo, StreamInfoMask,
};
use tunekit_core::media::{PcmFormat, PcmSampleFormat, MEDIA_TYPE_ID_UNKNOWN};
use tunekit_core::module::{
    MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbeMatch, ProbePolicy,
};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::registry::RegistryCategory;
use tunekit_core::{Core, MediaType, Result, TuneKitError};

use crate::constants::{MIME_AUDIO_WAV, WAVE_HEADER_MAX_LOOKUP};

pub const WAVE_PARSER_MODULE: &str = "WaveParser";

const RIFF_HEADER_SIZE: usize = 12;
const CHUNK_HEADER_SIZE: usize = 8;
const FMT_LOOKUP_SIZE: usize = 16;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;

/// What the header told us about the sample data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveHeader {
    pub format: PcmFormat,
    /// Offset of the first sample byte.
    pub data_offset: u64,
    /// Size of the sample data. Falls back to the rest of the stream when the chunk says 0.
    pub data_size: u64,
    pub info: StreamInfo,
}

impl WaveHeader {
    /// Bytes per sample frame.
    pub fn block_size(&self) -> u64 {
        self.format.frame_size() as u64
    }
}

fn u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_header_bytes(stream: &mut dyn InputStream, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(|e| match e {
        TuneKitError::Eos => TuneKitError::InvalidMediaFormat,
        other => other,
    })
}

/// Parses a RIFF/WAVE header from the start of `stream`.
///
/// On success the stream is positioned right after the `data` chunk header.
///
/// # Errors
///
/// `InvalidMediaFormat` for anything that is not a well formed WAVE header
/// within the lookup window, `UnsupportedCodec` for compressed formats.
pub fn parse_header(stream: &mut dyn InputStream) -> Result<WaveHeader> {
    stream.seek(0)?;
    let mut riff = [0u8; RIFF_HEADER_SIZE];
    read_header_bytes(stream, &mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(TuneKitError::InvalidMediaFormat);
    }

    let mut position = RIFF_HEADER_SIZE as u64;
    let mut format: Option<PcmFormat> = None;
    let mut info = StreamInfo::default();

    while position < WAVE_HEADER_MAX_LOOKUP {
        let mut chunk = [0u8; CHUNK_HEADER_SIZE];
        read_header_bytes(stream, &mut chunk)?;
        position += CHUNK_HEADER_SIZE as u64;
        let mut chunk_size = u64::from(u32_le(&chunk[4..8]));

        match &chunk[0..4] {
            b"fmt " => {
                if chunk_size < FMT_LOOKUP_SIZE as u64 {
                    return Err(TuneKitError::InvalidMediaFormat);
                }
                let mut fmt = [0u8; FMT_LOOKUP_SIZE];
                read_header_bytes(stream, &mut fmt)?;
                position += FMT_LOOKUP_SIZE as u64;

                let sample_format = match u16_le(&fmt[0..2]) {
                    WAVE_FORMAT_PCM => PcmSampleFormat::SignedLe,
                    WAVE_FORMAT_IEEE_FLOAT => PcmSampleFormat::FloatLe,
                    tag => {
                        return Err(TuneKitError::UnsupportedCodec(format!(
                            "WAVE format tag {tag:#06x}"
                        )));
                    },
                };
                let bits = u32::from(u16_le(&fmt[14..16])).div_ceil(8) * 8;
                let pcm = PcmFormat {
                    sample_rate: u32_le(&fmt[4..8]),
                    channel_count: u16_le(&fmt[2..4]),
                    bits_per_sample: u8::try_from(bits)
                        .map_err(|_| TuneKitError::InvalidMediaFormat)?,
                    sample_format,
                };
                if pcm.channel_count == 0 || pcm.bits_per_sample == 0 {
                    return Err(TuneKitError::InvalidMediaFormat);
                }
                info.sample_rate = pcm.sample_rate;
                info.channel_count = pcm.channel_count;
                info.data_type = Some("PCM".to_string());
                info.mask |= StreamInfoMask::SAMPLE_RATE
                    | StreamInfoMask::CHANNEL_COUNT
                    | StreamInfoMask::DATA_TYPE;
                format = Some(pcm);
                chunk_size -= FMT_LOOKUP_SIZE as u64;
            },
            b"data" => {
                let format = format.ok_or(TuneKitError::InvalidMediaFormat)?;
                let data_size = if chunk_size == 0 {
                    stream.size()?.map_or(0, |size| size.saturating_sub(position))
                } else {
                    chunk_size
                };
                let bytes_per_second =
                    u64::from(format.sample_rate) * format.frame_size() as u64;

                info.size = data_size;
                info.mask |= StreamInfoMask::SIZE;
                if data_size != 0 && bytes_per_second != 0 {
                    info.duration = data_size * 1000 / bytes_per_second;
                    info.mask |= StreamInfoMask::DURATION;
                }
                let bitrate = u32::try_from(bytes_per_second * 8).unwrap_or(u32::MAX);
                info.nominal_bitrate = bitrate;
                info.average_bitrate = bitrate;
                info.instant_bitrate = bitrate;
                info.mask |= StreamInfoMask::NOMINAL_BITRATE
                    | StreamInfoMask::AVERAGE_BITRATE
                    | StreamInfoMask::INSTANT_BITRATE;

                return Ok(WaveHeader { format, data_offset: position, data_size, info });
            },
            _ => {},
        }

        position += chunk_size;
        stream.seek(position).map_err(|_| TuneKitError::InvalidMediaFormat)?;
    }

    Err(TuneKitError::InvalidMediaFormat)
}

/// Registers `.wav` and creates [`WaveParser`] nodes.
#[derive(Debug)]
pub struct WaveParserModule {
    wav_type_id: AtomicU32,
}

impl Default for WaveParserModule {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveParserModule {
    pub const fn new() -> Self {
        Self { wav_type_id: AtomicU32::new(MEDIA_TYPE_ID_UNKNOWN) }
    }

    fn wav_type_id(&self) -> u32 {
        self.wav_type_id.load(Ordering::Acquire)
    }
}

impl Module for WaveParserModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(WAVE_PARSER_MODULE, ModuleId::from_tag(WAVE_PARSER_MODULE))
            .with_property("extensions", ".wav")
    }

    fn attach(&self, core: &Core) -> Result<()> {
        let mut registry = core.registry();
        registry.register_extension(".wav", MIME_AUDIO_WAV)?;
        registry.register_media_type(MIME_AUDIO_WAV)?;
        let id = registry.id_for_name(&RegistryCategory::MediaTypeIds, MIME_AUDIO_WAV)?;
        self.wav_type_id.store(id, Ordering::Release);
        tracing::debug!(type_id = id, "wave parser attached");
        Ok(())
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        let policy = ProbePolicy {
            module: WAVE_PARSER_MODULE,
            input_protocol: PortProtocol::StreamPull,
            output_protocol: PortProtocol::StreamPull,
            input_type: Some(self.wav_type_id()),
            output_type: None,
            default_score: Some(ProbeMatch::MAX - 10),
        };
        policy.check_interface(constructor)?;
        // the output format is only known once the header is parsed
        if !constructor.output_type().is_unknown() {
            return Err(TuneKitError::InvalidParameters(format!(
                "{WAVE_PARSER_MODULE}: output type must be unknown"
            )));
        }
        policy.score_name(constructor)
    }

    fn create_instance(
        &self,
        _core: &Core,
        _constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        Ok(Box::new(WaveParser::new(self.wav_type_id())))
    }
}

/// STREAM_PULL `audio/wav` in, STREAM_PULL PCM out.
pub struct WaveParser {
    input_type: MediaType,
    output_type: MediaType,
    output: Option<SharedInputStream>,
    block_size: u64,
    context: Option<StreamContext>,
}

impl WaveParser {
    pub const fn new(wav_type_id: u32) -> Self {
        Self {
            input_type: MediaType::new(wav_type_id),
            output_type: MediaType::unknown(),
            output: None,
            block_size: 0,
            context: None,
        }
    }
}

impl MediaNode for WaveParser {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo { module: WAVE_PARSER_MODULE.to_string(), name: None }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![
            MediaPort::input(PortProtocol::StreamPull, [self.input_type.clone()]),
            MediaPort::output(PortProtocol::StreamPull, [self.output_type.clone()]),
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
        if media_type.id != self.input_type.id {
            return Err(TuneKitError::InvalidMediaFormat);
        }
        self.output = None;

        let header = stream.with(parse_header)?;
        tracing::debug!(
            sample_rate = header.format.sample_rate,
            channels = header.format.channel_count,
            bits = header.format.bits_per_sample,
            data_offset = header.data_offset,
            data_size = header.data_size,
            "parsed WAVE header"
        );

        if let Some(context) = &self.context {
            context.set_info(&header.info);
        }
        self.block_size = header.block_size();
        self.output_type = MediaType::pcm(header.format);
        self.output = Some(SharedInputStream::new(SubInputStream::new(
            stream,
            header.data_offset,
            header.data_size,
        )));
        Ok(())
    }

    fn get_stream(&mut self, _port: &str) -> Result<(SharedInputStream, MediaType)> {
        let stream = self.output.clone().ok_or(TuneKitError::PortHasNoStream)?;
        Ok((stream, self.output_type.clone()))
    }

    fn seek(&mut self, mode: &mut SeekMode, point: &mut SeekPoint) -> Result<()> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| TuneKitError::Failure("wave parser is not active".into()))?;
        if let Err(e) = context.estimate_seek_point(*mode, point) {
            tracing::debug!(error = %e, "seek point estimation failed");
        }
        if !point.mask.contains(SeekPointMask::SAMPLE | SeekPointMask::OFFSET) {
            return Err(TuneKitError::Failure("cannot locate the seek point".into()));
        }

        if self.block_size != 0 {
            point.offset -= point.offset % self.block_size;
        }
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.seek(point.offset) {
                tracing::debug!(offset = point.offset, error = %e, "wave data seek failed");
            }
        }
        // downstream nodes must not seek the stream again
        *mode = SeekMode::Ignore;
        Ok(())
    }
}
