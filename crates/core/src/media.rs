// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media type descriptors.
//!
//! A [`MediaType`] is identified by a numeric id resolved at runtime through the
//! [`Registry`](crate::registry::Registry) from a MIME string. Type-specific fields
//! live in [`MediaFormat`], one variant per media type family.
//!
//! The serialized form is a fixed 12-byte base (`id`, `flags`, `extension_size`,
//! all little endian `u32`) followed by exactly `extension_size` bytes of
//! extension data. [`MediaType::from_bytes`] accepts only buffers whose length
//! matches that layout exactly.

use crate::error::{Result, TuneKitError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel id for "no media flows through this port".
pub const MEDIA_TYPE_ID_NONE: u32 = 0;
/// Sentinel id for "any / not yet known".
pub const MEDIA_TYPE_ID_UNKNOWN: u32 = 1;
/// Pre-registered id for `audio/pcm`.
pub const MEDIA_TYPE_ID_AUDIO_PCM: u32 = 2;
/// Pre-registered id for `video/raw`.
pub const MEDIA_TYPE_ID_VIDEO_RAW: u32 = 3;

pub const MIME_AUDIO_PCM: &str = "audio/pcm";
pub const MIME_VIDEO_RAW: &str = "video/raw";

const BASE_SIZE: usize = 12;

/// Layout of PCM samples in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PcmSampleFormat {
    #[default]
    None = 0,
    SignedBe = 1,
    SignedLe = 2,
    UnsignedBe = 3,
    UnsignedLe = 4,
    FloatBe = 5,
    FloatLe = 6,
}

impl PcmSampleFormat {
    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::None,
            1 => Self::SignedBe,
            2 => Self::SignedLe,
            3 => Self::UnsignedBe,
            4 => Self::UnsignedLe,
            5 => Self::FloatBe,
            6 => Self::FloatLe,
            other => {
                return Err(TuneKitError::InvalidParameters(format!(
                    "unknown PCM sample format {other}"
                )))
            },
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u8,
    pub sample_format: PcmSampleFormat,
}

impl PcmFormat {
    /// Bytes per interleaved sample frame, or 0 when the format is incomplete.
    pub fn frame_size(&self) -> usize {
        usize::from(self.channel_count) * usize::from(self.bits_per_sample).div_ceil(8)
    }

    /// Whether every field needed to compute timing is set.
    pub const fn is_complete(&self) -> bool {
        self.sample_rate != 0 && self.channel_count != 0 && self.bits_per_sample != 0
    }
}

/// Type-specific extension of a [`MediaType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaFormat {
    /// No extension data.
    #[default]
    Generic,
    Pcm(PcmFormat),
    /// MPEG-4 audio elementary stream with its decoder specific info.
    Mp4AudioEs { object_type: u8, decoder_info: Vec<u8> },
    /// MPEG-4 video elementary stream.
    Mp4VideoEs { format: u32, width: u16, height: u16, decoder_info: Vec<u8> },
    RawVideo { format: u32, width: u16, height: u16, planes: u8 },
}

const KIND_PCM: u8 = 1;
const KIND_MP4_AUDIO_ES: u8 = 2;
const KIND_MP4_VIDEO_ES: u8 = 3;
const KIND_RAW_VIDEO: u8 = 4;

impl MediaFormat {
    /// Exact size of the serialized extension.
    pub fn extension_size(&self) -> usize {
        match self {
            Self::Generic => 0,
            // kind + rate + channels + bits + format
            Self::Pcm(_) => 1 + 4 + 2 + 1 + 1,
            Self::Mp4AudioEs { decoder_info, .. } => 1 + 1 + decoder_info.len(),
            Self::Mp4VideoEs { decoder_info, .. } => 1 + 4 + 2 + 2 + decoder_info.len(),
            Self::RawVideo { .. } => 1 + 4 + 2 + 2 + 1,
        }
    }

    fn write_extension(&self, out: &mut Vec<u8>) {
        match self {
            Self::Generic => {},
            Self::Pcm(pcm) => {
                out.push(KIND_PCM);
                out.extend_from_slice(&pcm.sample_rate.to_le_bytes());
                out.extend_from_slice(&pcm.channel_count.to_le_bytes());
                out.push(pcm.bits_per_sample);
                out.push(pcm.sample_format as u8);
            },
            Self::Mp4AudioEs { object_type, decoder_info } => {
                out.push(KIND_MP4_AUDIO_ES);
                out.push(*object_type);
                out.extend_from_slice(decoder_info);
            },
            Self::Mp4VideoEs { format, width, height, decoder_info } => {
                out.push(KIND_MP4_VIDEO_ES);
                out.extend_from_slice(&format.to_le_bytes());
                out.extend_from_slice(&width.to_le_bytes());
                out.extend_from_slice(&height.to_le_bytes());
                out.extend_from_slice(decoder_info);
            },
            Self::RawVideo { format, width, height, planes } => {
                out.push(KIND_RAW_VIDEO);
                out.extend_from_slice(&format.to_le_bytes());
                out.extend_from_slice(&width.to_le_bytes());
                out.extend_from_slice(&height.to_le_bytes());
                out.push(*planes);
            },
        }
    }

    fn read_extension(ext: &[u8]) -> Result<Self> {
        let Some((&kind, rest)) = ext.split_first() else {
            return Ok(Self::Generic);
        };
        let mut reader = ByteReader(rest);
        let format = match kind {
            KIND_PCM => Self::Pcm(PcmFormat {
                sample_rate: reader.u32()?,
                channel_count: reader.u16()?,
                bits_per_sample: reader.u8()?,
                sample_format: PcmSampleFormat::from_u8(reader.u8()?)?,
            }),
            KIND_MP4_AUDIO_ES => {
                Self::Mp4AudioEs { object_type: reader.u8()?, decoder_info: reader.rest() }
            },
            KIND_MP4_VIDEO_ES => Self::Mp4VideoEs {
                format: reader.u32()?,
                width: reader.u16()?,
                height: reader.u16()?,
                decoder_info: reader.rest(),
            },
            KIND_RAW_VIDEO => Self::RawVideo {
                format: reader.u32()?,
                width: reader.u16()?,
                height: reader.u16()?,
                planes: reader.u8()?,
            },
            other => {
                return Err(TuneKitError::InvalidParameters(format!(
                    "unknown media format kind {other}"
                )))
            },
        };
        if !reader.0.is_empty() {
            return Err(TuneKitError::InvalidParameters("trailing extension bytes".to_string()));
        }
        Ok(format)
    }
}

struct ByteReader<'a>(&'a [u8]);

impl ByteReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.0.len() < N {
            return Err(TuneKitError::InvalidParameters("truncated media type".to_string()));
        }
        let (head, tail) = self.0.split_at(N);
        self.0 = tail;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn rest(&mut self) -> Vec<u8> {
        let rest = self.0.to_vec();
        self.0 = &[];
        rest
    }
}

/// A media type: runtime id, flags and type-specific format data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaType {
    pub id: u32,
    pub flags: u32,
    pub format: MediaFormat,
}

impl MediaType {
    pub const fn new(id: u32) -> Self {
        Self { id, flags: 0, format: MediaFormat::Generic }
    }

    pub const fn none() -> Self {
        Self::new(MEDIA_TYPE_ID_NONE)
    }

    pub const fn unknown() -> Self {
        Self::new(MEDIA_TYPE_ID_UNKNOWN)
    }

    /// An `audio/pcm` type with the given layout.
    pub const fn pcm(format: PcmFormat) -> Self {
        Self { id: MEDIA_TYPE_ID_AUDIO_PCM, flags: 0, format: MediaFormat::Pcm(format) }
    }

    pub const fn is_unknown(&self) -> bool {
        self.id == MEDIA_TYPE_ID_UNKNOWN
    }

    pub const fn is_none(&self) -> bool {
        self.id == MEDIA_TYPE_ID_NONE
    }

    pub const fn pcm_format(&self) -> Option<&PcmFormat> {
        match &self.format {
            MediaFormat::Pcm(pcm) => Some(pcm),
            _ => None,
        }
    }

    pub fn extension_size(&self) -> usize {
        self.format.extension_size()
    }

    /// Total serialized size (`base + extension`).
    pub fn size(&self) -> usize {
        BASE_SIZE + self.extension_size()
    }

    /// Serializes the type, producing exactly [`MediaType::size`] bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let extension_size = self.extension_size();
        let mut out = Vec::with_capacity(BASE_SIZE + extension_size);
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(extension_size as u32).to_le_bytes());
        self.format.write_extension(&mut out);
        out
    }

    /// Parses a serialized type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the buffer is truncated, carries trailing bytes,
    /// or its extension does not decode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader(bytes);
        let id = reader.u32()?;
        let flags = reader.u32()?;
        let extension_size = reader.u32()? as usize;
        if reader.0.len() != extension_size {
            return Err(TuneKitError::InvalidParameters(format!(
                "extension size {extension_size} does not match payload of {} bytes",
                reader.0.len()
            )));
        }
        let format = MediaFormat::read_extension(reader.0)?;
        Ok(Self { id, flags, format })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.format {
            MediaFormat::Pcm(pcm) => write!(
                f,
                "type#{} pcm {}Hz {}ch {}bit",
                self.id, pcm.sample_rate, pcm.channel_count, pcm.bits_per_sample
            ),
            _ => write!(f, "type#{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cd_pcm() -> MediaType {
        MediaType::pcm(PcmFormat {
            sample_rate: 44_100,
            channel_count: 2,
            bits_per_sample: 16,
            sample_format: PcmSampleFormat::SignedLe,
        })
    }

    #[test]
    fn test_extension_size_matches_serialized_payload() {
        for media_type in [
            MediaType::unknown(),
            cd_pcm(),
            MediaType {
                id: 9,
                flags: 0,
                format: MediaFormat::RawVideo { format: 7, width: 640, height: 480, planes: 3 },
            },
        ] {
            let bytes = media_type.to_bytes();
            assert_eq!(bytes.len(), media_type.size());
            assert_eq!(bytes.len() - BASE_SIZE, media_type.extension_size());
        }
    }

    #[test]
    fn test_clone_is_byte_identical_for_variable_extensions() {
        for len in [0usize, 1, 2, 5, 64, 300] {
            let info: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
            let original = MediaType {
                id: 42,
                flags: 0x10,
                format: MediaFormat::Mp4AudioEs { object_type: 2, decoder_info: info.clone() },
            };
            let cloned = original.clone();
            let again = MediaType::from_bytes(&cloned.to_bytes()).unwrap();
            assert_eq!(again.to_bytes(), original.to_bytes());
            assert_eq!(again.extension_size(), 2 + len);

            let video = MediaType {
                id: 43,
                flags: 0,
                format: MediaFormat::Mp4VideoEs {
                    format: 1,
                    width: 1,
                    height: 1,
                    decoder_info: info,
                },
            };
            assert_eq!(MediaType::from_bytes(&video.to_bytes()).unwrap(), video);
        }
    }

    #[test]
    fn test_from_bytes_rejects_inconsistent_sizes() {
        let mut bytes = cd_pcm().to_bytes();
        bytes.push(0);
        assert!(MediaType::from_bytes(&bytes).is_err());
        assert!(MediaType::from_bytes(&bytes[..5]).is_err());
    }

    #[test]
    fn test_pcm_frame_size() {
        let pcm = *cd_pcm().pcm_format().unwrap();
        assert_eq!(pcm.frame_size(), 4);
        assert!(pcm.is_complete());
        assert!(!PcmFormat::default().is_complete());
    }
}
