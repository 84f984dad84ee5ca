// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Default tunables for the built-in modules.

/// Bytes per packet produced by the stream packetizer.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Packet size for 24-bit PCM, so that packets hold whole sample frames
/// for any channel count up to 8 (24 * 256).
pub const DEFAULT_PACKET_SIZE_24BITS: usize = 6144;

/// Capacity of the ring buffer in front of network sources.
pub const DEFAULT_NETWORK_BUFFER_SIZE: usize = 64 * 1024;

/// Bytes a network stream tries to buffer before serving a read. 0 disables the wait.
pub const DEFAULT_NETWORK_MIN_BUFFER_FULLNESS: usize = 0;

/// Forward seeks up to this distance are performed by reading and discarding.
pub const DEFAULT_SEEK_AS_READ_THRESHOLD: u64 = 32 * 1024;

/// Minimum interval between two buffer fullness notifications.
pub const NETWORK_STREAM_NOTIFICATION_INTERVAL_MS: u64 = 1000;

/// Connect timeout for `tcp://` inputs.
pub const DEFAULT_TCP_CONNECT_TIMEOUT_MS: u64 = 5000;

/// WAV headers larger than this are rejected.
pub const WAVE_HEADER_MAX_LOOKUP: u64 = 512 * 1024;

/// Stream property holding the network buffer capacity.
pub const NETWORK_STREAM_BUFFER_SIZE_PROPERTY: &str = "NetworkStream.BufferSize";
/// Stream property holding the number of bytes currently buffered.
pub const NETWORK_STREAM_BUFFER_FULLNESS_PROPERTY: &str = "NetworkStream.BufferFullness";
/// Stream property holding the error code that ended a network stream (empty while it has not).
/// A regular end of data reads `eos`.
pub const NETWORK_STREAM_EOS_REASON_PROPERTY: &str = "NetworkStream.EosReason";

/// Replay gain of the current track, in hundredths of a dB.
pub const REPLAY_GAIN_TRACK_PROPERTY: &str = "ReplayGain.TrackGain";
/// Replay gain of the current album, in hundredths of a dB. Wins over the track gain.
pub const REPLAY_GAIN_ALBUM_PROPERTY: &str = "ReplayGain.AlbumGain";

/// Core property under which memory outputs publish their shared buffer.
pub const MEMORY_OUTPUT_BUFFER_PROPERTY: &str = "MemoryOutput.Buffer";

pub const MIME_AUDIO_WAV: &str = "audio/wav";
