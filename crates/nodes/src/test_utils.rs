// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test utilities for module testing

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use tunekit_core::{Core, Stream};

/// Routes `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A RIFF chunk: id, little endian size and body.
pub fn wav_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(8 + body.len());
    chunk.extend_from_slice(id);
    chunk.extend_from_slice(&u32::try_from(body.len()).unwrap().to_le_bytes());
    chunk.extend_from_slice(body);
    chunk
}

/// A canonical 44-byte header PCM WAV file holding `data`.
pub fn wav_bytes(sample_rate: u32, channels: u16, bits: u16, data: &[u8]) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());

    let mut body = b"WAVE".to_vec();
    body.extend(wav_chunk(b"fmt ", &fmt));
    body.extend(wav_chunk(b"data", data));
    wav_chunk(b"RIFF", &body)
}

/// Bytes `0, 1, .., 255, 0, 1, ..` of length `len`.
pub fn ramp(len: usize) -> Vec<u8> {
    (0..=255u8).cycle().take(len).collect()
}

/// Writes `contents` to `name` inside `dir` and returns the path as a string.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

/// A core with every built-in module registered.
pub fn builtin_core() -> Core {
    let core = Core::new();
    crate::register_builtins(&core).unwrap();
    core
}

/// Pumps `stream` until it ends. Returns the number of successful pumps.
pub fn pump_to_end(stream: &mut Stream) -> usize {
    let mut pumps = 0;
    loop {
        match stream.pump_packet() {
            Ok(()) => pumps += 1,
            Err(e) if e.is_eos() => return pumps,
            Err(e) => panic!("pump failed: {e}"),
        }
    }
}
