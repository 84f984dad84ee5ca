// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Chain tests: files through the WAV parser and packetizer into an output

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::constants::REPLAY_GAIN_TRACK_PROPERTY;
use crate::core::bytes_output::{MemoryOutputBuffer, MEMORY_OUTPUT_NAME};
use crate::core::packetizer::{PacketizerConfig, StreamPacketizer};
use crate::test_utils::{builtin_core, init_tracing, pump_to_end, ramp, wav_bytes, write_file};
use tunekit_core::byte_stream::{MemoryInputStream, SharedInputStream};
use tunekit_core::media::MIME_AUDIO_PCM;
use tunekit_core::port::{INPUT_PORT, OUTPUT_PORT};
use tunekit_core::{MediaNode, MediaType, Stream, TuneKitError};

fn module_names(stream: &Stream) -> Vec<String> {
    stream.nodes().into_iter().map(|n| n.node.module).collect()
}

#[test]
fn test_exact_bytes_then_drain_marker_then_eos() {
    let core = builtin_core();
    let mut packetizer = StreamPacketizer::new(core.clone(), PacketizerConfig::default());
    let data = ramp(1000);
    let stream = SharedInputStream::new(MemoryInputStream::new(data.clone()));
    packetizer.set_stream(INPUT_PORT, stream, &MediaType::unknown()).unwrap();

    let first = packetizer.get_packet(OUTPUT_PORT).unwrap();
    assert_eq!(first.payload(), &data[..]);
    assert!(!first.is_drain_marker());
    let last = packetizer.get_packet(OUTPUT_PORT).unwrap();
    assert!(last.is_drain_marker());
    assert!(matches!(packetizer.get_packet(OUTPUT_PORT), Err(TuneKitError::Eos)));
    assert!(matches!(packetizer.get_packet(OUTPUT_PORT), Err(TuneKitError::Eos)));

    drop((first, last));
    assert_eq!(core.packet_pool().stats().outstanding, 0);
}

#[test]
fn test_wav_file_to_memory_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let data = ramp(1000);
    let path = write_file(dir.path(), "tone.wav", &wav_bytes(8000, 1, 16, &data));

    let core = builtin_core();
    let mut stream = Stream::new(core.clone());
    stream.set_output(Some(MEMORY_OUTPUT_NAME), Some(MIME_AUDIO_PCM)).unwrap();
    stream.set_input(&path, None).unwrap();
    assert_eq!(stream.input_name(), Some(path.as_str()));

    // two connections, one data packet and the drain marker
    assert_eq!(pump_to_end(&mut stream), 4);
    assert_eq!(
        module_names(&stream),
        ["FileInput", "WaveParser", "StreamPacketizer", "MemoryOutput"]
    );
    let transient: Vec<bool> = stream.nodes().iter().map(|n| n.transient).collect();
    assert_eq!(transient, [false, true, true, false]);

    let buffer = MemoryOutputBuffer::from_core(&core).unwrap();
    assert_eq!(buffer.contents(), &data[..]);
    assert_eq!(buffer.packets(), 2);
    assert!(buffer.ended());
    let pcm = buffer.media_type().unwrap();
    assert_eq!(pcm.pcm_format().unwrap().sample_rate, 8000);

    let info = stream.info();
    assert_eq!(info.size, 1000);
    assert_eq!(info.duration, 62);
    assert_eq!(info.sample_rate, 8000);

    // the end stays the end
    assert!(stream.pump_packet().unwrap_err().is_eos());
    assert_eq!(core.packet_pool().stats().outstanding, 0);
}

#[test]
fn test_seek_resumes_at_offset() {
    let dir = tempfile::tempdir().unwrap();
    let data = ramp(16_000);
    let path = write_file(dir.path(), "second.wav", &wav_bytes(8000, 1, 16, &data));

    let core = builtin_core();
    let mut stream = Stream::new(core.clone());
    stream.set_output(Some(MEMORY_OUTPUT_NAME), Some(MIME_AUDIO_PCM)).unwrap();
    stream.set_input(&path, None).unwrap();
    for _ in 0..3 {
        stream.pump_packet().unwrap();
    }
    let buffer = MemoryOutputBuffer::from_core(&core).unwrap();
    assert_eq!(buffer.take(), &data[..4096]);

    stream.seek_to_time(500).unwrap();
    assert_eq!(stream.status().time_stamp.to_millis(), 500);
    pump_to_end(&mut stream);
    assert_eq!(buffer.take(), &data[8000..]);
    assert_eq!(stream.status().time_stamp.to_millis(), 1000);

    drop(stream);
    assert_eq!(core.packet_pool().stats().outstanding, 0);
}

#[test]
fn test_seek_releases_pending_packets() {
    let dir = tempfile::tempdir().unwrap();
    let data = ramp(16_000);
    let path = write_file(dir.path(), "pending.wav", &wav_bytes(8000, 1, 16, &data));

    let core = builtin_core();
    let mut stream = Stream::new(core.clone());
    stream.set_output(Some(MEMORY_OUTPUT_NAME), Some(MIME_AUDIO_PCM)).unwrap();
    stream.set_input(&path, None).unwrap();
    stream.add_node_by_name(None, "GainControlFilter").unwrap();

    // pump until the filter holds a packet
    let mut pumps = 0;
    while core.packet_pool().stats().outstanding == 0 {
        stream.pump_packet().unwrap();
        pumps += 1;
        assert!(pumps < 10, "no packet ever reached the filter");
    }
    let buffer = MemoryOutputBuffer::from_core(&core).unwrap();
    buffer.take();

    stream.seek_to_time(500).unwrap();
    assert_eq!(core.packet_pool().stats().outstanding, 0);
    pump_to_end(&mut stream);
    assert_eq!(buffer.take(), &data[8000..]);
    assert_eq!(core.packet_pool().stats().outstanding, 0);
}

#[test]
fn test_replay_gain_in_chain() {
    let dir = tempfile::tempdir().unwrap();
    let samples: Vec<u8> = std::iter::repeat_n(1000i16.to_le_bytes(), 100).flatten().collect();
    let path = write_file(dir.path(), "loud.wav", &wav_bytes(8000, 1, 16, &samples));

    let core = builtin_core();
    let mut stream = Stream::new(core.clone());
    stream.set_output(Some(MEMORY_OUTPUT_NAME), Some(MIME_AUDIO_PCM)).unwrap();
    stream.set_input(&path, None).unwrap();
    stream.add_node_by_name(None, "GainControlFilter").unwrap();
    stream.properties().set(REPLAY_GAIN_TRACK_PROPERTY, -602i64);

    pump_to_end(&mut stream);
    assert_eq!(
        module_names(&stream),
        ["FileInput", "WaveParser", "StreamPacketizer", "GainControlFilter", "MemoryOutput"]
    );
    let output = MemoryOutputBuffer::from_core(&core).unwrap().contents();
    let decoded: Vec<i16> =
        output.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
    assert_eq!(decoded, vec![500i16; 100]);
}

#[test]
fn test_default_output_and_input_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "short.wav", &wav_bytes(8000, 2, 16, &ramp(400)));

    let core = builtin_core();
    let mut stream = Stream::new(core);
    assert!(matches!(stream.pump_packet(), Err(TuneKitError::Failure(_))));
    assert!(matches!(
        stream.set_input("/nonexistent/song.wav", None),
        Err(TuneKitError::NoSuchFile(_))
    ));
    assert!(matches!(
        stream.set_output(None, Some("audio/x-unregistered")),
        Err(TuneKitError::NoSuchName(_))
    ));

    stream.set_output(None, None).unwrap();
    stream.set_input(&format!("file:{path}"), None).unwrap();
    pump_to_end(&mut stream);
    assert_eq!(module_names(&stream).last().map(String::as_str), Some("NullOutput"));
    assert_eq!(stream.info().duration, 12);
}
