// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::*;
use crate::messages::{DecoderState, PropertyScope};
use tunekit_core::context::StreamPosition;
use tunekit_core::{PropertyValue, TimeCode};

#[tokio::test]
async fn test_startup_notifications() {
    init_tracing();
    let mut player = Player::new(&DecoderServerConfig::default()).unwrap();

    assert!(matches!(
        next_event(&mut player).await,
        PlayerEvent::DecoderState(DecoderState::Stopped)
    ));
    match next_event(&mut player).await {
        PlayerEvent::StreamTimeCode(time_code) => assert_eq!(time_code, TimeCode::default()),
        other => panic!("expected a time code, got {other:?}"),
    }
    match next_event(&mut player).await {
        PlayerEvent::StreamPosition(position) => {
            assert_eq!(position, StreamPosition { offset: 0, range: 400 });
        },
        other => panic!("expected a position, got {other:?}"),
    }
    player.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_set_input_play_stop_order() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;

    player.set_input("tone://forever", None).unwrap();
    player.play().unwrap();
    player.stop().unwrap();

    let mut events = until_reply(&mut player, CommandKind::SetInput).await;
    events.extend(until_reply(&mut player, CommandKind::Play).await);
    events.extend(until_reply(&mut player, CommandKind::Stop).await);
    assert_eq!(
        replies_and_states(&events),
        ["ack:set_input", "state:playing", "ack:play", "state:stopped", "ack:stop"]
    );

    player.shutdown().await.unwrap();
    // nothing follows the last reply
    assert!(matches!(player.try_pump_message(), Err(TuneKitError::InvalidState)));
}

#[tokio::test]
async fn test_every_command_gets_one_reply_in_order() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("test.mp3");

    let sent = [
        CommandKind::SetInput,
        CommandKind::SetOutput,
        CommandKind::AddNode,
        CommandKind::Ping,
        CommandKind::SetProperty,
        CommandKind::Pause,
        CommandKind::SetOutput,
        CommandKind::SeekToPosition,
        CommandKind::Stop,
    ];
    player.set_input(missing.to_str().unwrap(), None).unwrap();
    player.set_output(Some("speakers"), None).unwrap();
    player.add_node("NoSuchFilter").unwrap();
    player.ping(7).unwrap();
    player
        .set_property(
            PropertyScope::Module,
            Some("Tone"),
            "Volume",
            Some(PropertyValue::Integer(3)),
        )
        .unwrap();
    player.pause().unwrap();
    player.set_output(Some("!default"), None).unwrap();
    player.seek_to_position(1, 2).unwrap();
    player.stop().unwrap();

    let mut replies = Vec::new();
    for kind in sent {
        let events = until_reply(&mut player, kind).await;
        replies.push(events.last().map(label).unwrap());
    }
    assert_eq!(
        replies,
        [
            "nack:set_input",
            "nack:set_output",
            "nack:add_node",
            "ack:ping",
            "nack:set_property",
            "ack:pause",
            "ack:set_output",
            "ack:seek_to_position",
            "ack:stop",
        ]
    );
    assert!(player.try_pump_message().unwrap().is_none());
    player.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_nack_carries_the_error() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.wav");

    player.set_input(missing.to_str().unwrap(), None).unwrap();
    let events = until_reply(&mut player, CommandKind::SetInput).await;
    assert!(matches!(
        events.last(),
        Some(PlayerEvent::Nack {
            command: CommandKind::SetInput,
            error: TuneKitError::NoSuchFile(_),
        })
    ));

    player.set_input("tone://abc", None).unwrap();
    let events = until_reply(&mut player, CommandKind::SetInput).await;
    assert!(matches!(
        events.last(),
        Some(PlayerEvent::Nack { error: TuneKitError::InvalidParameters(_), .. })
    ));
    player.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_play_posts_one_state() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;

    player.set_input("tone://forever", None).unwrap();
    player.play().unwrap();
    player.play().unwrap();
    player.pause().unwrap();
    player.pause().unwrap();
    player.play().unwrap();
    player.stop().unwrap();
    player.stop().unwrap();

    let mut events = until_reply(&mut player, CommandKind::SetInput).await;
    for kind in [
        CommandKind::Play,
        CommandKind::Play,
        CommandKind::Pause,
        CommandKind::Pause,
        CommandKind::Play,
        CommandKind::Stop,
        CommandKind::Stop,
    ] {
        events.extend(until_reply(&mut player, kind).await);
    }
    assert_eq!(
        replies_and_states(&events),
        [
            "ack:set_input",
            "state:playing",
            "ack:play",
            "ack:play",
            "state:paused",
            "ack:pause",
            "ack:pause",
            "state:playing",
            "ack:play",
            "state:stopped",
            "ack:stop",
            "ack:stop",
        ]
    );
    player.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ping_pong() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;
    player.ping(42).unwrap();
    let events = until_reply(&mut player, CommandKind::Ping).await;
    let labels: Vec<String> = events.iter().map(label).collect();
    assert_eq!(labels, ["pong:42", "ack:ping"]);
    player.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupt_wakes_pump() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;

    player.interrupt();
    assert!(player.pump_message_timeout(Duration::from_secs(5)).await.unwrap().is_none());

    // from another thread, while the pump is waiting
    let interrupter = player.interrupter();
    let waker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        interrupter.interrupt();
    });
    assert!(player.pump_message().await.unwrap().is_none());
    waker.join().unwrap();

    // queued events come first
    player.ping(2).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    player.interrupt();
    assert_eq!(label(&next_event(&mut player).await), "pong:2");
    assert_eq!(label(&next_event(&mut player).await), "ack:ping");
    assert!(player.pump_message().await.unwrap().is_none());

    assert!(matches!(
        player.pump_message_timeout(Duration::from_millis(50)).await,
        Err(TuneKitError::Timeout)
    ));
    player.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_commands_after_shutdown() {
    let mut player = tone_player(&DecoderServerConfig::default()).await;
    player.shutdown().await.unwrap();

    assert!(matches!(player.play(), Err(TuneKitError::InvalidState)));
    assert!(matches!(player.set_input("tone://1", None), Err(TuneKitError::InvalidState)));
    assert!(matches!(player.seek_to_time_stamp(0, 0, 1, 0), Err(TuneKitError::InvalidState)));
    assert!(matches!(player.pump_message().await, Err(TuneKitError::InvalidState)));

    // a second shutdown is a no-op, and interrupting a dead server does nothing
    player.shutdown().await.unwrap();
    player.interrupt();
    assert!(matches!(player.try_pump_message(), Err(TuneKitError::InvalidState)));
}

#[tokio::test]
async fn test_invalid_config() {
    let config = DecoderServerConfig { position_update_range: Some(0), ..Default::default() };
    assert!(matches!(Player::new(&config), Err(TuneKitError::InvalidParameters(_))));

    let config = DecoderServerConfig {
        default_output_name: Some("speakers".to_string()),
        ..Default::default()
    };
    assert!(matches!(Player::new(&config), Err(TuneKitError::NoMatchingModule)));
}
