// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Messages exchanged between a [`Player`](crate::Player) and its server thread.
//!
//! - [`ServerMessage`]: mailbox of the server thread (commands and termination)
//! - [`PlayerEvent`]: replies and notifications posted back to the player
//! - [`DecoderState`]: the server's playback state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tunekit_core::context::{StreamInfo, StreamInfoMask, StreamPosition};
use tunekit_core::{Module, PropertyValue, TimeCode, TuneKitError};

/// Playback state of the decoder server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// The stream ran out of media. A seek or a new input leaves this state.
    Eos,
}

impl DecoderState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Eos => "eos",
        }
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which property bag a property command or notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyScope {
    /// The properties of the decoder's core.
    Core,
    /// The properties of the current stream.
    Stream,
    /// Properties of a single module. Not supported by the server.
    Module,
}

impl PropertyScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Stream => "stream",
            Self::Module => "module",
        }
    }
}

/// Identifies the command an ACK or NACK answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    SetInput,
    SetOutput,
    Play,
    Stop,
    Pause,
    Ping,
    SeekToTime,
    SeekToPosition,
    RegisterModule,
    AddNode,
    SetProperty,
}

impl CommandKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetInput => "set_input",
            Self::SetOutput => "set_output",
            Self::Play => "play",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Ping => "ping",
            Self::SeekToTime => "seek_to_time",
            Self::SeekToPosition => "seek_to_position",
            Self::RegisterModule => "register_module",
            Self::AddNode => "add_node",
            Self::SetProperty => "set_property",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request executed by the server thread. Every command gets exactly one reply.
pub enum DecoderCommand {
    SetInput {
        name: String,
        media_type: Option<String>,
    },
    SetOutput {
        name: Option<String>,
        media_type: Option<String>,
    },
    Play,
    Stop,
    Pause,
    Ping {
        cookie: u64,
    },
    SeekToTime {
        ms: u64,
    },
    SeekToPosition {
        offset: u64,
        range: u64,
    },
    RegisterModule(Arc<dyn Module>),
    AddNode {
        name: String,
    },
    /// `value: None` removes the property.
    SetProperty {
        scope: PropertyScope,
        target: Option<String>,
        name: String,
        value: Option<PropertyValue>,
    },
}

impl DecoderCommand {
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::SetInput { .. } => CommandKind::SetInput,
            Self::SetOutput { .. } => CommandKind::SetOutput,
            Self::Play => CommandKind::Play,
            Self::Stop => CommandKind::Stop,
            Self::Pause => CommandKind::Pause,
            Self::Ping { .. } => CommandKind::Ping,
            Self::SeekToTime { .. } => CommandKind::SeekToTime,
            Self::SeekToPosition { .. } => CommandKind::SeekToPosition,
            Self::RegisterModule(_) => CommandKind::RegisterModule,
            Self::AddNode { .. } => CommandKind::AddNode,
            Self::SetProperty { .. } => CommandKind::SetProperty,
        }
    }
}

impl fmt::Debug for DecoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetInput { name, media_type } => {
                f.debug_struct("SetInput")
                    .field("name", name)
                    .field("media_type", media_type)
                    .finish()
            },
            Self::SetOutput { name, media_type } => {
                f.debug_struct("SetOutput")
                    .field("name", name)
                    .field("media_type", media_type)
                    .finish()
            },
            Self::Play => f.write_str("Play"),
            Self::Stop => f.write_str("Stop"),
            Self::Pause => f.write_str("Pause"),
            Self::Ping { cookie } => f.debug_struct("Ping").field("cookie", cookie).finish(),
            Self::SeekToTime { ms } => f.debug_struct("SeekToTime").field("ms", ms).finish(),
            Self::SeekToPosition { offset, range } => {
                f.debug_struct("SeekToPosition")
                    .field("offset", offset)
                    .field("range", range)
                    .finish()
            },
            Self::RegisterModule(module) => {
                f.debug_tuple("RegisterModule").field(&module.name()).finish()
            },
            Self::AddNode { name } => f.debug_struct("AddNode").field("name", name).finish(),
            Self::SetProperty { scope, target, name, value } => f
                .debug_struct("SetProperty")
                .field("scope", scope)
                .field("target", target)
                .field("name", name)
                .field("value", value)
                .finish(),
        }
    }
}

/// Mailbox of the server thread.
#[derive(Debug)]
pub enum ServerMessage {
    Command(DecoderCommand),
    /// Exit the thread. Commands queued behind it are dropped.
    Terminate,
}

/// Something the server tells the player.
#[derive(Debug)]
pub enum PlayerEvent {
    /// The command succeeded.
    Ack { command: CommandKind },
    /// The command failed.
    Nack { command: CommandKind, error: TuneKitError },
    DecoderState(DecoderState),
    StreamTimeCode(TimeCode),
    /// Position rescaled to the configured update range.
    StreamPosition(StreamPosition),
    StreamInfo { update_mask: StreamInfoMask, info: StreamInfo },
    /// A property changed. `value` is `None` when it was removed.
    Property {
        scope: PropertyScope,
        source: Option<String>,
        name: String,
        value: Option<PropertyValue>,
    },
    Pong { cookie: u64 },
}

impl PlayerEvent {
    /// The command this event replies to, for ACK and NACK.
    pub const fn reply_to(&self) -> Option<CommandKind> {
        match self {
            Self::Ack { command } | Self::Nack { command, .. } => Some(*command),
            _ => None,
        }
    }
}

/// What the player's queue carries: server events, or a wake-up from an
/// [`Interrupter`](crate::Interrupter).
#[derive(Debug)]
pub(crate) enum ClientMessage {
    Event(PlayerEvent),
    Wake,
}
