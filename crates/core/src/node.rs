// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The media node abstraction.
//!
//! A media node is an instance created by a [`Module`](crate::module::Module).
//! It exposes named ports and moves media either as packets (PACKET ports)
//! or as shared byte streams (STREAM_PULL ports).
//!
//! ## State Machine
//!
//! ```text
//!     Reset ──activate──→ Idle ──start──→ Running ──pause──→ Paused
//!       ↑                  ↑                 │  ↑               │
//!       │                  └──────stop───────┘  └────resume─────┘
//!       └────────────────── deactivate (from any state) ─────────
//! ```
//!
//! Nodes only implement the transitions. The owning [`Stream`](crate::stream::Stream)
//! tracks the state and decides which transition to call.

use crate::byte_stream::SharedInputStream;
use crate::context::{SeekMode, SeekPoint, StreamContext};
use crate::error::{Result, TuneKitError};
use crate::media::MediaType;
use crate::packet::MediaPacket;
use crate::port::MediaPort;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a node inside a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaNodeState {
    #[default]
    Reset,
    Idle,
    Running,
    Paused,
}

/// Identity of a node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaNodeInfo {
    /// Name of the module that created the node.
    pub module: String,
    /// Instance name, usually the constructor name (a file path, a URL, ...).
    pub name: Option<String>,
}

/// A processing unit in a stream.
///
/// All lifecycle methods default to no-ops, and all media exchange methods
/// default to `InvalidInterface`, so a node only implements what its ports support.
pub trait MediaNode: Send {
    fn info(&self) -> MediaNodeInfo;

    /// Snapshots of the node's ports.
    fn ports(&self) -> Vec<MediaPort>;

    /// Looks a port up by name.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchPort` if the node has no port called `name`.
    fn port_by_name(&self, name: &str) -> Result<MediaPort> {
        self.ports()
            .into_iter()
            .find(|port| port.name == name)
            .ok_or_else(|| TuneKitError::NoSuchPort(name.to_string()))
    }

    /// Called once the node is placed in a stream.
    fn activate(&mut self, _context: &StreamContext) -> Result<()> {
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Repositions the node.
    ///
    /// Nodes drop any pending media. A node that performs the seek itself may
    /// set `mode` to [`SeekMode::Ignore`] so upstream nodes leave their position alone,
    /// and may refine `point` with the position it actually reached.
    fn seek(&mut self, _mode: &mut SeekMode, _point: &mut SeekPoint) -> Result<()> {
        Ok(())
    }

    /// Pulls the next packet from a PACKET output port.
    ///
    /// # Errors
    ///
    /// `Eos` once the port is exhausted, `PortHasNoData` when nothing is ready yet.
    fn get_packet(&mut self, port: &str) -> Result<MediaPacket> {
        Err(TuneKitError::InvalidInterface(format!("port '{port}' does not produce packets")))
    }

    /// Tells whether packets of `media_type` are acceptable on input `port`.
    ///
    /// The stream asks before its first delivery on an unconnected port.
    /// `InvalidMediaFormat` makes it look for a converter instead of failing.
    fn check_media_type(&self, _port: &str, _media_type: &MediaType) -> Result<()> {
        Ok(())
    }

    /// Pushes a packet into a PACKET input port.
    ///
    /// # Errors
    ///
    /// `InvalidMediaFormat` if the packet type is not acceptable.
    fn put_packet(&mut self, port: &str, _packet: MediaPacket) -> Result<()> {
        Err(TuneKitError::InvalidInterface(format!("port '{port}' does not accept packets")))
    }

    /// Returns the byte stream produced on a STREAM_PULL output port, with its media type.
    ///
    /// # Errors
    ///
    /// `PortHasNoStream` if the stream is not available yet.
    fn get_stream(&mut self, port: &str) -> Result<(SharedInputStream, MediaType)> {
        Err(TuneKitError::InvalidInterface(format!("port '{port}' does not produce a stream")))
    }

    /// Hands a byte stream to a STREAM_PULL input port.
    fn set_stream(
        &mut self,
        port: &str,
        _stream: SharedInputStream,
        _media_type: &MediaType,
    ) -> Result<()> {
        Err(TuneKitError::InvalidInterface(format!("port '{port}' does not accept a stream")))
    }
}

impl std::fmt::Debug for dyn MediaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.info();
        f.debug_struct("MediaNode").field("module", &info.module).field("name", &info.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortProtocol, INPUT_PORT, OUTPUT_PORT};

    struct Passive;

    impl MediaNode for Passive {
        fn info(&self) -> MediaNodeInfo {
            MediaNodeInfo { module: "Passive".to_string(), name: None }
        }

        fn ports(&self) -> Vec<MediaPort> {
            vec![MediaPort::input(PortProtocol::Packet, [MediaType::unknown()])]
        }
    }

    #[test]
    fn test_defaults() {
        let mut node = Passive;
        assert!(node.start().is_ok());
        assert_eq!(node.port_by_name(INPUT_PORT).unwrap().protocol, PortProtocol::Packet);
        assert!(matches!(node.port_by_name(OUTPUT_PORT), Err(TuneKitError::NoSuchPort(_))));
        assert!(matches!(node.get_packet(OUTPUT_PORT), Err(TuneKitError::InvalidInterface(_))));
        assert!(matches!(node.get_stream(OUTPUT_PORT), Err(TuneKitError::InvalidInterface(_))));
        assert_eq!(MediaNodeState::default(), MediaNodeState::Reset);
    }

    #[test]
    fn test_state_and_info_serde() {
        assert_eq!(serde_json::to_string(&MediaNodeState::Running).unwrap(), "\"running\"");
        let info: MediaNodeInfo =
            serde_json::from_str(r#"{"module":"WaveParser","name":"track.wav"}"#).unwrap();
        assert_eq!(info.name.as_deref(), Some("track.wav"));
    }
}
