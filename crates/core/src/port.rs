// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media ports: named, directional node endpoints.
//!
//! A port describes how media leaves or enters a node (its [`PortProtocol`])
//! and which media types it can negotiate. Index 0 of
//! [`MediaPort::query_media_type`] is always the preferred type.

use crate::error::{Result, TuneKitError};
use crate::media::MediaType;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Well-known name of a node's primary input port.
pub const INPUT_PORT: &str = "input";
/// Well-known name of a node's primary output port.
pub const OUTPUT_PORT: &str = "output";

/// Transport protocol of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortProtocol {
    /// No negotiable media flow (pure sources and sinks).
    None,
    /// Wildcard, only meaningful in construction requests.
    Any,
    /// The consumer pulls bytes from a shared byte stream.
    StreamPull,
    /// Discrete packets pulled one at a time.
    Packet,
}

impl PortProtocol {
    /// Whether `self`, as requested by a constructor, accepts a port using `actual`.
    pub fn accepts(self, actual: Self) -> bool {
        self == Self::Any || self == actual
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Any => "ANY",
            Self::StreamPull => "STREAM_PULL",
            Self::Packet => "PACKET",
        }
    }
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    In,
    Out,
}

/// Snapshot of a node port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPort {
    pub name: String,
    pub direction: PortDirection,
    pub protocol: PortProtocol,
    media_types: SmallVec<[MediaType; 2]>,
}

impl MediaPort {
    pub fn new(
        name: impl Into<String>,
        direction: PortDirection,
        protocol: PortProtocol,
        media_types: impl IntoIterator<Item = MediaType>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            protocol,
            media_types: media_types.into_iter().collect(),
        }
    }

    /// An `"input"` port.
    pub fn input(protocol: PortProtocol, media_types: impl IntoIterator<Item = MediaType>) -> Self {
        Self::new(INPUT_PORT, PortDirection::In, protocol, media_types)
    }

    /// An `"output"` port.
    pub fn output(
        protocol: PortProtocol,
        media_types: impl IntoIterator<Item = MediaType>,
    ) -> Self {
        Self::new(OUTPUT_PORT, PortDirection::Out, protocol, media_types)
    }

    /// Returns the `index`-th acceptable media type.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchItem` for any index past the last type.
    pub fn query_media_type(&self, index: usize) -> Result<&MediaType> {
        self.media_types.get(index).ok_or(TuneKitError::NoSuchItem)
    }

    pub fn media_types(&self) -> impl Iterator<Item = &MediaType> {
        self.media_types.iter()
    }
}

/// Protocol and media type requested for one side of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPortInterfaceSpec {
    pub protocol: PortProtocol,
    pub media_type: MediaType,
}

impl MediaPortInterfaceSpec {
    pub const fn new(protocol: PortProtocol, media_type: MediaType) -> Self {
        Self { protocol, media_type }
    }

    /// Any protocol, unknown type.
    pub const fn any() -> Self {
        Self::new(PortProtocol::Any, MediaType::unknown())
    }

    /// No protocol, no type.
    pub const fn none() -> Self {
        Self::new(PortProtocol::None, MediaType::none())
    }
}
