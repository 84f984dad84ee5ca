// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! TuneKit Core - Media types, nodes, modules and stream wiring.
//!
//! This crate defines the abstractions every TuneKit module builds on:
//!
//! ## Core Modules
//!
//! - [`media`]: Media type descriptors and their binary form
//! - [`packet`] / [`packet_pool`]: Media packets backed by pooled buffers
//! - [`byte_stream`]: Seekable input byte streams shared between nodes
//! - [`port`]: Port protocols and negotiation specs
//! - [`node`]: The `MediaNode` trait and its lifecycle states
//! - [`module`]: Node factories and probe scoring
//! - [`core`]: Module list, registry and shared properties
//! - [`registry`]: Name ↔ id mapping and file extensions
//! - [`stream`]: Chain wiring, converter interpolation and seeking
//! - [`context`]: Stream info, seek points and stream events
//! - [`properties`]: Observable typed property maps
//! - [`key_manager`]: Content key lookup for protected media
//! - [`error`]: Error types and handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use tunekit_core::{Core, Stream};
//!
//! let core = Core::new();
//! tunekit_nodes::register_builtins(&core)?;
//!
//! let mut stream = Stream::new(core);
//! stream.set_input("/music/track.wav", None)?;
//! stream.set_output(None, None)?;
//! loop {
//!     match stream.pump_packet() {
//!         Ok(()) => {},
//!         Err(e) if e.is_eos() => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

pub mod byte_stream;
pub mod context;
pub mod core;
pub mod error;
pub mod key_manager;
pub mod media;
pub mod module;
pub mod node;
pub mod packet;
pub mod packet_pool;
pub mod port;
pub mod properties;
pub mod registry;
pub mod stream;
pub mod time;

// Error handling
pub use error::{Result, TuneKitError};

// Framework handles
pub use crate::core::Core;
pub use context::{SeekMode, SeekPoint, StreamContext, StreamEvent, StreamInfo, StreamInfoMask};
pub use stream::{NodeId, Stream, StreamNodeInfo, StreamStatus};

// Node and module abstractions
pub use module::{MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbeMatch, ProbePolicy};
pub use node::{MediaNode, MediaNodeInfo, MediaNodeState};
pub use port::{MediaPort, MediaPortInterfaceSpec, PortProtocol, INPUT_PORT, OUTPUT_PORT};

// Media data
pub use byte_stream::{InputStream, SharedInputStream};
pub use media::{MediaFormat, MediaType, PcmFormat, PcmSampleFormat};
pub use packet::{MediaPacket, PacketFlags};
pub use properties::{Properties, PropertyValue};
pub use time::{TimeCode, TimeStamp};
