// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Memory output - Collects packet payloads into a shared in-memory buffer
//!
//! Every memory output publishes its [`MemoryOutputBuffer`] as an opaque core
//! property named [`MEMORY_OUTPUT_BUFFER_PROPERTY`], so the code that built the
//! stream can read what was produced without keeping a handle to the node.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;
use tunekit_core::module::{MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbePolicy};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::packet::MediaPacket;
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::properties::PropertyValue;
use tunekit_core::{Core, MediaType, Result, TuneKitError};

use crate::constants::MEMORY_OUTPUT_BUFFER_PROPERTY;

pub const MEMORY_OUTPUT_MODULE: &str = "MemoryOutput";

/// The constructor name that selects this output.
pub const MEMORY_OUTPUT_NAME: &str = "memory";

#[derive(Debug, Default)]
struct BufferState {
    data: BytesMut,
    media_type: Option<MediaType>,
    packets: u64,
    ended: bool,
}

/// Bytes written by a [`MemoryOutput`].
#[derive(Debug, Default)]
pub struct MemoryOutputBuffer {
    state: Mutex<BufferState>,
}

impl MemoryOutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the buffer published on `core`.
    pub fn from_core(core: &Core) -> Option<Arc<Self>> {
        core.properties().get_opaque::<Self>(MEMORY_OUTPUT_BUFFER_PROPERTY)
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of everything written so far.
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().data)
    }

    /// Removes and returns everything written so far.
    pub fn take(&self) -> Bytes {
        self.state.lock().data.split().freeze()
    }

    /// Type of the last packet written.
    pub fn media_type(&self) -> Option<MediaType> {
        self.state.lock().media_type.clone()
    }

    pub fn packets(&self) -> u64 {
        self.state.lock().packets
    }

    /// Whether an end of stream packet was written.
    pub fn ended(&self) -> bool {
        self.state.lock().ended
    }

    fn write(&self, packet: &MediaPacket) {
        let mut state = self.state.lock();
        state.data.extend_from_slice(packet.payload());
        state.media_type = Some(packet.media_type().clone());
        state.packets += 1;
        state.ended |= packet.is_drain_marker();
    }
}

#[derive(Debug, Default)]
pub struct MemoryOutputModule;

impl Module for MemoryOutputModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(MEMORY_OUTPUT_MODULE, ModuleId::from_tag(MEMORY_OUTPUT_NAME))
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        ProbePolicy {
            module: MEMORY_OUTPUT_NAME,
            input_protocol: PortProtocol::Packet,
            output_protocol: PortProtocol::None,
            input_type: None,
            output_type: None,
            default_score: None,
        }
        .evaluate(constructor)
    }

    fn create_instance(
        &self,
        core: &Core,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        let buffer = Arc::new(MemoryOutputBuffer::new());
        core.properties()
            .set(MEMORY_OUTPUT_BUFFER_PROPERTY, PropertyValue::Opaque(Arc::clone(&buffer) as _));
        Ok(Box::new(MemoryOutput { expected: constructor.input_type().clone(), buffer }))
    }
}

/// A terminal node appending every payload to a [`MemoryOutputBuffer`].
#[derive(Debug)]
pub struct MemoryOutput {
    expected: MediaType,
    buffer: Arc<MemoryOutputBuffer>,
}

impl MemoryOutput {
    pub const fn new(expected: MediaType, buffer: Arc<MemoryOutputBuffer>) -> Self {
        Self { expected, buffer }
    }

    fn accepts(&self, media_type: &MediaType) -> bool {
        self.expected.is_unknown() || self.expected.id == media_type.id
    }
}

impl MediaNode for MemoryOutput {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo {
            module: MEMORY_OUTPUT_MODULE.to_string(),
            name: Some(MEMORY_OUTPUT_NAME.to_string()),
        }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![MediaPort::input(PortProtocol::Packet, [self.expected.clone()])]
    }

    fn check_media_type(&self, _port: &str, media_type: &MediaType) -> Result<()> {
        if self.accepts(media_type) {
            Ok(())
        } else {
            Err(TuneKitError::InvalidMediaFormat)
        }
    }

    fn put_packet(&mut self, _port: &str, packet: MediaPacket) -> Result<()> {
        if !self.accepts(packet.media_type()) {
            return Err(TuneKitError::InvalidMediaType);
        }
        self.buffer.write(&packet);
        Ok(())
    }
}
