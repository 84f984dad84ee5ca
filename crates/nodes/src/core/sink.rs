// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Null output
//!
//! Accepts packets and discards them. This is the output a stream gets when
//! none is named, which makes it useful for decoding benchmarks and for tests.

use tunekit_core::module::{MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbePolicy};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::packet::MediaPacket;
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::{Core, MediaType, Result, TuneKitError};

pub const NULL_OUTPUT_MODULE: &str = "NullOutput";

/// The constructor name that selects this output.
pub const NULL_OUTPUT_NAME: &str = "null";

#[derive(Debug, Default)]
pub struct NullOutputModule;

impl Module for NullOutputModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(NULL_OUTPUT_MODULE, ModuleId::from_tag(NULL_OUTPUT_NAME))
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        let policy = ProbePolicy {
            module: NULL_OUTPUT_NAME,
            input_protocol: PortProtocol::Packet,
            output_protocol: PortProtocol::None,
            input_type: None,
            output_type: None,
            default_score: None,
        };
        policy.evaluate(constructor)
    }

    fn create_instance(
        &self,
        _core: &Core,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        Ok(Box::new(NullOutput::new(constructor.input_type().clone())))
    }
}

/// A terminal node that drops every packet it receives.
#[derive(Debug)]
pub struct NullOutput {
    expected: MediaType,
    packets: u64,
    bytes: u64,
}

impl NullOutput {
    /// `expected` of type UNKNOWN accepts any packet.
    pub const fn new(expected: MediaType) -> Self {
        Self { expected, packets: 0, bytes: 0 }
    }

    pub const fn packets(&self) -> u64 {
        self.packets
    }

    pub const fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl MediaNode for NullOutput {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo {
            module: NULL_OUTPUT_MODULE.to_string(),
            name: Some(NULL_OUTPUT_NAME.to_string()),
        }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![MediaPort::input(PortProtocol::Packet, [self.expected.clone()])]
    }

    fn stop(&mut self) -> Result<()> {
        tracing::debug!(packets = self.packets, bytes = self.bytes, "null output stopped");
        Ok(())
    }

    fn check_media_type(&self, _port: &str, media_type: &MediaType) -> Result<()> {
        if self.expected.is_unknown() || self.expected.id == media_type.id {
            Ok(())
        } else {
            Err(TuneKitError::InvalidMediaFormat)
        }
    }

    fn put_packet(&mut self, port: &str, packet: MediaPacket) -> Result<()> {
        self.check_media_type(port, packet.media_type())?;
        self.packets += 1;
        self.bytes += packet.payload_size() as u64;
        Ok(())
    }
}
