// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A synchronous decoder: one [`Core`] driving one [`Stream`].
//!
//! The decoder is what the server thread owns. It can also be used on its
//! own when the caller is happy to pump packets from its own thread.

use crate::constants::{DEFAULT_OUTPUT_ALIAS, DEFAULT_OUTPUT_NAME, DEFAULT_OUTPUT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tunekit_core::context::{StreamInfo, StreamPosition};
use tunekit_core::{Core, Module, NodeId, Properties, Result, Stream, StreamEvent, TimeStamp};
use tunekit_nodes::BuiltinsConfig;

/// Where playback currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStatus {
    pub time_stamp: TimeStamp,
    pub position: StreamPosition,
}

pub struct Decoder {
    core: Core,
    stream: Stream,
    default_output_name: String,
    default_output_type: String,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("input", &self.stream.input_name())
            .field("output", &self.stream.output_name())
            .finish_non_exhaustive()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// A decoder on a fresh core with no modules registered.
    pub fn new() -> Self {
        Self::with_core(Core::new())
    }

    pub fn with_core(core: Core) -> Self {
        let stream = Stream::new(core.clone());
        Self {
            core,
            stream,
            default_output_name: DEFAULT_OUTPUT_NAME.to_string(),
            default_output_type: DEFAULT_OUTPUT_TYPE.to_string(),
        }
    }

    /// Changes what `"!default"` resolves to in [`Self::set_output`].
    pub fn set_default_output(&mut self, name: &str, media_type: &str) {
        self.default_output_name = name.to_string();
        self.default_output_type = media_type.to_string();
    }

    pub const fn core(&self) -> &Core {
        &self.core
    }

    pub const fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }

    /// # Errors
    ///
    /// See [`tunekit_nodes::register_builtins_with_config`].
    pub fn register_builtins(&self, config: &BuiltinsConfig) -> Result<()> {
        tunekit_nodes::register_builtins_with_config(&self.core, config)
    }

    /// # Errors
    ///
    /// See [`Core::register_module`].
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<()> {
        self.core.register_module(module)
    }

    /// Opens `name` as the new input. An empty name only closes the current input.
    ///
    /// # Errors
    ///
    /// Any error from [`Stream::set_input`]. On failure the previous input stays in place.
    pub fn set_input(&mut self, name: &str, media_type: Option<&str>) -> Result<()> {
        if name.is_empty() {
            tracing::debug!("closing input");
            self.stream.reset_input();
            return Ok(());
        }
        tracing::debug!(name, ?media_type, "opening input");
        self.stream.set_input(name, media_type.filter(|t| !t.is_empty())).map(|_| ())
    }

    /// Installs an output.
    ///
    /// No name (or an empty one) removes the output. `"!default"` picks the
    /// configured default output, with its media type unless one is given.
    ///
    /// # Errors
    ///
    /// Any error from [`Stream::set_output`].
    pub fn set_output(&mut self, name: Option<&str>, media_type: Option<&str>) -> Result<()> {
        let media_type = media_type.filter(|t| !t.is_empty());
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            tracing::debug!("closing output");
            self.stream.reset_output();
            return Ok(());
        };
        let (name, media_type) = if name == DEFAULT_OUTPUT_ALIAS {
            (
                self.default_output_name.as_str(),
                media_type.or(Some(self.default_output_type.as_str())),
            )
        } else {
            (name, media_type)
        };
        tracing::debug!(name, ?media_type, "opening output");
        self.stream.set_output(Some(name), media_type).map(|_| ())
    }

    /// Adds the node created for `name` in front of the output.
    ///
    /// # Errors
    ///
    /// See [`Stream::add_node_by_name`].
    pub fn add_node_by_name(&mut self, name: &str) -> Result<NodeId> {
        self.stream.add_node_by_name(None, name)
    }

    /// # Errors
    ///
    /// `Eos` once the input is exhausted, `Failure` without input or output.
    pub fn pump_packet(&mut self) -> Result<()> {
        self.stream.pump_packet()
    }

    pub fn stop(&mut self) {
        self.stream.stop();
    }

    pub fn pause(&mut self) {
        self.stream.pause();
    }

    /// # Errors
    ///
    /// The first node seek failure.
    pub fn seek_to_time(&mut self, ms: u64) -> Result<()> {
        self.stream.seek_to_time(ms)
    }

    /// # Errors
    ///
    /// The first node seek failure.
    pub fn seek_to_position(&mut self, offset: u64, range: u64) -> Result<()> {
        self.stream.seek_to_position(offset, range)
    }

    pub fn status(&self) -> DecoderStatus {
        let status = self.stream.status();
        DecoderStatus { time_stamp: status.time_stamp, position: status.position }
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.stream.info()
    }

    /// Properties of the core.
    pub fn properties(&self) -> &Properties {
        self.core.properties()
    }

    pub fn stream_properties(&self) -> &Properties {
        self.stream.properties()
    }

    pub fn set_event_listener(&self, listener: Option<mpsc::UnboundedSender<StreamEvent>>) {
        self.stream.set_event_listener(listener);
    }
}
