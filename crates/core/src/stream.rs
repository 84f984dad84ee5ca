// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Streams: a chain of media nodes from one input to one output.
//!
//! A [`Stream`] owns its nodes in chain order (head is the input, tail is the
//! output) and wires them lazily. Each [`Stream::pump_packet`] call walks the
//! chain from the tail towards the head, looking for the node closest to the
//! output that can make progress:
//!
//! - a PACKET producer with a packet ready delivers it to its successor;
//! - an unconnected STREAM_PULL producer gets connected to its successor.
//!
//! Whenever two neighbours do not speak the same protocol or media type, the
//! stream asks the [`Core`] for a converter and inserts it between them as a
//! *transient* node. Transient nodes are removed again when the input or the
//! output of the stream is replaced.

use crate::byte_stream::SharedInputStream;
use crate::context::{
    SeekMode, SeekPoint, SeekPointMask, StreamContext, StreamEvent, StreamInfo, StreamInfoMask,
    StreamPosition, TopologyChange,
};
use crate::core::Core;
use crate::error::{Result, TuneKitError};
use crate::media::{MediaType, MIME_AUDIO_PCM};
use crate::module::MediaNodeConstructor;
use crate::node::{MediaNode, MediaNodeInfo, MediaNodeState};
use crate::packet::MediaPacket;
use crate::port::{MediaPortInterfaceSpec, PortProtocol, INPUT_PORT, OUTPUT_PORT};
use crate::properties::Properties;
use crate::registry::RegistryCategory;
use crate::time::TimeStamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Output used when [`Stream::set_output`] is given no name.
pub const DEFAULT_OUTPUT_NAME: &str = "null";
/// Media type used with [`DEFAULT_OUTPUT_NAME`] when no type is given.
pub const DEFAULT_OUTPUT_TYPE: &str = MIME_AUDIO_PCM;

/// Identifies a node within its stream. Never reused by the same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Protocol and connection status of one side of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatus {
    pub protocol: PortProtocol,
    pub connected: bool,
}

impl PortStatus {
    const fn new(protocol: PortProtocol) -> Self {
        Self { protocol, connected: false }
    }
}

/// Public view of a node in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamNodeInfo {
    pub id: NodeId,
    pub node: MediaNodeInfo,
    pub state: MediaNodeState,
    /// Inserted automatically to bridge two nodes.
    pub transient: bool,
    pub input: PortStatus,
    pub output: PortStatus,
}

/// Position and time of the media most recently delivered to the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub time_stamp: TimeStamp,
    pub position: StreamPosition,
}

struct StreamNode {
    id: NodeId,
    node: Box<dyn MediaNode>,
    state: MediaNodeState,
    transient: bool,
    input: PortStatus,
    output: PortStatus,
}

fn port_protocol(node: &dyn MediaNode, name: &str) -> Result<PortProtocol> {
    match node.port_by_name(name) {
        Ok(port) if port.protocol == PortProtocol::Any => Err(TuneKitError::InvalidInterface(
            format!("port '{name}' advertises the ANY protocol"),
        )),
        Ok(port) => Ok(port.protocol),
        Err(_) => Ok(PortProtocol::None),
    }
}

impl StreamNode {
    /// Activates `node` and wraps it. The node starts out Idle.
    fn create(id: NodeId, mut node: Box<dyn MediaNode>, context: &StreamContext) -> Result<Self> {
        node.activate(context)?;
        let input = port_protocol(node.as_ref(), INPUT_PORT)?;
        let output = port_protocol(node.as_ref(), OUTPUT_PORT)?;
        Ok(Self {
            id,
            node,
            state: MediaNodeState::Idle,
            transient: false,
            input: PortStatus::new(input),
            output: PortStatus::new(output),
        })
    }

    fn name(&self) -> String {
        self.node.info().module
    }

    fn info(&self) -> StreamNodeInfo {
        StreamNodeInfo {
            id: self.id,
            node: self.node.info(),
            state: self.state,
            transient: self.transient,
            input: self.input,
            output: self.output,
        }
    }

    fn activate(&mut self, context: &StreamContext) -> Result<()> {
        if self.state == MediaNodeState::Reset {
            self.node.activate(context)?;
        }
        self.state = MediaNodeState::Idle;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        match self.state {
            MediaNodeState::Reset => {},
            MediaNodeState::Running | MediaNodeState::Paused => {
                self.stop()?;
                self.node.deactivate()?;
            },
            MediaNodeState::Idle => self.node.deactivate()?,
        }
        self.state = MediaNodeState::Reset;
        Ok(())
    }

    fn start(&mut self, context: &StreamContext) -> Result<()> {
        match self.state {
            MediaNodeState::Reset => {
                self.activate(context)?;
                self.node.start()?;
            },
            MediaNodeState::Idle => self.node.start()?,
            MediaNodeState::Running => return Ok(()),
            MediaNodeState::Paused => self.node.resume()?,
        }
        self.state = MediaNodeState::Running;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        match self.state {
            MediaNodeState::Reset | MediaNodeState::Idle => return Ok(()),
            MediaNodeState::Running | MediaNodeState::Paused => self.node.stop()?,
        }
        self.state = MediaNodeState::Idle;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        match self.state {
            MediaNodeState::Reset | MediaNodeState::Idle => return Ok(()),
            MediaNodeState::Running => self.node.pause()?,
            MediaNodeState::Paused => {},
        }
        self.state = MediaNodeState::Paused;
        Ok(())
    }

    fn seek(
        &mut self,
        context: &StreamContext,
        mode: &mut SeekMode,
        point: &mut SeekPoint,
    ) -> Result<()> {
        if self.state == MediaNodeState::Reset {
            self.activate(context)?;
        }
        self.node.seek(mode, point)
    }
}

impl Drop for StreamNode {
    fn drop(&mut self) {
        if let Err(e) = self.deactivate() {
            tracing::debug!(node = %self.id, error = %e, "node deactivation failed");
        }
    }
}

/// A media stream: a chain of nodes fed by one input and drained by one output.
pub struct Stream {
    core: Core,
    context: StreamContext,
    nodes: Vec<StreamNode>,
    next_id: u64,
    input: Option<(NodeId, String)>,
    output: Option<(NodeId, String)>,
    last_time_stamp: TimeStamp,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<String> = self.nodes.iter().map(StreamNode::name).collect();
        f.debug_struct("Stream")
            .field("chain", &chain)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl Stream {
    pub fn new(core: Core) -> Self {
        let context = StreamContext::new(core.clone());
        Self {
            core,
            context,
            nodes: Vec::new(),
            next_id: 1,
            input: None,
            output: None,
            last_time_stamp: TimeStamp::ZERO,
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    pub fn properties(&self) -> &Properties {
        self.context.properties()
    }

    /// Receives info and topology events from now on.
    pub fn set_event_listener(&self, listener: Option<mpsc::UnboundedSender<StreamEvent>>) {
        self.context.set_event_listener(listener);
    }

    pub fn info(&self) -> StreamInfo {
        self.context.info()
    }

    pub fn set_info(&self, info: &StreamInfo) -> StreamInfoMask {
        self.context.set_info(info)
    }

    /// Time of the last packet that reached the output, and the position it maps to.
    pub fn status(&self) -> StreamStatus {
        let info = self.context.info();
        let position = if info.duration == 0 {
            StreamPosition::default()
        } else {
            let ms = u128::from(self.last_time_stamp.to_millis());
            let offset = ms * u128::from(info.size) / u128::from(info.duration);
            StreamPosition { offset: u64::try_from(offset).unwrap_or(u64::MAX), range: info.size }
        };
        StreamStatus { time_stamp: self.last_time_stamp, position }
    }

    pub fn input_node(&self) -> Option<NodeId> {
        self.input.as_ref().map(|(id, _)| *id)
    }

    pub fn input_name(&self) -> Option<&str> {
        self.input.as_ref().map(|(_, name)| name.as_str())
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.output.as_ref().map(|(id, _)| *id)
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output.as_ref().map(|(_, name)| name.as_str())
    }

    /// The chain, head (input) first.
    pub fn nodes(&self) -> Vec<StreamNodeInfo> {
        self.nodes.iter().map(StreamNode::info).collect()
    }

    /// # Errors
    ///
    /// `NoSuchMediaNode` if `id` is not in this stream.
    pub fn node_info(&self, id: NodeId) -> Result<StreamNodeInfo> {
        Ok(self.nodes[self.index_of(id)?].info())
    }

    /// Direct access to a node of the chain.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut (dyn MediaNode + 'static)> {
        self.nodes.iter_mut().find(|n| n.id == id).map(|n| n.node.as_mut())
    }

    fn index_of(&self, id: NodeId) -> Result<usize> {
        self.nodes.iter().position(|n| n.id == id).ok_or(TuneKitError::NoSuchMediaNode)
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn wrap(&mut self, node: Box<dyn MediaNode>) -> Result<StreamNode> {
        let id = self.allocate_id();
        StreamNode::create(id, node, &self.context)
    }

    fn topology_changed(&self, change: TopologyChange, node: &StreamNode) {
        self.context.post_event(StreamEvent::Topology { change, node: node.id, name: node.name() });
    }

    /// Inserts `node` right after the node at `after`, or at the head.
    fn insert(&mut self, after: Option<usize>, node: StreamNode) -> usize {
        let index = after.map_or(0, |i| i + 1);
        tracing::debug!(node = %node.id, module = %node.name(), index, "inserting node");
        self.nodes.insert(index, node);
        self.topology_changed(TopologyChange::NodeAdded, &self.nodes[index]);
        index
    }

    fn remove_at(&mut self, index: usize) {
        if index > 0 {
            self.nodes[index - 1].output.connected = false;
        }
        if index + 1 < self.nodes.len() {
            self.nodes[index + 1].input.connected = false;
        }
        let node = self.nodes.remove(index);
        tracing::debug!(node = %node.id, module = %node.name(), "removing node");
        self.topology_changed(TopologyChange::NodeRemoved, &node);
    }

    /// Removes every transient node.
    fn cleanup_chain(&mut self) {
        let mut index = 0;
        while index < self.nodes.len() {
            if self.nodes[index].transient {
                self.remove_at(index);
            } else {
                index += 1;
            }
        }
    }

    fn connect_nodes(&mut self, from: usize, to: usize) {
        self.nodes[from].output.connected = true;
        self.nodes[to].input.connected = true;
        tracing::debug!(from = %self.nodes[from].id, to = %self.nodes[to].id, "nodes connected");
        // only the upstream node is announced, the other one follows it in the chain
        self.topology_changed(TopologyChange::NodeConnected, &self.nodes[from]);
    }

    fn media_type_id(&self, mime: Option<&str>) -> Result<Option<u32>> {
        match mime.filter(|m| !m.is_empty()) {
            Some(mime) => {
                Ok(Some(self.core.registry().id_for_name(&RegistryCategory::MediaTypeIds, mime)?))
            },
            None => Ok(None),
        }
    }

    fn reset_input_node(&mut self) {
        self.context.reset_info();
        self.last_time_stamp = TimeStamp::ZERO;
        self.context.properties().clear();

        if let Some((id, _)) = self.input.take() {
            if let Ok(index) = self.index_of(id) {
                self.remove_at(index);
            }
            self.cleanup_chain();
        }
    }

    /// Removes the input node and any transient node, and clears the stream
    /// info and properties. Listeners get a full info update.
    pub fn reset_input(&mut self) {
        self.reset_input_node();
        self.context.post_event(StreamEvent::Info {
            update_mask: StreamInfoMask::ALL,
            info: self.context.info(),
        });
    }

    /// Installs `node` as the input, replacing the current one.
    ///
    /// # Errors
    ///
    /// Whatever the node's activation returns.
    pub fn set_input_node(&mut self, name: &str, node: Box<dyn MediaNode>) -> Result<NodeId> {
        self.reset_input_node();
        let node = self.wrap(node)?;
        let id = node.id;
        self.input = Some((id, name.to_string()));
        self.insert(None, node);
        Ok(id)
    }

    /// Creates an input node for `name` (a path, a URL...) and installs it.
    ///
    /// `mime`, when given, forces the media type the input must produce.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for an empty name, `NoSuchName` for an unregistered
    /// MIME type, or any node creation error.
    pub fn set_input(&mut self, name: &str, mime: Option<&str>) -> Result<NodeId> {
        if name.is_empty() {
            return Err(TuneKitError::InvalidParameters("input name is empty".into()));
        }
        let mut output_type = MediaType::unknown();
        if let Some(id) = self.media_type_id(mime)? {
            output_type.id = id;
        }
        let constructor = MediaNodeConstructor::new(
            Some(name),
            MediaPortInterfaceSpec::none(),
            MediaPortInterfaceSpec::new(PortProtocol::Any, output_type),
        );
        let node = self.core.create_compatible_node(&constructor)?;
        tracing::debug!(name, module = %node.info().module, "input created");
        self.set_input_node(name, node)
    }

    /// Removes the output node and any transient node.
    pub fn reset_output(&mut self) {
        if let Some((id, _)) = self.output.take() {
            if let Ok(index) = self.index_of(id) {
                self.remove_at(index);
            }
            self.cleanup_chain();
        }
        self.last_time_stamp = TimeStamp::ZERO;
    }

    /// Installs `node` as the output, replacing the current one.
    ///
    /// # Errors
    ///
    /// Whatever the node's activation returns.
    pub fn set_output_node(&mut self, name: &str, node: Box<dyn MediaNode>) -> Result<NodeId> {
        self.reset_output();
        let node = self.wrap(node)?;
        let id = node.id;
        self.output = Some((id, name.to_string()));
        let tail = self.nodes.len().checked_sub(1);
        self.insert(tail, node);
        Ok(id)
    }

    /// Creates an output node and installs it.
    ///
    /// Without a name the default output is used, with the default media type
    /// unless `mime` says otherwise.
    ///
    /// # Errors
    ///
    /// `NoSuchName` for an unregistered MIME type, or any node creation error.
    pub fn set_output(&mut self, name: Option<&str>, mime: Option<&str>) -> Result<NodeId> {
        let mime = mime.filter(|m| !m.is_empty());
        let (name, mime) = match name {
            Some(name) => (name, mime),
            None => (DEFAULT_OUTPUT_NAME, mime.or(Some(DEFAULT_OUTPUT_TYPE))),
        };
        let mut input_type = MediaType::unknown();
        if let Some(id) = self.media_type_id(mime)? {
            input_type.id = id;
        }
        let constructor = MediaNodeConstructor::new(
            Some(name),
            MediaPortInterfaceSpec::new(PortProtocol::Any, input_type),
            MediaPortInterfaceSpec::none(),
        );
        let node = self.core.create_compatible_node(&constructor)?;
        tracing::debug!(name, module = %node.info().module, "output created");
        self.set_output_node(name, node)
    }

    /// Adds `node` after the node `after`. Without `after`, the node goes just
    /// before the output, or at the head when there is no output.
    ///
    /// # Errors
    ///
    /// `NoSuchMediaNode` if `after` is not in the stream, or the node's activation error.
    pub fn add_node(&mut self, after: Option<NodeId>, node: Box<dyn MediaNode>) -> Result<NodeId> {
        let insert_point = match after {
            Some(id) => Some(self.index_of(id)?),
            None => match self.output_node() {
                Some(output) => self.index_of(output)?.checked_sub(1),
                None => None,
            },
        };
        let node = self.wrap(node)?;
        let id = node.id;
        self.insert(insert_point, node);
        Ok(id)
    }

    /// Creates the node named `name` with no interface constraint and adds it.
    ///
    /// # Errors
    ///
    /// Node creation errors, see also [`Self::add_node`].
    pub fn add_node_by_name(&mut self, after: Option<NodeId>, name: &str) -> Result<NodeId> {
        let constructor = MediaNodeConstructor::new(
            Some(name),
            MediaPortInterfaceSpec::any(),
            MediaPortInterfaceSpec::any(),
        );
        let node = self.core.create_compatible_node(&constructor)?;
        self.add_node(after, node)
    }

    /// Finds a node that can follow `from` given the media type it produces,
    /// trying progressively looser requirements on the output side.
    fn create_compatible_media_node(
        &self,
        from: usize,
        from_type: &MediaType,
        to: Option<usize>,
    ) -> Result<Box<dyn MediaNode>> {
        let input =
            MediaPortInterfaceSpec::new(self.nodes[from].output.protocol, from_type.clone());
        let attempt = |output: MediaPortInterfaceSpec| {
            let constructor = MediaNodeConstructor::new(None, input.clone(), output);
            tracing::trace!(
                input = %constructor.spec.input.protocol,
                input_type = constructor.spec.input.media_type.id,
                output = %constructor.spec.output.protocol,
                output_type = constructor.spec.output.media_type.id,
                "trying to interpolate"
            );
            self.core.create_compatible_node(&constructor)
        };

        if let Some(to) = to {
            let to_node = &self.nodes[to];
            let expected: Vec<MediaType> = to_node
                .node
                .port_by_name(INPUT_PORT)
                .map(|port| port.media_types().cloned().collect())
                .unwrap_or_default();

            for protocol in [to_node.input.protocol, PortProtocol::Any] {
                for media_type in &expected {
                    if let Ok(node) =
                        attempt(MediaPortInterfaceSpec::new(protocol, media_type.clone()))
                    {
                        return Ok(node);
                    }
                }
            }
        }

        attempt(MediaPortInterfaceSpec::any()).map_err(|_| TuneKitError::StreamNoCompatibleNode)
    }

    /// Creates a converter after `from` and inserts it as a transient node.
    fn interpolate_chain(&mut self, from: usize, from_type: &MediaType) -> Result<usize> {
        let to = (from + 1 < self.nodes.len()).then_some(from + 1);
        let node = self.create_compatible_media_node(from, from_type, to)?;
        let mut node = self.wrap(node)?;
        node.transient = true;
        Ok(self.insert(Some(from), node))
    }

    /// Hands `packet` to the successor of `from`, interpolating a converter
    /// when the successor does not take packets of that type.
    fn deliver_packet(&mut self, from: usize, packet: MediaPacket) -> Result<()> {
        if from + 1 >= self.nodes.len() {
            return Err(TuneKitError::Internal("packet producer has no successor".into()));
        }
        let time_stamp = packet.time_stamp();
        let was_connected = self.nodes[from].output.connected;

        let to = if was_connected {
            self.nodes[from + 1].node.put_packet(INPUT_PORT, packet)?;
            from + 1
        } else {
            let media_type = packet.media_type().clone();
            let next = &self.nodes[from + 1];
            let direct = next.input.protocol == PortProtocol::Packet
                && match next.node.check_media_type(INPUT_PORT, &media_type) {
                    Ok(()) => true,
                    Err(TuneKitError::InvalidMediaFormat) => false,
                    Err(e) => return Err(e),
                };
            if direct {
                self.nodes[from + 1].node.put_packet(INPUT_PORT, packet)?;
                from + 1
            } else {
                let to = self.interpolate_chain(from, &media_type)?;
                if self.nodes[to].input.protocol != PortProtocol::Packet {
                    return Err(TuneKitError::Internal(format!(
                        "interpolated node '{}' does not take packets",
                        self.nodes[to].name()
                    )));
                }
                self.nodes[to].node.put_packet(INPUT_PORT, packet)?;
                to
            }
        };

        if Some(self.nodes[to].id) == self.output_node() {
            self.last_time_stamp = time_stamp;
        }
        if !was_connected {
            self.connect_nodes(from, to);
        }
        Ok(())
    }

    /// Type to announce along a byte stream from `from`.
    fn stream_media_type(&self, from: usize, fallback: Option<&MediaType>) -> MediaType {
        self.nodes[from]
            .node
            .port_by_name(OUTPUT_PORT)
            .ok()
            .and_then(|port| port.query_media_type(0).ok().cloned())
            .or_else(|| fallback.cloned())
            .unwrap_or_else(MediaType::unknown)
    }

    fn transfer_stream(
        &mut self,
        from: usize,
        to: usize,
        media_type: Option<&MediaType>,
    ) -> Result<()> {
        let protocol = self.nodes[from].output.protocol;
        if protocol != PortProtocol::StreamPull {
            return Err(TuneKitError::Internal(format!(
                "cannot set up a byte stream over {protocol}"
            )));
        }
        let (stream, stream_type): (SharedInputStream, MediaType) =
            self.nodes[from].node.get_stream(OUTPUT_PORT)?;
        let media_type = match media_type {
            Some(media_type) => media_type.clone(),
            None => self.stream_media_type(from, Some(&stream_type)),
        };
        self.nodes[to].node.set_stream(INPUT_PORT, stream, &media_type)?;
        self.connect_nodes(from, to);
        Ok(())
    }

    /// Connects the byte stream output of `from` to the node after it,
    /// interpolating a converter if they are not directly compatible.
    fn connect_port(&mut self, from: usize) -> Result<()> {
        let to = from + 1;
        if to >= self.nodes.len() {
            return Err(TuneKitError::Internal("stream producer has no successor".into()));
        }

        if self.nodes[from].output.protocol == self.nodes[to].input.protocol {
            match self.transfer_stream(from, to, None) {
                Ok(()) => return Ok(()),
                Err(e) => tracing::trace!(error = %e, "direct stream setup failed, interpolating"),
            }
        }

        let media_type = self.nodes[from]
            .node
            .port_by_name(OUTPUT_PORT)?
            .query_media_type(0)?
            .clone();
        let new = self.interpolate_chain(from, &media_type)?;
        if self.nodes[from].output.protocol != self.nodes[new].input.protocol {
            self.remove_at(new);
            return Err(TuneKitError::Internal("interpolated node protocol mismatch".into()));
        }
        self.transfer_stream(from, new, Some(&media_type))
    }

    /// Moves media one step forward.
    ///
    /// # Errors
    ///
    /// `Failure` when the stream has no input or output, or when no node can
    /// make progress. `Eos` (or any other node error) is passed through.
    pub fn pump_packet(&mut self) -> Result<()> {
        if self.input.is_none() || self.output.is_none() {
            return Err(TuneKitError::Failure("stream has no input or no output".into()));
        }

        for index in (0..self.nodes.len()).rev() {
            let node = &mut self.nodes[index];
            node.start(&self.context)?;

            match node.output.protocol {
                PortProtocol::None => {},
                PortProtocol::Packet => match node.node.get_packet(OUTPUT_PORT) {
                    Ok(packet) => return self.deliver_packet(index, packet),
                    Err(TuneKitError::PortHasNoData) => {},
                    Err(e) => return Err(e),
                },
                PortProtocol::StreamPull => {
                    if !node.output.connected {
                        match self.connect_port(index) {
                            Err(TuneKitError::PortHasNoData | TuneKitError::PortHasNoStream) => {},
                            other => return other,
                        }
                    }
                },
                PortProtocol::Any => {
                    return Err(TuneKitError::Internal("node output uses the ANY protocol".into()));
                },
            }
        }

        Err(TuneKitError::Failure("no node could make progress".into()))
    }

    /// Stops every node. Failures are logged and ignored.
    pub fn stop(&mut self) {
        for node in &mut self.nodes {
            if let Err(e) = node.stop() {
                tracing::debug!(node = %node.id, error = %e, "node stop failed");
            }
        }
    }

    /// Pauses every running node. Failures are logged and ignored.
    pub fn pause(&mut self) {
        for node in &mut self.nodes {
            if let Err(e) = node.pause() {
                tracing::debug!(node = %node.id, error = %e, "node pause failed");
            }
        }
    }

    pub fn estimate_seek_point(&self, mode: SeekMode, point: &mut SeekPoint) -> Result<()> {
        self.context.estimate_seek_point(mode, point)
    }

    fn seek(&mut self, mode: &mut SeekMode, point: &mut SeekPoint) -> Result<()> {
        for index in (0..self.nodes.len()).rev() {
            self.nodes[index].seek(&self.context, mode, point)?;
        }
        if point.mask.contains(SeekPointMask::TIME_STAMP) {
            self.last_time_stamp = point.time_stamp;
        }
        Ok(())
    }

    /// Seeks every node to `ms` milliseconds from the start.
    ///
    /// # Errors
    ///
    /// The first node seek failure.
    pub fn seek_to_time(&mut self, ms: u64) -> Result<()> {
        let mut mode = SeekMode::ByTimeStamp;
        let mut point = SeekPoint {
            mask: SeekPointMask::TIME_STAMP,
            time_stamp: TimeStamp::from_millis(ms),
            ..SeekPoint::default()
        };
        if let Err(e) = self.estimate_seek_point(mode, &mut point) {
            tracing::debug!(error = %e, "seek point estimation incomplete");
        }
        self.seek(&mut mode, &mut point)
    }

    /// Seeks every node to `offset / range` of the stream. `offset` is clamped to `range`.
    ///
    /// # Errors
    ///
    /// The first node seek failure.
    pub fn seek_to_position(&mut self, offset: u64, range: u64) -> Result<()> {
        let mut mode = SeekMode::ByPosition;
        let mut point = SeekPoint {
            mask: SeekPointMask::POSITION,
            position: StreamPosition { offset: offset.min(range), range },
            ..SeekPoint::default()
        };
        if let Err(e) = self.estimate_seek_point(mode, &mut point) {
            tracing::debug!(error = %e, "seek point estimation incomplete");
        }
        self.seek(&mut mode, &mut point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_stream::MemoryInputStream;
    use crate::media::MEDIA_TYPE_ID_AUDIO_PCM;
    use crate::module::{Module, ModuleId, ModuleInfo, ProbeMatch, ProbePolicy};
    use crate::port::MediaPort;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const MOCK_MIME: &str = "audio/x-mock";

    type Log = Arc<Mutex<Vec<String>>>;

    struct Source {
        log: Log,
        media_type: MediaType,
        protocol: PortProtocol,
        remaining: u32,
        next_ms: u64,
    }

    impl MediaNode for Source {
        fn info(&self) -> MediaNodeInfo {
            MediaNodeInfo { module: "Source".into(), name: None }
        }

        fn ports(&self) -> Vec<MediaPort> {
            vec![MediaPort::output(self.protocol, [self.media_type.clone()])]
        }

        fn start(&mut self) -> Result<()> {
            self.log.lock().push("source:start".into());
            Ok(())
        }

        fn seek(&mut self, _mode: &mut SeekMode, _point: &mut SeekPoint) -> Result<()> {
            self.log.lock().push("source:seek".into());
            Ok(())
        }

        fn get_packet(&mut self, _port: &str) -> Result<MediaPacket> {
            if self.remaining == 0 {
                return Err(TuneKitError::Eos);
            }
            self.remaining -= 1;
            let mut packet = MediaPacket::from_slice(&[0; 4], self.media_type.clone());
            packet.set_time_stamp(TimeStamp::from_millis(self.next_ms));
            self.next_ms += 10;
            Ok(packet)
        }

        fn get_stream(&mut self, _port: &str) -> Result<(SharedInputStream, MediaType)> {
            let stream = SharedInputStream::new(MemoryInputStream::new(vec![1u8, 2, 3]));
            Ok((stream, self.media_type.clone()))
        }
    }

    struct Converter {
        pending: Option<MediaPacket>,
    }

    impl MediaNode for Converter {
        fn info(&self) -> MediaNodeInfo {
            MediaNodeInfo { module: "Converter".into(), name: None }
        }

        fn ports(&self) -> Vec<MediaPort> {
            vec![
                MediaPort::input(PortProtocol::Packet, [MediaType::unknown()]),
                MediaPort::output(PortProtocol::Packet, [MediaType::new(MEDIA_TYPE_ID_AUDIO_PCM)]),
            ]
        }

        fn put_packet(&mut self, _port: &str, mut packet: MediaPacket) -> Result<()> {
            packet.set_media_type(MediaType::new(MEDIA_TYPE_ID_AUDIO_PCM));
            self.pending = Some(packet);
            Ok(())
        }

        fn get_packet(&mut self, _port: &str) -> Result<MediaPacket> {
            self.pending.take().ok_or(TuneKitError::PortHasNoData)
        }
    }

    struct Sink {
        log: Log,
        protocol: PortProtocol,
        received: Arc<Mutex<Vec<TimeStamp>>>,
    }

    impl MediaNode for Sink {
        fn info(&self) -> MediaNodeInfo {
            MediaNodeInfo { module: "Sink".into(), name: None }
        }

        fn ports(&self) -> Vec<MediaPort> {
            vec![MediaPort::input(self.protocol, [MediaType::new(MEDIA_TYPE_ID_AUDIO_PCM)])]
        }

        fn deactivate(&mut self) -> Result<()> {
            self.log.lock().push("sink:deactivate".into());
            Ok(())
        }

        fn seek(&mut self, _mode: &mut SeekMode, _point: &mut SeekPoint) -> Result<()> {
            self.log.lock().push("sink:seek".into());
            Ok(())
        }

        fn check_media_type(&self, _port: &str, media_type: &MediaType) -> Result<()> {
            if media_type.id == MEDIA_TYPE_ID_AUDIO_PCM {
                Ok(())
            } else {
                Err(TuneKitError::InvalidMediaFormat)
            }
        }

        fn put_packet(&mut self, port: &str, packet: MediaPacket) -> Result<()> {
            self.check_media_type(port, packet.media_type())?;
            self.received.lock().push(packet.time_stamp());
            Ok(())
        }

        fn set_stream(
            &mut self,
            _port: &str,
            _stream: SharedInputStream,
            media_type: &MediaType,
        ) -> Result<()> {
            self.log.lock().push(format!("sink:stream:{}", media_type.id));
            Ok(())
        }
    }

    type Factory = Box<dyn Fn(&MediaNodeConstructor) -> Box<dyn MediaNode> + Send + Sync>;

    /// Matches constructors by name prefix, or nameless ones via a probe policy.
    struct TestModule {
        name: &'static str,
        prefix: Option<&'static str>,
        policy: Option<(PortProtocol, PortProtocol, Option<u32>, Option<u32>)>,
        factory: Factory,
    }

    impl Module for TestModule {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new(self.name, ModuleId::from_tag(self.name))
        }

        fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
            match (constructor.name(), self.prefix, self.policy) {
                (Some(name), Some(prefix), _) if name.starts_with(prefix) => Ok(ProbeMatch::HIGH),
                (None, _, Some((input, output, input_type, output_type))) => ProbePolicy {
                    module: self.name,
                    input_protocol: input,
                    output_protocol: output,
                    input_type,
                    output_type,
                    default_score: Some(ProbeMatch::MEDIUM),
                }
                .evaluate(constructor),
                _ => Err(TuneKitError::NotSupported),
            }
        }

        fn create_instance(
            &self,
            _core: &Core,
            constructor: &MediaNodeConstructor,
        ) -> Result<Box<dyn MediaNode>> {
            Ok((self.factory)(constructor))
        }
    }

    struct Fixture {
        stream: Stream,
        log: Log,
        received: Arc<Mutex<Vec<TimeStamp>>>,
        mock_type: MediaType,
    }

    fn fixture(
        source_protocol: PortProtocol,
        sink_protocol: PortProtocol,
        with_converter: bool,
    ) -> Fixture {
        let core = Core::new();
        let mock_id = core.registry().register_media_type(MOCK_MIME).unwrap();
        let mock_type = MediaType::new(mock_id);
        let log: Log = Arc::default();
        let received: Arc<Mutex<Vec<TimeStamp>>> = Arc::default();

        let (source_log, source_type) = (log.clone(), mock_type.clone());
        core.register_module(Arc::new(TestModule {
            name: "Source",
            prefix: Some("mock:"),
            policy: None,
            factory: Box::new(move |ctor| {
                let mut media_type = source_type.clone();
                if ctor.output_type().id == MEDIA_TYPE_ID_AUDIO_PCM {
                    media_type = MediaType::new(MEDIA_TYPE_ID_AUDIO_PCM);
                }
                Box::new(Source {
                    log: source_log.clone(),
                    media_type,
                    protocol: source_protocol,
                    remaining: 3,
                    next_ms: 0,
                })
            }),
        }))
        .unwrap();

        let (sink_log, sink_received) = (log.clone(), received.clone());
        core.register_module(Arc::new(TestModule {
            name: "Sink",
            prefix: Some("sink"),
            policy: None,
            factory: Box::new(move |_| {
                Box::new(Sink {
                    log: sink_log.clone(),
                    protocol: sink_protocol,
                    received: sink_received.clone(),
                })
            }),
        }))
        .unwrap();

        if with_converter {
            core.register_module(Arc::new(TestModule {
                name: "Converter",
                prefix: None,
                policy: Some((
                    PortProtocol::Packet,
                    PortProtocol::Packet,
                    Some(mock_id),
                    Some(MEDIA_TYPE_ID_AUDIO_PCM),
                )),
                factory: Box::new(|_| Box::new(Converter { pending: None })),
            }))
            .unwrap();
        }

        Fixture { stream: Stream::new(core), log, received, mock_type }
    }

    fn chain(stream: &Stream) -> Vec<(String, bool)> {
        stream.nodes().into_iter().map(|n| (n.node.module, n.transient)).collect()
    }

    #[test]
    fn test_pump_requires_input_and_output() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, false);
        assert!(matches!(f.stream.pump_packet(), Err(TuneKitError::Failure(_))));
        f.stream.set_input("mock:a", Some(MIME_AUDIO_PCM)).unwrap();
        assert!(matches!(f.stream.pump_packet(), Err(TuneKitError::Failure(_))));
    }

    #[test]
    fn test_set_input_rejects_bad_arguments() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, false);
        assert!(matches!(f.stream.set_input("", None), Err(TuneKitError::InvalidParameters(_))));
        assert!(matches!(
            f.stream.set_input("mock:a", Some("audio/nope")),
            Err(TuneKitError::NoSuchName(_))
        ));
        assert!(matches!(
            f.stream.set_input("http://x", None),
            Err(TuneKitError::NoMatchingModule)
        ));
        assert!(f.stream.input_node().is_none());
    }

    #[test]
    fn test_direct_delivery_and_eos() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        f.stream.set_event_listener(Some(tx));
        let input = f.stream.set_input("mock:a", Some(MIME_AUDIO_PCM)).unwrap();
        f.stream.set_output(Some("sink"), None).unwrap();
        assert_eq!(f.stream.input_name(), Some("mock:a"));

        f.stream.pump_packet().unwrap();
        let info = f.stream.node_info(input).unwrap();
        assert!(info.output.connected);
        assert_eq!(info.state, MediaNodeState::Running);

        f.stream.pump_packet().unwrap();
        f.stream.pump_packet().unwrap();
        assert!(matches!(f.stream.pump_packet(), Err(TuneKitError::Eos)));
        assert_eq!(f.received.lock().len(), 3);
        assert_eq!(f.stream.status().time_stamp, TimeStamp::from_millis(20));
        assert_eq!(f.log.lock().iter().filter(|e| *e == "source:start").count(), 1);

        let mut changes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StreamEvent::Topology { change, .. } = event {
                changes.push(change);
            }
        }
        assert_eq!(
            changes,
            vec![
                TopologyChange::NodeAdded,
                TopologyChange::NodeAdded,
                TopologyChange::NodeConnected,
            ]
        );
    }

    #[test]
    fn test_converter_is_interpolated_and_cleaned_up() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, true);
        f.stream.set_input("mock:a", None).unwrap();
        f.stream.set_output(Some("sink"), None).unwrap();

        f.stream.pump_packet().unwrap();
        assert_eq!(
            chain(&f.stream),
            vec![("Source".into(), false), ("Converter".into(), true), ("Sink".into(), false)]
        );
        assert!(f.received.lock().is_empty());

        f.stream.pump_packet().unwrap();
        assert_eq!(f.received.lock().len(), 1);
        assert!(f.stream.nodes().iter().take(2).all(|n| n.output.connected));

        f.stream.set_output(Some("sink"), None).unwrap();
        assert_eq!(chain(&f.stream), vec![("Source".into(), false), ("Sink".into(), false)]);
        assert!(f.log.lock().contains(&"sink:deactivate".to_string()));
        assert_eq!(f.stream.status().time_stamp, TimeStamp::ZERO);
    }

    #[test]
    fn test_missing_converter() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, false);
        f.stream.set_input("mock:a", None).unwrap();
        f.stream.set_output(Some("sink"), None).unwrap();
        assert!(matches!(f.stream.pump_packet(), Err(TuneKitError::StreamNoCompatibleNode)));
        assert_eq!(f.stream.nodes().len(), 2);
    }

    #[test]
    fn test_byte_streams_are_connected_directly() {
        let mut f = fixture(PortProtocol::StreamPull, PortProtocol::StreamPull, false);
        f.stream.set_input("mock:a", None).unwrap();
        f.stream.set_output(Some("sink"), None).unwrap();
        f.stream.pump_packet().unwrap();
        let expected = format!("sink:stream:{}", f.mock_type.id);
        assert!(f.log.lock().contains(&expected));
        assert!(f.stream.nodes()[0].output.connected);
        assert!(matches!(f.stream.pump_packet(), Err(TuneKitError::Failure(_))));
    }

    #[test]
    fn test_add_node_placement() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, true);
        let first = f.stream.add_node(None, Box::new(Converter { pending: None })).unwrap();
        assert_eq!(f.stream.nodes()[0].id, first);

        f.stream.set_input("mock:a", None).unwrap();
        f.stream.set_output(Some("sink"), None).unwrap();
        let middle = f.stream.add_node(None, Box::new(Converter { pending: None })).unwrap();
        let ids: Vec<NodeId> = f.stream.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids[ids.len() - 2], middle);

        let converter = Box::new(Converter { pending: None });
        let after_input = f.stream.add_node(f.stream.input_node(), converter).unwrap();
        assert_eq!(f.stream.nodes()[1].id, after_input);
        assert!(matches!(
            f.stream.add_node(Some(NodeId(999)), Box::new(Converter { pending: None })),
            Err(TuneKitError::NoSuchMediaNode)
        ));
        assert!(matches!(
            f.stream.add_node_by_name(None, "Nope"),
            Err(TuneKitError::NoMatchingModule)
        ));
    }

    #[test]
    fn test_seek_and_status() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, false);
        f.stream.set_input("mock:a", Some(MIME_AUDIO_PCM)).unwrap();
        f.stream.set_output(Some("sink"), None).unwrap();
        f.stream.set_info(&StreamInfo {
            mask: StreamInfoMask::SIZE | StreamInfoMask::DURATION,
            size: 1000,
            duration: 10_000,
            ..StreamInfo::default()
        });

        f.stream.seek_to_time(5000).unwrap();
        let status = f.stream.status();
        assert_eq!(status.time_stamp, TimeStamp::from_millis(5000));
        assert_eq!(status.position, StreamPosition { offset: 500, range: 1000 });
        let log = f.log.lock().clone();
        assert_eq!(log, vec!["sink:seek".to_string(), "source:seek".to_string()]);

        f.stream.seek_to_position(2000, 1000).unwrap();
        assert_eq!(f.stream.status().time_stamp, TimeStamp::from_millis(10_000));
    }

    #[test]
    fn test_reset_input_clears_context() {
        let mut f = fixture(PortProtocol::Packet, PortProtocol::Packet, false);
        f.stream.set_input("mock:a", None).unwrap();
        f.stream.properties().set("Tags.Title", "song");
        f.stream.set_info(&StreamInfo {
            mask: StreamInfoMask::SIZE,
            size: 42,
            ..StreamInfo::default()
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        f.stream.set_event_listener(Some(tx));
        f.stream.reset_input();

        assert!(f.stream.input_node().is_none());
        assert!(f.stream.nodes().is_empty());
        assert!(!f.stream.properties().contains("Tags.Title"));
        assert_eq!(f.stream.info().size, 0);

        let mut saw_full_update = false;
        while let Ok(event) = rx.try_recv() {
            if let StreamEvent::Info { update_mask, .. } = event {
                saw_full_update |= update_mask == StreamInfoMask::ALL;
            }
        }
        assert!(saw_full_update);
    }
}
