// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! TCP input - Reads a byte stream from a `tcp://host:port` address

use serde::Deserialize;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tunekit_core::byte_stream::{InputStream, SharedInputStream};
use tunekit_core::context::StreamContext;
use tunekit_core::module::{
    MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbeMatch, ProbePolicy,
};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::{Core, MediaType, Result, TuneKitError};

use super::network_stream::{BufferedNetworkStream, NetworkStreamConfig, NetworkStreamStatus};
use crate::constants::DEFAULT_TCP_CONNECT_TIMEOUT_MS;

pub const TCP_INPUT_MODULE: &str = "TcpInput";

const TCP_PREFIX: &str = "tcp://";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpInputConfig {
    pub connect_timeout_ms: u64,
    /// Buffering in front of the socket.
    pub buffer: NetworkStreamConfig,
}

impl Default for TcpInputConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_TCP_CONNECT_TIMEOUT_MS,
            buffer: NetworkStreamConfig::default(),
        }
    }
}

impl TcpInputConfig {
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or the buffer settings are invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.connect_timeout_ms == 0 {
            return Err("connect timeout must be greater than zero".to_string());
        }
        self.buffer.validate()
    }
}

/// Splits `tcp://host:port[/path]` into the socket address part.
fn parse_address(name: &str) -> Result<&str> {
    let rest = name
        .strip_prefix(TCP_PREFIX)
        .ok_or_else(|| TuneKitError::InvalidParameters(format!("'{name}' is not a tcp url")))?;
    let address = rest.split('/').next().unwrap_or(rest);
    if address.rsplit_once(':').is_none_or(|(host, port)| host.is_empty() || port.is_empty()) {
        return Err(TuneKitError::InvalidParameters(format!("'{name}' has no host:port")));
    }
    Ok(address)
}

/// Raw socket reads. Not seekable and of unknown size.
struct TcpInputStream {
    socket: TcpStream,
    position: u64,
}

impl InputStream for TcpInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let count = loop {
            match self.socket.read(buf) {
                Ok(count) => break count,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        };
        if count == 0 {
            return Err(TuneKitError::Eos);
        }
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position == self.position {
            Ok(())
        } else {
            Err(TuneKitError::NotSupported)
        }
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(None)
    }

    fn available(&mut self) -> Result<u64> {
        Ok(0)
    }
}

/// Creates [`TcpInput`] nodes for `tcp://` names.
#[derive(Debug, Default)]
pub struct TcpInputModule {
    config: TcpInputConfig,
}

impl TcpInputModule {
    pub const fn new(config: TcpInputConfig) -> Self {
        Self { config }
    }

    const fn policy() -> ProbePolicy<'static> {
        ProbePolicy {
            module: TCP_INPUT_MODULE,
            input_protocol: PortProtocol::None,
            output_protocol: PortProtocol::StreamPull,
            input_type: None,
            output_type: None,
            default_score: None,
        }
    }

    fn connect(&self, address: &str) -> Result<TcpStream> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut last_error = None;
        let addrs = address
            .to_socket_addrs()
            .map_err(|e| TuneKitError::OpenFailed(format!("{address}: {e}")))?;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_error = Some(e);
                },
            }
        }
        let reason = last_error.map_or_else(|| "no address".to_string(), |e| e.to_string());
        Err(TuneKitError::OpenFailed(format!("{address}: {reason}")))
    }
}

impl Module for TcpInputModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(TCP_INPUT_MODULE, ModuleId::from_tag(TCP_INPUT_MODULE))
            .with_property("url_scheme", TCP_PREFIX)
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        Self::policy().check_interface(constructor)?;
        match constructor.name() {
            Some(name) if name.starts_with(TCP_PREFIX) => Ok(ProbeMatch::EXACT),
            _ => Err(TuneKitError::InvalidParameters("not a tcp url".into())),
        }
    }

    fn create_instance(
        &self,
        core: &Core,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        let name = constructor
            .name()
            .ok_or_else(|| TuneKitError::InvalidParameters("tcp input needs a name".into()))?;
        let address = parse_address(name)?;
        let socket = self.connect(address)?;
        tracing::info!(address, "tcp input connected");

        let media_type = if constructor.output_type().is_unknown() {
            core.registry()
                .media_type_id_for_path(name)
                .map_or_else(|_| MediaType::unknown(), MediaType::new)
        } else {
            constructor.output_type().clone()
        };

        let stream =
            BufferedNetworkStream::new(
                TcpInputStream { socket, position: 0 },
                self.config.buffer.clone(),
            );
        Ok(Box::new(TcpInput {
            url: name.to_string(),
            status: stream.status(),
            buffer_size: self.config.buffer.buffer_size,
            stream: SharedInputStream::new(stream),
            media_type,
        }))
    }
}

/// A node with a single STREAM_PULL output fed by a TCP connection.
pub struct TcpInput {
    url: String,
    stream: SharedInputStream,
    status: NetworkStreamStatus,
    buffer_size: usize,
    media_type: MediaType,
}

impl MediaNode for TcpInput {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo { module: TCP_INPUT_MODULE.to_string(), name: Some(self.url.clone()) }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![MediaPort::output(PortProtocol::StreamPull, [self.media_type.clone()])]
    }

    fn activate(&mut self, context: &StreamContext) -> Result<()> {
        self.status.attach(Some(context.properties().clone()), self.buffer_size);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.status.attach(None, self.buffer_size);
        Ok(())
    }

    fn get_stream(&mut self, _port: &str) -> Result<(SharedInputStream, MediaType)> {
        Ok((self.stream.clone(), self.media_type.clone()))
    }
}
