// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for TuneKit.
//!
//! Every fallible operation in the framework returns a [`TuneKitError`]. The
//! variants are grouped by kind so callers can decide between retrying,
//! trying another node, or giving up:
//!
//! - negotiation failures ([`TuneKitError::InvalidMediaFormat`],
//!   [`TuneKitError::NoMatchingModule`], ...) are recoverable by adjusting the
//!   request or trying another module;
//! - [`TuneKitError::Eos`] is the normal end of a source, not a failure;
//! - [`TuneKitError::PortHasNoData`] is transient and must be retried.

use thiserror::Error;

/// Main error type for TuneKit operations.
#[derive(Debug, Error)]
pub enum TuneKitError {
    /// Allocation failure. Fatal to the operation in progress.
    #[error("out of memory")]
    OutOfMemory,

    /// Caller contract violation. Returned before any side effect.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Payload or negotiated format does not match what the node accepts.
    #[error("invalid media format")]
    InvalidMediaFormat,

    /// Media type id is not the one the node expects.
    #[error("invalid media type")]
    InvalidMediaType,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No registered module accepted a construction request.
    #[error("no matching module")]
    NoMatchingModule,

    /// A node or port does not implement the requested interface.
    #[error("invalid interface: {0}")]
    InvalidInterface(String),

    #[error("no such port: {0}")]
    NoSuchPort(String),

    #[error("no such media node")]
    NoSuchMediaNode,

    /// Index or key lookup past the end of a collection.
    #[error("no such item")]
    NoSuchItem,

    #[error("no such name: {0}")]
    NoSuchName(String),

    /// End of stream. A normal terminal signal until the next seek or reset.
    #[error("end of stream")]
    Eos,

    /// Data is temporarily unavailable; the caller should retry later.
    #[error("port has no data")]
    PortHasNoData,

    /// The port has no byte stream to hand out yet.
    #[error("port has no stream")]
    PortHasNoStream,

    #[error("device busy")]
    DeviceBusy,

    #[error("no such device: {0}")]
    NoSuchDevice(String),

    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("no such file: {0}")]
    NoSuchFile(String),

    /// Content protection failure. The node must fail cleanly.
    #[error("crypto failure")]
    CryptoFailure,

    #[error("no media key: {0}")]
    NoMediaKey(String),

    /// Operation not permitted in the current state (e.g. after shutdown).
    #[error("invalid state")]
    InvalidState,

    #[error("not implemented")]
    NotImplemented,

    #[error("not supported")]
    NotSupported,

    /// Stream wiring could not find any node to bridge two ports.
    #[error("no compatible node for stream connection")]
    StreamNoCompatibleNode,

    #[error("operation timed out")]
    Timeout,

    /// Broken internal invariant. Not retried.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("failure: {0}")]
    Failure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TuneKitError {
    /// Maps an I/O error raised while opening `path` to the closest framework error.
    pub fn from_open_error(path: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NoSuchFile(path.to_string()),
            _ => Self::OpenFailed(format!("{path}: {err}")),
        }
    }

    /// Whether this error is the end-of-stream signal.
    pub const fn is_eos(&self) -> bool {
        matches!(self, Self::Eos)
    }

    /// Short stable identifier, used for logging and metrics labels.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory => "out_of_memory",
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::InvalidMediaFormat => "invalid_media_format",
            Self::InvalidMediaType => "invalid_media_type",
            Self::UnsupportedCodec(_) => "unsupported_codec",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::NoMatchingModule => "no_matching_module",
            Self::InvalidInterface(_) => "invalid_interface",
            Self::NoSuchPort(_) => "no_such_port",
            Self::NoSuchMediaNode => "no_such_media_node",
            Self::NoSuchItem => "no_such_item",
            Self::NoSuchName(_) => "no_such_name",
            Self::Eos => "eos",
            Self::PortHasNoData => "port_has_no_data",
            Self::PortHasNoStream => "port_has_no_stream",
            Self::DeviceBusy => "device_busy",
            Self::NoSuchDevice(_) => "no_such_device",
            Self::OpenFailed(_) => "open_failed",
            Self::NoSuchFile(_) => "no_such_file",
            Self::CryptoFailure => "crypto_failure",
            Self::NoMediaKey(_) => "no_media_key",
            Self::InvalidState => "invalid_state",
            Self::NotImplemented => "not_implemented",
            Self::NotSupported => "not_supported",
            Self::StreamNoCompatibleNode => "stream_no_compatible_node",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
            Self::Failure(_) => "failure",
            Self::Io(_) => "io",
        }
    }
}

/// Convenience type alias for Results using `TuneKitError`.
pub type Result<T> = std::result::Result<T, TuneKitError>;

impl From<TuneKitError> for String {
    fn from(err: TuneKitError) -> Self {
        err.to_string()
    }
}

// Generic string errors default to Failure
impl From<String> for TuneKitError {
    fn from(s: String) -> Self {
        Self::Failure(s)
    }
}

impl From<&str> for TuneKitError {
    fn from(s: &str) -> Self {
        Self::Failure(s.to_string())
    }
}
