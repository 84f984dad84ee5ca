// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Buffered network stream
//!
//! Puts a bounded buffer in front of a slow or remote [`InputStream`].
//! Reads are served from the buffer, which is refilled when it runs dry or
//! when the source reports data ready. Short forward seeks are turned into
//! reads, longer ones go to the source and drop the buffer.
//!
//! Buffer status is published on the stream property bag:
//! [`NETWORK_STREAM_BUFFER_SIZE_PROPERTY`] once attached,
//! [`NETWORK_STREAM_BUFFER_FULLNESS_PROPERTY`] at most once per
//! notification interval, and [`NETWORK_STREAM_EOS_REASON_PROPERTY`]
//! whenever the stream ends or is repositioned.

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tunekit_core::byte_stream::InputStream;
use tunekit_core::properties::{Properties, PropertyValue};
use tunekit_core::{Result, TuneKitError};

use crate::constants::{
    DEFAULT_NETWORK_BUFFER_SIZE, DEFAULT_NETWORK_MIN_BUFFER_FULLNESS,
    DEFAULT_SEEK_AS_READ_THRESHOLD, NETWORK_STREAM_BUFFER_FULLNESS_PROPERTY,
    NETWORK_STREAM_BUFFER_SIZE_PROPERTY, NETWORK_STREAM_EOS_REASON_PROPERTY,
    NETWORK_STREAM_NOTIFICATION_INTERVAL_MS,
};

const SEEK_AS_READ_CHUNK: usize = 256;

/// Configuration for a [`BufferedNetworkStream`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkStreamConfig {
    /// Buffer capacity in bytes.
    pub buffer_size: usize,
    /// Bytes to buffer before serving a read. 0 serves whatever is there.
    pub min_buffer_fullness: usize,
    /// Forward seeks up to this many bytes are done by reading.
    pub seek_as_read_threshold: u64,
    pub notification_interval_ms: u64,
}

impl Default for NetworkStreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_NETWORK_BUFFER_SIZE,
            min_buffer_fullness: DEFAULT_NETWORK_MIN_BUFFER_FULLNESS,
            seek_as_read_threshold: DEFAULT_SEEK_AS_READ_THRESHOLD,
            notification_interval_ms: NETWORK_STREAM_NOTIFICATION_INTERVAL_MS,
        }
    }
}

impl NetworkStreamConfig {
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or the minimum fullness exceeds it.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.buffer_size == 0 {
            return Err("network buffer size must be greater than zero".to_string());
        }
        if self.min_buffer_fullness > self.buffer_size {
            return Err(format!(
                "minimum buffer fullness {} exceeds the buffer size {}",
                self.min_buffer_fullness, self.buffer_size
            ));
        }
        Ok(())
    }
}

/// Where buffer status goes. Cloned into the node owning the stream so it
/// can attach the stream to a property bag once it is activated.
#[derive(Clone, Default)]
pub struct NetworkStreamStatus {
    properties: Arc<Mutex<Option<Properties>>>,
}

impl std::fmt::Debug for NetworkStreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStreamStatus")
            .field("attached", &self.properties.lock().is_some())
            .finish()
    }
}

impl NetworkStreamStatus {
    /// Starts publishing into `properties`, or stops with `None`.
    pub fn attach(&self, properties: Option<Properties>, buffer_size: usize) {
        if let Some(properties) = &properties {
            properties.set(
                NETWORK_STREAM_BUFFER_SIZE_PROPERTY,
                i64::try_from(buffer_size).unwrap_or(i64::MAX),
            );
            properties.set(NETWORK_STREAM_EOS_REASON_PROPERTY, "");
        }
        *self.properties.lock() = properties;
    }

    fn publish(&self, name: &str, value: impl Into<PropertyValue>) {
        if let Some(properties) = self.properties.lock().as_ref() {
            properties.set(name, value);
        }
    }
}

#[derive(Debug)]
enum EosCause {
    End,
    Error { code: &'static str, message: String },
}

impl EosCause {
    const fn code(&self) -> &'static str {
        match self {
            Self::End => "eos",
            Self::Error { code, .. } => code,
        }
    }

    fn to_error(&self) -> TuneKitError {
        match self {
            Self::End => TuneKitError::Eos,
            Self::Error { message, .. } => TuneKitError::Failure(message.clone()),
        }
    }
}

/// An [`InputStream`] with a read-ahead buffer.
pub struct BufferedNetworkStream {
    source: Box<dyn InputStream>,
    config: NetworkStreamConfig,
    buffer: BytesMut,
    position: u64,
    source_size: Option<u64>,
    eos: Option<EosCause>,
    status: NetworkStreamStatus,
    last_notification: Option<Instant>,
}

impl std::fmt::Debug for BufferedNetworkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedNetworkStream")
            .field("position", &self.position)
            .field("buffered", &self.buffer.len())
            .field("eos", &self.eos)
            .finish_non_exhaustive()
    }
}

impl BufferedNetworkStream {
    pub fn new<S: InputStream + 'static>(source: S, config: NetworkStreamConfig) -> Self {
        let mut source: Box<dyn InputStream> = Box::new(source);
        let source_size = source.size().ok().flatten().filter(|size| *size != 0);
        let buffer = BytesMut::with_capacity(config.buffer_size);
        Self {
            source,
            config,
            buffer,
            position: 0,
            source_size,
            eos: None,
            status: NetworkStreamStatus::default(),
            last_notification: None,
        }
    }

    /// Handle used to attach the stream to a property bag.
    pub fn status(&self) -> NetworkStreamStatus {
        self.status.clone()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn set_eos(&mut self, cause: EosCause) {
        tracing::debug!(position = self.position, cause = cause.code(), "network stream ended");
        self.status.publish(NETWORK_STREAM_EOS_REASON_PROPERTY, cause.code());
        self.eos = Some(cause);
    }

    fn fill_buffer(&mut self) {
        let space = self.config.buffer_size.saturating_sub(self.buffer.len());
        if space == 0 {
            return;
        }
        let start = self.buffer.len();
        self.buffer.resize(start + space, 0);
        let result = self.source.read(&mut self.buffer[start..]);
        let read = *result.as_ref().unwrap_or(&0);
        self.buffer.truncate(start + read);

        match result {
            Ok(count) => {
                tracing::trace!(count, requested = space, "filled network buffer");
                let buffered_end = self.position + self.buffer.len() as u64;
                if self.source_size.is_some_and(|size| buffered_end >= size) {
                    self.set_eos(EosCause::End);
                }
            },
            Err(TuneKitError::Eos) => self.set_eos(EosCause::End),
            Err(e) => {
                tracing::debug!(error = %e, "network source read failed");
                self.set_eos(EosCause::Error { code: e.code(), message: e.to_string() });
            },
        }
    }

    fn notify_fullness(&mut self) {
        let interval = Duration::from_millis(self.config.notification_interval_ms);
        let now = Instant::now();
        if self.last_notification.is_none_or(|last| now.duration_since(last) >= interval) {
            self.last_notification = Some(now);
            let fullness = i64::try_from(self.buffer.len()).unwrap_or(i64::MAX);
            self.status.publish(NETWORK_STREAM_BUFFER_FULLNESS_PROPERTY, fullness);
        }
    }

    fn seek_as_read(&mut self, mut remaining: u64) -> Result<()> {
        let mut scratch = [0u8; SEEK_AS_READ_CHUNK];
        while remaining > 0 {
            let chunk = usize::try_from(remaining)
                .map_or(SEEK_AS_READ_CHUNK, |r| r.min(SEEK_AS_READ_CHUNK));
            let count = self.read(&mut scratch[..chunk])?;
            if count == 0 {
                return Err(TuneKitError::Eos);
            }
            remaining -= count as u64;
        }
        Ok(())
    }
}

impl InputStream for BufferedNetworkStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let min_fullness = self.config.min_buffer_fullness.min(self.config.buffer_size);
        while self.eos.is_none() && self.buffer.len() < min_fullness {
            tracing::trace!(
                buffered = self.buffer.len(),
                min_fullness,
                "waiting for buffer fullness"
            );
            self.fill_buffer();
        }

        let source_available = self.source.available().unwrap_or(0);
        if self.eos.is_none() && (self.buffer.is_empty() || source_available > 0) {
            self.fill_buffer();
        }

        let count = self.buffer.len().min(buf.len());
        if count > 0 {
            buf[..count].copy_from_slice(&self.buffer[..count]);
            self.buffer.advance(count);
            self.position += count as u64;
        }
        self.notify_fullness();

        match &self.eos {
            Some(cause) if count == 0 => Err(cause.to_error()),
            _ => Ok(count),
        }
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position == self.position {
            if position == 0 {
                // touch the source so callers probing for seekability get a real answer
                let current = self.source.tell()?;
                return self.source.seek(current);
            }
            return Ok(());
        }

        let buffered = self.buffer.len() as u64;
        if position > self.position && position - self.position < buffered {
            self.buffer.advance(usize::try_from(position - self.position).unwrap_or(0));
            self.position = position;
            return Ok(());
        }

        self.eos = None;
        if position > self.position
            && position - self.position <= self.config.seek_as_read_threshold
        {
            tracing::debug!(distance = position - self.position, "seeking by reading");
            self.seek_as_read(position - self.position)?;
        } else {
            tracing::debug!(from = self.position, to = position, "seeking network source");
            self.source.seek(position)?;
            self.buffer.clear();
            self.position = position;
        }
        self.status.publish(NETWORK_STREAM_EOS_REASON_PROPERTY, "");
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        self.source.size()
    }

    fn available(&mut self) -> Result<u64> {
        let from_source = self.source.available().unwrap_or(0);
        Ok(from_source + self.buffer.len() as u64)
    }
}
