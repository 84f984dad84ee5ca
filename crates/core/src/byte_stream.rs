// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Byte streams exchanged over STREAM_PULL ports.
//!
//! Every implementation honors the same contract: `read` returns the number of
//! bytes read, and reports [`TuneKitError::Eos`] (never `Ok(0)` for a non-empty
//! buffer) once the logical end is reached. Transient unavailability is a
//! different condition ([`TuneKitError::PortHasNoData`]) so callers can tell a
//! stall from the end.

use crate::error::{Result, TuneKitError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// A pull-model byte source.
pub trait InputStream: Send {
    /// Reads up to `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns `Eos` when no byte can be read because the end was reached.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Moves the read position to the absolute offset `position`.
    fn seek(&mut self, position: u64) -> Result<()>;

    fn tell(&mut self) -> Result<u64>;

    /// Total size, when known.
    fn size(&mut self) -> Result<Option<u64>>;

    /// Bytes that can be read without blocking.
    fn available(&mut self) -> Result<u64>;

    /// Fills `buf` completely.
    ///
    /// # Errors
    ///
    /// Returns `Eos` if the stream ends before `buf` is full.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.read(&mut buf[filled..])?;
        }
        Ok(())
    }

    /// Skips `count` bytes forward.
    fn skip(&mut self, count: u64) -> Result<()> {
        let position = self.tell()?;
        self.seek(position + count)
    }
}

/// A cloneable, thread-safe handle to a byte stream.
///
/// Clones share the same underlying stream and read position.
#[derive(Clone)]
pub struct SharedInputStream {
    inner: Arc<Mutex<dyn InputStream>>,
}

impl std::fmt::Debug for SharedInputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInputStream").finish_non_exhaustive()
    }
}

impl SharedInputStream {
    pub fn new<S: InputStream + 'static>(stream: S) -> Self {
        Self { inner: Arc::new(Mutex::new(stream)) }
    }

    /// Runs `f` with exclusive access to the stream.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn InputStream) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    /// Whether both handles refer to the same stream.
    pub fn same_stream(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl InputStream for SharedInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.lock().read(buf)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.lock().seek(position)
    }

    fn tell(&mut self) -> Result<u64> {
        self.inner.lock().tell()
    }

    fn size(&mut self) -> Result<Option<u64>> {
        self.inner.lock().size()
    }

    fn available(&mut self) -> Result<u64> {
        self.inner.lock().available()
    }
}

/// An in-memory byte stream.
#[derive(Debug, Clone)]
pub struct MemoryInputStream {
    data: Bytes,
    position: usize,
}

impl MemoryInputStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), position: 0 }
    }
}

impl InputStream for MemoryInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.data.len().saturating_sub(self.position);
        if remaining == 0 {
            return Err(TuneKitError::Eos);
        }
        let count = remaining.min(buf.len());
        buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let position = usize::try_from(position)
            .map_err(|_| TuneKitError::InvalidParameters("seek position overflow".to_string()))?;
        if position > self.data.len() {
            return Err(TuneKitError::InvalidParameters(format!(
                "seek to {position} past end {}",
                self.data.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position as u64)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    fn available(&mut self) -> Result<u64> {
        Ok(self.data.len().saturating_sub(self.position) as u64)
    }
}

/// A byte stream over a file on disk.
#[derive(Debug)]
pub struct FileInputStream {
    file: std::fs::File,
    size: u64,
    position: u64,
}

impl FileInputStream {
    /// Opens `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchFile` if the file does not exist, `OpenFailed` otherwise.
    pub fn open(path: &str) -> Result<Self> {
        let file =
            std::fs::File::open(path).map_err(|e| TuneKitError::from_open_error(path, &e))?;
        let size = file.metadata().map_err(|e| TuneKitError::from_open_error(path, &e))?.len();
        Ok(Self { file, size, position: 0 })
    }
}

impl InputStream for FileInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.file.read(buf) {
                Ok(0) => return Err(TuneKitError::Eos),
                Ok(count) => {
                    self.position += count as u64;
                    return Ok(count);
                },
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.size))
    }

    fn available(&mut self) -> Result<u64> {
        Ok(self.size.saturating_sub(self.position))
    }
}

/// A window `[start, start + size)` of another stream, re-based at zero.
///
/// The source is shared, so the sub-stream re-positions it before every read.
#[derive(Debug, Clone)]
pub struct SubInputStream {
    source: SharedInputStream,
    start: u64,
    size: u64,
    position: u64,
}

impl SubInputStream {
    pub const fn new(source: SharedInputStream, start: u64, size: u64) -> Self {
        Self { source, start, size, position: 0 }
    }
}

impl InputStream for SubInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.size.saturating_sub(self.position);
        if remaining == 0 {
            return Err(TuneKitError::Eos);
        }
        let wanted = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let absolute = self.start + self.position;
        let count = self.source.with(|source| -> Result<usize> {
            source.seek(absolute)?;
            source.read(&mut buf[..wanted])
        })?;
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.size {
            return Err(TuneKitError::InvalidParameters(format!(
                "seek to {position} past end {}",
                self.size
            )));
        }
        self.position = position;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.size))
    }

    fn available(&mut self) -> Result<u64> {
        Ok(self.size.saturating_sub(self.position))
    }
}
