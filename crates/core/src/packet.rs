// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media packets: timestamped payload buffers flowing between PACKET ports.
//!
//! A packet has a single owner. `get_packet` moves it from producer to
//! consumer, and dropping it releases its buffer exactly once.

use crate::error::{Result, TuneKitError};
use crate::media::MediaType;
use crate::packet_pool::PooledBuffer;
use crate::time::TimeStamp;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Stream framing flags carried by a packet.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PacketFlags: u32 {
        const START_OF_STREAM = 0x01;
        const END_OF_STREAM = 0x02;
        const START_OF_DISCONTINUITY = 0x04;
        const END_OF_DISCONTINUITY = 0x08;
    }
}

/// A media payload with its type, timing and framing flags.
///
/// The payload is the window `[offset, offset + size)` of the underlying
/// buffer. The window never extends past the buffer capacity.
#[derive(Debug)]
pub struct MediaPacket {
    buffer: PooledBuffer,
    offset: usize,
    size: usize,
    media_type: MediaType,
    time_stamp: TimeStamp,
    duration: TimeStamp,
    flags: PacketFlags,
}

impl MediaPacket {
    /// Wraps a buffer with an empty payload window.
    pub fn new(buffer: PooledBuffer, media_type: MediaType) -> Self {
        Self {
            buffer,
            offset: 0,
            size: 0,
            media_type,
            time_stamp: TimeStamp::ZERO,
            duration: TimeStamp::ZERO,
            flags: PacketFlags::empty(),
        }
    }

    /// An untracked packet holding a copy of `payload`.
    pub fn from_slice(payload: &[u8], media_type: MediaType) -> Self {
        let mut buffer = PooledBuffer::detached(payload.len());
        buffer.as_mut_slice().copy_from_slice(payload);
        let mut packet = Self::new(buffer, media_type);
        packet.size = payload.len();
        packet
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn set_media_type(&mut self, media_type: MediaType) {
        self.media_type = media_type;
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_slice()[self.offset..self.offset + self.size]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = self.offset + self.size;
        &mut self.buffer.as_mut_slice()[self.offset..end]
    }

    /// The writable area from the payload offset to the end of the buffer.
    pub fn payload_buffer_mut(&mut self) -> &mut [u8] {
        let offset = self.offset;
        &mut self.buffer.as_mut_slice()[offset..]
    }

    pub const fn payload_size(&self) -> usize {
        self.size
    }

    pub const fn payload_offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Sets the payload size.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if `offset + size` exceeds the capacity.
    pub fn set_payload_size(&mut self, size: usize) -> Result<()> {
        if self.offset + size > self.capacity() {
            return Err(TuneKitError::InvalidParameters(format!(
                "payload size {size} at offset {} exceeds capacity {}",
                self.offset,
                self.capacity()
            )));
        }
        self.size = size;
        Ok(())
    }

    /// Moves the start of the payload window, shrinking the size accordingly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if the offset lies past the end of the current payload.
    pub fn set_payload_offset(&mut self, offset: usize) -> Result<()> {
        let end = self.offset + self.size;
        if offset > end {
            return Err(TuneKitError::InvalidParameters(format!(
                "payload offset {offset} beyond payload end {end}"
            )));
        }
        self.size = end - offset;
        self.offset = offset;
        Ok(())
    }

    /// Ensures the buffer can hold at least `capacity` bytes past the current offset.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        let needed = self.offset + capacity;
        self.buffer.grow(needed, self.offset + self.size);
    }

    /// Replaces the payload with a copy of `data`, growing the buffer when needed.
    pub fn set_payload(&mut self, data: &[u8]) {
        self.ensure_capacity(data.len());
        let offset = self.offset;
        self.buffer.as_mut_slice()[offset..offset + data.len()].copy_from_slice(data);
        self.size = data.len();
    }

    pub const fn time_stamp(&self) -> TimeStamp {
        self.time_stamp
    }

    pub fn set_time_stamp(&mut self, time_stamp: TimeStamp) {
        self.time_stamp = time_stamp;
    }

    pub const fn duration(&self) -> TimeStamp {
        self.duration
    }

    pub fn set_duration(&mut self, duration: TimeStamp) {
        self.duration = duration;
    }

    pub const fn flags(&self) -> PacketFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: PacketFlags) {
        self.flags |= flags;
    }

    pub fn clear_flags(&mut self, flags: PacketFlags) {
        self.flags &= !flags;
    }

    /// True for the size-0 END_OF_STREAM drain marker.
    pub const fn is_drain_marker(&self) -> bool {
        self.size == 0 && self.flags.contains(PacketFlags::END_OF_STREAM)
    }
}
