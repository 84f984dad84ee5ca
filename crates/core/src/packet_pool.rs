// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Byte buffer pooling for media packets.
//!
//! The pool is intentionally simple:
//! - fixed size buckets (by capacity)
//! - bounded buffers per bucket
//! - [`PooledBuffer`] returns its storage to the pool on drop
//!
//! Every buffer handed out is counted until it is dropped, so
//! [`PoolStats::outstanding`] doubles as a packet leak detector.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Default bucket capacities, sized for typical parser and packetizer payloads.
pub const DEFAULT_BUCKET_SIZES: &[usize] = &[1024, 4096, 8192, 16_384, 65_536];

/// Default number of idle buffers kept per bucket.
pub const DEFAULT_MAX_PER_BUCKET: usize = 16;

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    /// Buffers currently held by live packets.
    pub outstanding: u64,
    pub buckets: Vec<BucketStats>,
}

#[derive(Debug, Clone)]
pub struct BucketStats {
    pub bucket_size: usize,
    pub available: usize,
    pub max_per_bucket: usize,
}

struct PoolInner {
    bucket_sizes: Vec<usize>,
    max_per_bucket: usize,
    buckets: Vec<Vec<Vec<u8>>>,
    hits: u64,
    misses: u64,
    outstanding: u64,
}

impl PoolInner {
    fn bucket_index_for_min_len(&self, min_len: usize) -> Option<usize> {
        self.bucket_sizes.iter().position(|&size| size >= min_len)
    }

    fn release(&mut self, bucket_idx: Option<usize>, mut data: Vec<u8>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let Some(idx) = bucket_idx else {
            return;
        };
        if self.buckets[idx].len() < self.max_per_bucket {
            data.clear();
            data.resize(self.bucket_sizes[idx], 0);
            self.buckets[idx].push(data);
        }
    }
}

/// Thread-safe pool of packet payload buffers.
#[derive(Clone)]
pub struct PacketPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_SIZES.to_vec(), DEFAULT_MAX_PER_BUCKET)
    }
}

impl std::fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("PacketPool")
            .field("hits", &stats.hits)
            .field("misses", &stats.misses)
            .field("outstanding", &stats.outstanding)
            .finish_non_exhaustive()
    }
}

impl PacketPool {
    /// Create a pool with fixed buckets. Sizes are sorted and deduplicated.
    pub fn with_buckets(mut bucket_sizes: Vec<usize>, max_per_bucket: usize) -> Self {
        bucket_sizes.sort_unstable();
        bucket_sizes.dedup();
        let buckets = (0..bucket_sizes.len()).map(|_| Vec::new()).collect();
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                bucket_sizes,
                max_per_bucket,
                buckets,
                hits: 0,
                misses: 0,
                outstanding: 0,
            })),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let guard = self.inner.lock();
        PoolStats {
            hits: guard.hits,
            misses: guard.misses,
            outstanding: guard.outstanding,
            buckets: guard
                .bucket_sizes
                .iter()
                .enumerate()
                .map(|(idx, &bucket_size)| BucketStats {
                    bucket_size,
                    available: guard.buckets[idx].len(),
                    max_per_bucket: guard.max_per_bucket,
                })
                .collect(),
        }
    }

    /// Get zeroed storage with a capacity of at least `min_len` bytes.
    ///
    /// Requests larger than every bucket get an exact-size buffer that is
    /// counted but not recycled.
    pub fn get(&self, min_len: usize) -> PooledBuffer {
        let mut guard = self.inner.lock();
        guard.outstanding += 1;
        let handle = Arc::downgrade(&self.inner);
        let Some(bucket_idx) = guard.bucket_index_for_min_len(min_len) else {
            guard.misses += 1;
            drop(guard);
            return PooledBuffer { data: vec![0; min_len], pool: handle, bucket_idx: None };
        };
        let bucket_size = guard.bucket_sizes[bucket_idx];
        let data = if let Some(buf) = guard.buckets[bucket_idx].pop() {
            guard.hits += 1;
            buf
        } else {
            guard.misses += 1;
            vec![0; bucket_size]
        };
        drop(guard);
        PooledBuffer { data, pool: handle, bucket_idx: Some(bucket_idx) }
    }
}

/// Storage owned by exactly one packet. Returned to its pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Weak<Mutex<PoolInner>>,
    bucket_idx: Option<usize>,
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.data.len())
            .field("pooled", &self.bucket_idx.is_some())
            .finish_non_exhaustive()
    }
}

impl PooledBuffer {
    /// A buffer that is not tracked by any pool.
    pub fn detached(capacity: usize) -> Self {
        Self { data: vec![0; capacity], pool: Weak::new(), bucket_idx: None }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Grow the storage to at least `capacity` bytes, keeping the first `keep` bytes.
    pub fn grow(&mut self, capacity: usize, keep: usize) {
        if capacity <= self.data.len() {
            return;
        }
        let mut data = vec![0; capacity];
        let keep = keep.min(self.data.len());
        data[..keep].copy_from_slice(&self.data[..keep]);
        // the old storage goes back to its bucket, the new one is never pooled
        let old = std::mem::replace(&mut self.data, data);
        if let Some(inner) = self.pool.upgrade() {
            let mut guard = inner.lock();
            guard.outstanding += 1;
            guard.release(self.bucket_idx.take(), old);
        } else {
            self.bucket_idx = None;
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let Some(inner) = self.pool.upgrade() else {
            return;
        };
        let data = std::mem::take(&mut self.data);
        inner.lock().release(self.bucket_idx, data);
    }
}
