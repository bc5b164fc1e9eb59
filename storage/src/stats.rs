// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Accounting sink for a `CachedInput`. Grounded on nydus-rs's
//! `BlobcacheMetrics` (atomic counters exposed behind a small `Metric`
//! trait, bumped inline at each `entry_read`/`cache()` call site rather
//! than collected after the fact).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single atomic counter, mirroring the `inc()`/`add()` surface nydus-rs
/// exposes on its metrics fields. Wraps an `Arc` so a completion closure
/// can hold its own handle to a counter independent of the `&self`
/// lifetime of the `Stats` call that created it.
#[derive(Debug, Default, Clone)]
pub struct Metric(Arc<AtomicU64>);

impl Metric {
    pub fn add(&self, v: u64) {
        self.0.fetch_add(v, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// The accounting surface `CachedInput` drives. Kept as a trait so a
/// production implementation can fan these out to a real metrics sink
/// (Prometheus, statsd, ...) while tests use the bundled [`AtomicStats`].
pub trait Stats: Send + Sync {
    /// Called exactly once, when a top-level `CachedInput` (not a slice
    /// or clone) is opened.
    fn open(&self);

    fn cached_bytes_read(&self, n: u64);
    fn cached_bytes_written(&self, n: u64, elapsed: Duration);
    fn index_cache_bytes_read(&self, n: u64);

    /// Start an index-cache-fill accounting window. The returned closure
    /// must be invoked exactly once, whether or not the fill succeeded.
    fn index_cache_fill_start(&self) -> Box<dyn FnOnce() + Send>;

    fn blob_store_bytes_requested(&self, n: u64);
    fn direct_bytes_read(&self, n: u64, elapsed: Duration);

    /// Record a completed read of `n` bytes that logically started where
    /// the previous read of this `CachedInput` (or an ancestor it was
    /// sliced/cloned from) ended, or didn't.
    fn bytes_read(&self, last_read_position: u64, pos: u64, n: u64);

    fn seeks(&self, last_seek_position: u64, new_position: u64);
}

/// In-process `Stats` implementation backed by atomics, suitable both for
/// the crate's own tests and as a minimal production default.
#[derive(Debug, Default)]
pub struct AtomicStats {
    pub open_count: Metric,
    pub cached_bytes_read: Metric,
    pub cached_bytes_written: Metric,
    pub cached_write_nanos: Metric,
    pub index_cache_bytes_read: Metric,
    pub index_cache_fill_count: Metric,
    pub index_cache_fill_nanos: Metric,
    pub blob_store_bytes_requested: Metric,
    pub direct_bytes_read: Metric,
    pub direct_read_nanos: Metric,
    pub contiguous_bytes_read: Metric,
    pub noncontiguous_bytes_read: Metric,
    pub seeks: Metric,
}

impl AtomicStats {
    pub fn new() -> AtomicStats {
        AtomicStats::default()
    }
}

impl Stats for AtomicStats {
    fn open(&self) {
        self.open_count.inc();
    }

    fn cached_bytes_read(&self, n: u64) {
        self.cached_bytes_read.add(n);
    }

    fn cached_bytes_written(&self, n: u64, elapsed: Duration) {
        self.cached_bytes_written.add(n);
        self.cached_write_nanos.add(elapsed.as_nanos() as u64);
    }

    fn index_cache_bytes_read(&self, n: u64) {
        self.index_cache_bytes_read.add(n);
    }

    fn index_cache_fill_start(&self) -> Box<dyn FnOnce() + Send> {
        let start = Instant::now();
        let count = self.index_cache_fill_count.clone();
        let nanos = self.index_cache_fill_nanos.clone();
        Box::new(move || {
            count.inc();
            nanos.add(start.elapsed().as_nanos() as u64);
        })
    }

    fn blob_store_bytes_requested(&self, n: u64) {
        self.blob_store_bytes_requested.add(n);
    }

    fn direct_bytes_read(&self, n: u64, elapsed: Duration) {
        self.direct_bytes_read.add(n);
        self.direct_read_nanos.add(elapsed.as_nanos() as u64);
    }

    fn bytes_read(&self, last_read_position: u64, pos: u64, n: u64) {
        if last_read_position == pos {
            self.contiguous_bytes_read.add(n);
        } else {
            self.noncontiguous_bytes_read.add(n);
        }
    }

    fn seeks(&self, last_seek_position: u64, new_position: u64) {
        if last_seek_position != new_position {
            self.seeks.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_read_classifies_contiguous_vs_not() {
        let s = AtomicStats::new();
        s.bytes_read(0, 0, 100);
        s.bytes_read(100, 250, 50);
        assert_eq!(s.contiguous_bytes_read.count(), 100);
        assert_eq!(s.noncontiguous_bytes_read.count(), 50);
    }

    #[test]
    fn seeks_only_counts_actual_movement() {
        let s = AtomicStats::new();
        s.seeks(0, 0);
        s.seeks(0, 100);
        assert_eq!(s.seeks.count(), 1);
    }
}
