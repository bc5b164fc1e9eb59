// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! The shared cache's external contract: positional IO against the
//! on-disk cache channel, plus the two coordination calls `CachedInput`
//! drives its read state machine through.
//!
//! `async_trait` is used here (unlike the rest of this crate's plain
//! synchronous traits) because coordination genuinely spans an await
//! point: a caller thread may need to wait on a fill another thread is
//! already performing. Grounded on the `runtime.spawn` / `Arc<Runtime>`
//! pattern nydus-rs's newer cache layer uses for background fills
//! (`storage/src/cache/filecache/cache_entry.rs`'s `delay_persist`),
//! since the older `BlobCache::entry_read` this crate's synchronous
//! pieces are grounded on predates async Rust entirely.

use std::io;

use async_trait::async_trait;

use crate::error::CoordinatorError;
use crate::range::Range;

/// Positional IO against the shared cache's on-disk storage for one
/// logical file. Writes happen only from a cache-fetch executor thread;
/// reads may happen from any thread.
pub trait CacheChannel: Send + Sync {
    fn pread_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize>;
    fn pwrite_at(&self, pos: u64, buf: &[u8]) -> io::Result<usize>;
}

/// Consumes bytes made available by the coordinator. Implementations
/// read `len` bytes from `channel` at `channel_pos` and place them at
/// `relative_pos` within whatever destination they were constructed to
/// fill (typically a caller-owned `&mut [u8]`).
///
/// The coordinator may call this once per contiguous resident sub-range,
/// which is how a caller observes a partial fill before eviction
/// ultimately fails the read (spec §8, "eviction mid-read").
pub trait ReadInto: Send {
    fn read_into(&mut self, channel: &dyn CacheChannel, channel_pos: u64, relative_pos: u64, len: u64) -> io::Result<u64>;
}

/// Populates one contiguous unpopulated sub-range of a write range by
/// reading from the blob store (or replaying already-known bytes) and
/// positionally writing into `channel`. Called once per unpopulated
/// sub-range of the declared write range; `progress` should be invoked
/// after each positional write so a concurrent `read_if_available_or_pending`
/// can observe partial progress.
pub trait WriteFrom: Send + Sync {
    fn write_into(
        &self,
        channel: &dyn CacheChannel,
        channel_pos: u64,
        relative_pos: u64,
        len: u64,
        progress: &(dyn Fn(u64) + Sync),
    ) -> io::Result<()>;
}

/// Outcome of a coordinated read: number of bytes delivered through
/// `reader`, or the reason none were.
pub type CacheReadResult = Result<u64, CoordinatorError>;

/// The shared byte-range cache's coordination surface. A single
/// implementation is shared by every `CachedInput` reading the same
/// underlying files, and is responsible for collapsing concurrent
/// requests for overlapping ranges into at most one writer per region
/// (spec §5).
#[async_trait]
pub trait SharedCacheCoordinator: Send + Sync {
    /// If `range` is already fully resident, or a fill for it is already
    /// in flight, invoke `reader` (once fully resident, or incrementally
    /// as the in-flight fill makes progress) and return its outcome.
    /// Returns `None` if no data for `range` is resident and no fill is
    /// in flight, in which case the caller must fall through to
    /// `populate_and_read`.
    async fn read_if_available_or_pending(
        &self,
        range: Range,
        reader: &mut (dyn ReadInto + Send),
    ) -> Option<CacheReadResult>;

    /// Ensure `write_range` is resident (fetching any unpopulated
    /// sub-ranges via `writer` on the cache-fetch executor) and then
    /// deliver `read_range` (a sub-range of `write_range`) through
    /// `reader`. At most one fill per overlapping region runs at a time;
    /// concurrent callers for overlapping ranges observe the same fill.
    async fn populate_and_read(
        &self,
        write_range: Range,
        read_range: Range,
        reader: &mut (dyn ReadInto + Send),
        writer: &(dyn WriteFrom + Send + Sync),
        executor: &tokio::runtime::Handle,
    ) -> CacheReadResult;
}

/// Whether this process has finished replaying whatever recovery log or
/// local-state reconciliation gates full-size range fetches (spec §4.2).
/// An external collaborator; `CachedInput` only ever reads it.
pub trait RecoveryState: Send + Sync {
    fn is_recovery_complete(&self) -> bool;
}
