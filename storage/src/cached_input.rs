// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! The read state machine sitting between a search engine's index-input
//! abstraction and the shared byte-range cache: footer shortcut, disk
//! fast path, header-cache path, blob-store miss path, and the direct
//! eviction fallback, in that order.
//!
//! Grounded on nydus-rs's `BlobCache::entry_read` (`rafs/src/storage/cache/blobcache.rs`),
//! which the same way tries a fast resident-chunk path first and falls
//! back to a decompress-and-validate path, and on `FileCacheEntry`'s
//! `delay_persist` (`Chasing1020-nydus`'s `storage/src/cache/filecache/cache_entry.rs`)
//! for driving a background fill from a caller's read.

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use log::warn;

use crate::blob_source::BlobSource;
use crate::config::CacheRangeConfig;
use crate::coordinator::{
    CacheChannel, CacheReadResult, RecoveryState, ReadInto, SharedCacheCoordinator, WriteFrom,
};
use crate::error::{CoordinatorError, Error, Result};
use crate::file_info::FileInfo;
use crate::footer;
use crate::header_cache::{HeaderCacheAdapter, HeaderCacheLookup};
use crate::io_context::IoContext;
use crate::range::Range;
use crate::range_math;
use crate::stats::Stats;

/// Bytes moved per positional read/write call while replaying a fill or
/// serving the direct fallback, matching the `COPY_BUFFER_SIZE` external
/// interface constant (8 KiB).
const COPY_BUFFER: usize = 8192;

/// State shared, unchanged, by a `CachedInput` and every slice or clone
/// derived from it.
struct Shared {
    file_info: Arc<FileInfo>,
    stats: Arc<dyn Stats>,
    coordinator: Arc<dyn SharedCacheCoordinator>,
    header_cache: Arc<dyn HeaderCacheAdapter>,
    blob_source: Arc<dyn BlobSource>,
    recovery: Arc<dyn RecoveryState>,
    default_range_size: u64,
    recovery_range_size: u64,
    header_cache_blob_size: u64,
    executor: tokio::runtime::Handle,
}

/// A single read cursor over a (possibly sliced) view of a file, backed
/// by the shared cache, the header cache, and the blob store.
///
/// Cloning and slicing are shallow: both share the same `Shared` handle,
/// so they observe the same cache contents and feed the same stats sink.
pub struct CachedInput {
    shared: Arc<Shared>,
    io_context: IoContext,
    /// Logical start of this view within the underlying file.
    offset: u64,
    /// Length of this view.
    length: u64,
    /// False only for the view returned by `open`; true for any slice or
    /// clone derived from it. The footer shortcut only applies to the
    /// unsliced, unseeked top-level view (spec §4.6 step 1).
    is_clone: bool,
    file_pointer: u64,
    last_read_position: u64,
    last_seek_position: u64,
}

/// Parameters needed to open a fresh top-level `CachedInput`.
pub struct OpenParams {
    pub file_info: Arc<FileInfo>,
    pub stats: Arc<dyn Stats>,
    pub coordinator: Arc<dyn SharedCacheCoordinator>,
    pub header_cache: Arc<dyn HeaderCacheAdapter>,
    pub blob_source: Arc<dyn BlobSource>,
    pub recovery: Arc<dyn RecoveryState>,
    pub default_range_size: u64,
    pub recovery_range_size: u64,
    pub header_cache_blob_size: u64,
    pub io_context: IoContext,
    pub executor: tokio::runtime::Handle,
}

impl OpenParams {
    /// Builds `OpenParams` with the range-sizing knobs drawn from a
    /// `CacheRangeConfig`, defaulting to `IoContext::Normal`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_info: Arc<FileInfo>,
        stats: Arc<dyn Stats>,
        coordinator: Arc<dyn SharedCacheCoordinator>,
        header_cache: Arc<dyn HeaderCacheAdapter>,
        blob_source: Arc<dyn BlobSource>,
        recovery: Arc<dyn RecoveryState>,
        config: &CacheRangeConfig,
        executor: tokio::runtime::Handle,
    ) -> OpenParams {
        OpenParams {
            file_info,
            stats,
            coordinator,
            header_cache,
            blob_source,
            recovery,
            default_range_size: config.default_range_size,
            recovery_range_size: config.recovery_range_size,
            header_cache_blob_size: config.header_cache_blob_size,
            io_context: IoContext::Normal,
            executor,
        }
    }
}

/// Distinguishes "the cache told us the region was evicted" (eligible for
/// the direct-read fallback) from every other failure (not eligible).
enum Classified {
    Evicted { already_written: u64 },
    Other(anyhow::Error),
}

impl CachedInput {
    pub fn open(params: OpenParams) -> CachedInput {
        params.stats.open();
        let length = params.file_info.length();
        let shared = Shared {
            file_info: params.file_info,
            stats: params.stats,
            coordinator: params.coordinator,
            header_cache: params.header_cache,
            blob_source: params.blob_source,
            recovery: params.recovery,
            default_range_size: params.default_range_size,
            recovery_range_size: params.recovery_range_size,
            header_cache_blob_size: params.header_cache_blob_size,
            executor: params.executor,
        };
        let io_context = params.io_context;
        CachedInput {
            shared: Arc::new(shared),
            io_context,
            offset: 0,
            length,
            is_clone: false,
            file_pointer: 0,
            last_read_position: 0,
            last_seek_position: 0,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn file_pointer(&self) -> u64 {
        self.file_pointer
    }

    /// Releases no external state; `CachedInput` owns nothing that
    /// outlives the process beyond what `Shared` already shares with its
    /// clones and slices.
    pub fn close(&self) {}

    /// A shallow copy sharing this view's cursor position. `isClone` is
    /// set on the result, disabling the footer shortcut for it.
    pub fn clone_input(&self) -> CachedInput {
        CachedInput {
            shared: self.shared.clone(),
            io_context: self.io_context,
            offset: self.offset,
            length: self.length,
            is_clone: true,
            file_pointer: self.file_pointer,
            last_read_position: self.last_read_position,
            last_seek_position: self.last_seek_position,
        }
    }

    /// A view over `[o, o + l)` of this view, positioned at its own
    /// offset 0. Fails if the requested window falls outside this view.
    pub fn slice(&self, o: u64, l: u64) -> Result<CachedInput> {
        if o.checked_add(l).map(|end| end > self.length).unwrap_or(true) {
            return Err(Error::InvalidPosition {
                pos: o,
                len: self.length,
            });
        }
        Ok(CachedInput {
            shared: self.shared.clone(),
            io_context: self.io_context,
            offset: self.offset + o,
            length: l,
            is_clone: true,
            file_pointer: 0,
            last_read_position: 0,
            last_seek_position: 0,
        })
    }

    /// Move the read cursor to logical position `p` within this view.
    /// Seeking exactly to `length` is legal; a subsequent non-zero read
    /// fails with `Error::Eof`.
    pub fn seek_internal(&mut self, p: i64) -> Result<()> {
        if p < 0 {
            return Err(Error::InvalidSeek(p));
        }
        let p = p as u64;
        if p > self.length {
            return Err(Error::Eof);
        }
        let absolute = p + self.offset;
        self.shared.stats.seeks(self.last_seek_position, absolute);
        self.last_seek_position = absolute;
        self.file_pointer = p;
        Ok(())
    }

    /// Range size a blob-store miss should fetch, per the active IO
    /// context and recovery state (spec §4.2).
    fn range_size(&self) -> u64 {
        match self.io_context {
            IoContext::Warming => self.shared.file_info.part_size(),
            IoContext::Normal => {
                if self.shared.recovery.is_recovery_complete() {
                    self.shared.default_range_size
                } else {
                    self.shared.recovery_range_size
                }
            }
        }
    }

    /// Fill `buf` starting at the current cursor, advancing it by
    /// `buf.len()` bytes on success.
    pub async fn read_internal(&mut self, buf: &mut [u8]) -> Result<()> {
        let length = buf.len() as u64;
        if length == 0 {
            return Ok(());
        }
        if matches!(self.io_context, IoContext::Warming) {
            return Err(Error::InvalidContext);
        }
        if self.file_pointer + length > self.length {
            return Err(Error::Eof);
        }

        let pos = self.file_pointer + self.offset;
        let file_info = self.shared.file_info.clone();

        // Step 1: footer shortcut. Only for the unsliced top-level view,
        // and only for a read of exactly the footer reading exactly its
        // trailing bytes.
        if !self.is_clone
            && length == footer::FOOTER_LENGTH
            && pos + footer::FOOTER_LENGTH == file_info.length()
        {
            if let Some(checksum) = file_info.checksum() {
                if let Some(bytes) = footer::synthesize_footer(checksum) {
                    buf.copy_from_slice(&bytes);
                    self.commit(pos, length);
                    return Ok(());
                }
            }
        }

        match self.read_via_cache(buf, pos, length).await {
            Ok(()) => {
                self.commit(pos, length);
                Ok(())
            }
            Err(Classified::Evicted { already_written }) => {
                self.direct_read_fallback(buf, pos, already_written).await?;
                self.commit(pos, length);
                Ok(())
            }
            Err(Classified::Other(e)) => Err(Error::CacheReadFailed(e)),
        }
    }

    /// Steps 2 through 4: the disk fast path, the header-cache path, and
    /// the blob-store miss path, in that order.
    async fn read_via_cache(&self, buf: &mut [u8], pos: u64, length: u64) -> std::result::Result<(), Classified> {
        // Step 2: disk fast path.
        {
            let range = Range::new(pos, pos + length);
            let mut reader = BufReadInto::new(&mut *buf, pos);
            if let Some(result) = self.shared.coordinator.read_if_available_or_pending(range, &mut reader).await {
                return match result {
                    Ok(n) => {
                        self.shared.stats.cached_bytes_read(n);
                        Ok(())
                    }
                    Err(CoordinatorError::Evicted) => Err(Classified::Evicted {
                        already_written: reader.written(),
                    }),
                    Err(CoordinatorError::Io(e)) => Err(Classified::Other(e.into())),
                };
            }
        }

        // Step 3: header-cache path.
        let file_info = &self.shared.file_info;
        let header_blob_size = self.shared.header_cache_blob_size;
        let can_be_fully_cached = file_info.length() <= 2 * header_blob_size;
        let is_start_of_file = pos + length <= header_blob_size;
        let mut index_cache_miss: Option<Range> = None;

        if can_be_fully_cached || is_start_of_file {
            match self.shared.header_cache.lookup(file_info.name(), 0, length) {
                HeaderCacheLookup::Hit { bytes, from, to } => {
                    self.shared.stats.index_cache_bytes_read(to - from);
                    let start = (pos - from) as usize;
                    buf.copy_from_slice(&bytes[start..start + length as usize]);
                    self.spawn_header_backfill(bytes, Range::new(from, to));
                    return Ok(());
                }
                HeaderCacheLookup::Miss | HeaderCacheLookup::NotReady => {
                    index_cache_miss = Some(if can_be_fully_cached {
                        Range::new(0, file_info.length())
                    } else {
                        Range::new(0, std::cmp::min(header_blob_size, file_info.length()))
                    });
                }
            }
        }

        // Step 4: blob-store miss path.
        let range_size = self.range_size();
        let start_window = range_math::aligned_range(pos, range_size, file_info.length());
        let end_window = range_math::aligned_range(pos + length - 1, range_size, file_info.length());
        let write_range = range_math::union_opt(Some(range_math::union(start_window, end_window)), index_cache_miss)
            .expect("start_window/end_window union is always Some");
        let read_range = Range::new(pos, pos + length);
        debug_assert!(write_range.contains(&read_range));

        let writer = BlobFetchWriteFrom {
            blob_source: self.shared.blob_source.clone(),
            write_range_from: write_range.from,
            stats: self.shared.stats.clone(),
        };
        let mut main_reader = BufReadInto::new(&mut *buf, pos);

        if let Some(miss) = index_cache_miss {
            let close_fill = self.shared.stats.index_cache_fill_start();
            let mut index_reader = IndexMissReadInto {
                name: file_info.name().to_string(),
                header_cache: self.shared.header_cache.clone(),
                completion: Some(close_fill),
            };
            let main_fut =
                self.shared
                    .coordinator
                    .populate_and_read(write_range, read_range, &mut main_reader, &writer, &self.shared.executor);
            let index_fut = self.shared.coordinator.read_if_available_or_pending(miss, &mut index_reader);
            let (main_result, index_result) = tokio::join!(main_fut, index_fut);
            if !matches!(index_result, Some(Ok(_))) {
                if let Some(c) = index_reader.completion.take() {
                    c();
                }
            }
            Self::classify(main_result, main_reader.written())
        } else {
            let main_result = self
                .shared
                .coordinator
                .populate_and_read(write_range, read_range, &mut main_reader, &writer, &self.shared.executor)
                .await;
            Self::classify(main_result, main_reader.written())
        }
    }

    fn classify(result: CacheReadResult, already_written: u64) -> std::result::Result<(), Classified> {
        match result {
            Ok(_) => Ok(()),
            Err(CoordinatorError::Evicted) => Err(Classified::Evicted { already_written }),
            Err(CoordinatorError::Io(e)) => Err(Classified::Other(e.into())),
        }
    }

    /// Fire-and-forget write of a header-cache hit back into the shared
    /// cache, so a later fast-path read of the same region doesn't need
    /// the header cache at all. Failures are logged and otherwise
    /// swallowed: the read this accompanies has already succeeded.
    fn spawn_header_backfill(&self, bytes: Arc<[u8]>, range: Range) {
        let coordinator = self.shared.coordinator.clone();
        let executor = self.shared.executor.clone();
        let writer = ReplayWriteFrom {
            data: bytes,
            base: range.from,
        };
        self.shared.executor.spawn(async move {
            let mut noop = NoopReadInto(range.len());
            if let Err(e) = coordinator.populate_and_read(range, range, &mut noop, &writer, &executor).await {
                warn!("header-cache backfill into shared cache failed: {}", e);
            }
        });
    }

    async fn direct_read_fallback(&self, buf: &mut [u8], pos: u64, already_written: u64) -> Result<()> {
        let remaining = buf.len() as u64 - already_written;
        if remaining == 0 {
            return Ok(());
        }
        let fallback_pos = pos + already_written;
        let mut stream = self
            .shared
            .blob_source
            .open(fallback_pos, remaining)
            .map_err(|e| Error::CacheReadFailed(e.into()))?;

        let start = Instant::now();
        let dest = &mut buf[already_written as usize..];
        let mut written = 0usize;
        let mut chunk = [0u8; COPY_BUFFER];
        while (written as u64) < remaining {
            let want = std::cmp::min(COPY_BUFFER as u64, remaining - written as u64) as usize;
            match stream.read(&mut chunk[..want]) {
                Ok(0) => return Err(Error::UnexpectedEof),
                Ok(n) => {
                    dest[written..written + n].copy_from_slice(&chunk[..n]);
                    written += n;
                }
                Err(e) => return Err(Error::CacheReadFailed(e.into())),
            }
        }
        self.shared.stats.direct_bytes_read(remaining, start.elapsed());
        Ok(())
    }

    fn commit(&mut self, pos: u64, length: u64) {
        self.shared.stats.bytes_read(self.last_read_position, pos, length);
        self.last_read_position = pos + length;
        self.last_seek_position = pos + length;
    }
}

/// Copies bytes the coordinator hands back into a caller-owned buffer,
/// tracking how many bytes actually landed so an eviction mid-fill can
/// report a precise `already_written` count.
struct BufReadInto<'a> {
    buf: &'a mut [u8],
    base: u64,
    written: u64,
}

impl<'a> BufReadInto<'a> {
    fn new(buf: &'a mut [u8], base: u64) -> BufReadInto<'a> {
        BufReadInto { buf, base, written: 0 }
    }

    fn written(&self) -> u64 {
        self.written
    }
}

impl<'a> ReadInto for BufReadInto<'a> {
    fn read_into(
        &mut self,
        channel: &dyn CacheChannel,
        channel_pos: u64,
        relative_pos: u64,
        len: u64,
    ) -> std::io::Result<u64> {
        let _ = self.base;
        let start = relative_pos as usize;
        let end = start + len as usize;
        let n = channel.pread_at(channel_pos, &mut self.buf[start..end])?;
        self.written += n as u64;
        Ok(n as u64)
    }
}

/// The read half of a header-cache backfill: the data is already known,
/// so nothing is actually read from the channel.
struct NoopReadInto(u64);

impl ReadInto for NoopReadInto {
    fn read_into(&mut self, _channel: &dyn CacheChannel, _channel_pos: u64, _relative_pos: u64, _len: u64) -> std::io::Result<u64> {
        Ok(self.0)
    }
}

/// Populates an unpopulated sub-range of a header-cache backfill by
/// replaying already-known bytes rather than re-fetching them.
struct ReplayWriteFrom {
    data: Arc<[u8]>,
    base: u64,
}

impl WriteFrom for ReplayWriteFrom {
    fn write_into(
        &self,
        channel: &dyn CacheChannel,
        channel_pos: u64,
        relative_pos: u64,
        len: u64,
        progress: &(dyn Fn(u64) + Sync),
    ) -> std::io::Result<()> {
        let _ = self.base;
        let start = relative_pos as usize;
        let end = start + len as usize;
        let mut written = 0u64;
        for chunk in self.data[start..end].chunks(COPY_BUFFER) {
            channel.pwrite_at(channel_pos + written, chunk)?;
            written += chunk.len() as u64;
            progress(written);
        }
        Ok(())
    }
}

/// Populates an unpopulated sub-range of a blob-store miss by streaming
/// from the blob source in `COPY_BUFFER`-sized chunks.
struct BlobFetchWriteFrom {
    blob_source: Arc<dyn BlobSource>,
    write_range_from: u64,
    stats: Arc<dyn Stats>,
}

impl WriteFrom for BlobFetchWriteFrom {
    fn write_into(
        &self,
        channel: &dyn CacheChannel,
        channel_pos: u64,
        relative_pos: u64,
        len: u64,
        progress: &(dyn Fn(u64) + Sync),
    ) -> std::io::Result<()> {
        let logical_pos = self.write_range_from + relative_pos;
        let mut stream = self
            .blob_source
            .open(logical_pos, len)
            .map_err(std::io::Error::from)?;

        let start = Instant::now();
        let mut written = 0u64;
        let mut chunk = [0u8; COPY_BUFFER];
        while written < len {
            let want = std::cmp::min(COPY_BUFFER as u64, len - written) as usize;
            let n = stream.read(&mut chunk[..want])?;
            if n == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "blob source ended early"));
            }
            channel.pwrite_at(channel_pos + written, &chunk[..n])?;
            written += n as u64;
            progress(written);
        }
        self.stats.cached_bytes_written(written, start.elapsed());
        Ok(())
    }
}

/// Populates the header cache once a blob-store miss has fully
/// materialized the index-cache-miss range, by copying it out of the
/// channel into an owned buffer and handing that to the header cache.
struct IndexMissReadInto {
    name: String,
    header_cache: Arc<dyn HeaderCacheAdapter>,
    completion: Option<Box<dyn FnOnce() + Send>>,
}

impl ReadInto for IndexMissReadInto {
    fn read_into(
        &mut self,
        channel: &dyn CacheChannel,
        channel_pos: u64,
        relative_pos: u64,
        len: u64,
    ) -> std::io::Result<u64> {
        let mut buf = vec![0u8; len as usize];
        let n = match channel.pread_at(channel_pos, &mut buf) {
            Ok(n) => n,
            Err(e) => {
                if let Some(c) = self.completion.take() {
                    c();
                }
                return Err(e);
            }
        };
        buf.truncate(n);
        let completion = self.completion.take().unwrap_or_else(|| Box::new(|| {}));
        self.header_cache.put(&self.name, relative_pos, buf, completion);
        Ok(n as u64)
    }
}
