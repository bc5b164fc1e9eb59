// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory/on-disk reference collaborators exercising `CachedInput`
//! end to end, in the spirit of nydus-rs's own `blob_cache_tests`
//! module (`rafs/src/storage/cache/blobcache.rs`), which builds a
//! `MockBackend` and a `vmm_sys_util::tempdir::TempDir`-backed cache
//! file rather than mocking at the trait-object level with a mocking
//! framework. Exported (not `#[cfg(test)]`-gated) so this crate's own
//! integration tests under `tests/` can reuse it.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nix::sys::uio::{pread, pwrite};

use crate::blob_source::{BlobSource, PartBackend};
use crate::coordinator::{
    CacheChannel, CacheReadResult, RecoveryState, ReadInto, SharedCacheCoordinator, WriteFrom,
};
use crate::error::{BlobSourceError, CoordinatorError};
use crate::header_cache::{HeaderCacheAdapter, HeaderCacheLookup};
use crate::range::Range;

/// A `CacheChannel` backed by a real file, using the same
/// `nix::sys::uio::{pread,pwrite}` positional calls nydus-rs's
/// `blobcache.rs` uses for its own cache file.
pub struct LocalFileChannel {
    file: std::fs::File,
}

impl LocalFileChannel {
    pub fn create(dir: &Path, name: &str) -> std::io::Result<LocalFileChannel> {
        let path = dir.join(name);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(LocalFileChannel { file })
    }
}

impl CacheChannel for LocalFileChannel {
    fn pread_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match pread(self.file.as_raw_fd(), buf, pos as i64) {
                Ok(n) => return Ok(n),
                Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => continue,
                Err(e) => return Err(nydus_utils::eio!(e)),
            }
        }
    }

    fn pwrite_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<usize> {
        loop {
            match pwrite(self.file.as_raw_fd(), buf, pos as i64) {
                Ok(n) => return Ok(n),
                Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => continue,
                Err(e) => return Err(nydus_utils::eio!(e)),
            }
        }
    }
}

fn mock_evicted() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "mock-eviction")
}

fn is_mock_evicted(e: &std::io::Error) -> bool {
    e.to_string().contains("mock-eviction")
}

/// Wraps a real channel so writes beyond `evict_after` cumulative bytes
/// fail, simulating a shared-cache region being evicted mid-fill.
struct ChaosChannel {
    inner: Arc<dyn CacheChannel>,
    evict_after: u64,
    committed: AtomicU64,
}

impl CacheChannel for ChaosChannel {
    fn pread_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.pread_at(pos, buf)
    }

    fn pwrite_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<usize> {
        let before = self.committed.load(Ordering::Relaxed);
        if before >= self.evict_after {
            return Err(mock_evicted());
        }
        let allowed = std::cmp::min(buf.len() as u64, self.evict_after - before) as usize;
        let n = self.inner.pwrite_at(pos, &buf[..allowed])?;
        self.committed.fetch_add(n as u64, Ordering::Relaxed);
        if n < buf.len() {
            return Err(mock_evicted());
        }
        Ok(n)
    }
}

/// An in-memory `SharedCacheCoordinator`: one logical file's worth of
/// cache, a coarse write lock standing in for the production
/// coordinator's per-region inflight tracking, and an optional
/// eviction-injection knob for tests.
pub struct MockCoordinator {
    channel: Arc<dyn CacheChannel>,
    resident: Mutex<Vec<Range>>,
    write_gate: tokio::sync::Mutex<()>,
    evict_after: Mutex<Option<u64>>,
}

impl MockCoordinator {
    pub fn new(channel: Arc<dyn CacheChannel>) -> MockCoordinator {
        MockCoordinator {
            channel,
            resident: Mutex::new(Vec::new()),
            write_gate: tokio::sync::Mutex::new(()),
            evict_after: Mutex::new(None),
        }
    }

    /// The next `populate_and_read` call will fail with `Evicted` after
    /// `n` bytes of its write range have been durably written.
    pub fn inject_eviction_after(&self, n: u64) {
        *self.evict_after.lock().unwrap() = Some(n);
    }

    fn is_resident(&self, range: Range) -> bool {
        let resident = self.resident.lock().unwrap();
        resident.iter().any(|r| r.contains(&range))
    }

    fn mark_resident(&self, range: Range) {
        self.resident.lock().unwrap().push(range);
    }
}

#[async_trait]
impl SharedCacheCoordinator for MockCoordinator {
    async fn read_if_available_or_pending(
        &self,
        range: Range,
        reader: &mut (dyn ReadInto + Send),
    ) -> Option<CacheReadResult> {
        // A short poll stands in for the production coordinator's
        // condition-variable wakeup when a concurrent fill completes.
        for _ in 0..50 {
            if self.is_resident(range) {
                let n = match reader.read_into(&*self.channel, range.from, 0, range.len()) {
                    Ok(n) => n,
                    Err(e) => return Some(Err(CoordinatorError::Io(e))),
                };
                return Some(Ok(n));
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        None
    }

    async fn populate_and_read(
        &self,
        write_range: Range,
        read_range: Range,
        reader: &mut (dyn ReadInto + Send),
        writer: &(dyn WriteFrom + Send + Sync),
        _executor: &tokio::runtime::Handle,
    ) -> CacheReadResult {
        let _guard = self.write_gate.lock().await;

        if !self.is_resident(write_range) {
            let evict_after = self.evict_after.lock().unwrap().take();
            let progress = |_n: u64| {};
            let result = if let Some(n) = evict_after {
                let chaos = Arc::new(ChaosChannel {
                    inner: self.channel.clone(),
                    evict_after: n,
                    committed: AtomicU64::new(0),
                });
                let outcome = writer.write_into(&*chaos, write_range.from, 0, write_range.len(), &progress);
                (outcome, Some(chaos))
            } else {
                (
                    writer.write_into(&*self.channel, write_range.from, 0, write_range.len(), &progress),
                    None,
                )
            };

            match result {
                (Ok(()), _) => {
                    self.mark_resident(write_range);
                }
                (Err(e), Some(chaos)) if is_mock_evicted(&e) => {
                    let committed = chaos.committed.load(Ordering::Relaxed);
                    let written_end = write_range.from + committed;
                    if written_end > read_range.from {
                        let overlap_end = std::cmp::min(written_end, read_range.to);
                        let overlap_len = overlap_end - read_range.from;
                        let _ = reader.read_into(&*self.channel, read_range.from, 0, overlap_len);
                    }
                    return Err(CoordinatorError::Evicted);
                }
                (Err(e), _) => return Err(CoordinatorError::Io(e)),
            }
        }

        let n = reader.read_into(&*self.channel, read_range.from, 0, read_range.len())?;
        Ok(n)
    }
}

/// A `HeaderCacheAdapter` backed by a `Mutex<HashMap>`, with a settable
/// "pending" flag so tests can exercise the `NotReady` branch.
pub struct InMemoryHeaderCache {
    entries: Mutex<HashMap<String, Arc<[u8]>>>,
    pending: Mutex<bool>,
}

impl InMemoryHeaderCache {
    pub fn new() -> InMemoryHeaderCache {
        InMemoryHeaderCache {
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(false),
        }
    }

    pub fn set_pending(&self, pending: bool) {
        *self.pending.lock().unwrap() = pending;
    }

    pub fn seed(&self, name: &str, bytes: Vec<u8>) {
        self.entries.lock().unwrap().insert(name.to_string(), Arc::from(bytes));
    }
}

impl Default for InMemoryHeaderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCacheAdapter for InMemoryHeaderCache {
    fn lookup(&self, name: &str, from: u64, length: u64) -> HeaderCacheLookup {
        if *self.pending.lock().unwrap() {
            return HeaderCacheLookup::NotReady;
        }
        match self.entries.lock().unwrap().get(name) {
            Some(bytes) if (from + length) as usize <= bytes.len() => HeaderCacheLookup::Hit {
                bytes: bytes.clone(),
                from: 0,
                to: bytes.len() as u64,
            },
            _ => HeaderCacheLookup::Miss,
        }
    }

    fn put(&self, name: &str, from: u64, bytes: Vec<u8>, completion: Box<dyn FnOnce() + Send>) {
        if from == 0 {
            self.entries.lock().unwrap().insert(name.to_string(), Arc::from(bytes));
        }
        completion();
    }
}

/// A `PartBackend` serving parts out of an in-memory map, for use with
/// [`crate::blob_source::FileBlobSource`].
pub struct InMemoryPartBackend {
    parts: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryPartBackend {
    pub fn new() -> InMemoryPartBackend {
        InMemoryPartBackend {
            parts: Mutex::new(HashMap::new()),
        }
    }

    pub fn put_part(&self, name: &str, bytes: Vec<u8>) {
        self.parts.lock().unwrap().insert(name.to_string(), bytes);
    }
}

impl Default for InMemoryPartBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PartBackend for InMemoryPartBackend {
    fn open_part(&self, part_name: &str, offset: u64, length: u64) -> std::io::Result<Box<dyn Read + Send>> {
        let parts = self.parts.lock().unwrap();
        let data = parts
            .get(part_name)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such part"))?;
        let start = offset as usize;
        let end = start + length as usize;
        Ok(Box::new(Cursor::new(data[start..end].to_vec())))
    }
}

/// A `BlobSource` reading directly out of an in-memory byte buffer,
/// useful where tests want to bypass part-stitching entirely (e.g. the
/// direct-read eviction fallback).
pub struct InMemoryBlobSource {
    data: Vec<u8>,
}

impl InMemoryBlobSource {
    pub fn new(data: Vec<u8>) -> InMemoryBlobSource {
        InMemoryBlobSource { data }
    }
}

impl BlobSource for InMemoryBlobSource {
    fn open(&self, position: u64, length: u64) -> Result<Box<dyn Read + Send>, BlobSourceError> {
        let start = position as usize;
        let end = start + length as usize;
        if end > self.data.len() {
            return Err(BlobSourceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "requested range exceeds blob length",
            )));
        }
        Ok(Box::new(Cursor::new(self.data[start..end].to_vec())))
    }
}

/// A `RecoveryState` that always reports one fixed value.
pub struct FixedRecoveryState(std::sync::atomic::AtomicBool);

impl FixedRecoveryState {
    pub fn complete() -> FixedRecoveryState {
        FixedRecoveryState(std::sync::atomic::AtomicBool::new(true))
    }

    pub fn in_progress() -> FixedRecoveryState {
        FixedRecoveryState(std::sync::atomic::AtomicBool::new(false))
    }

    pub fn set_complete(&self, complete: bool) {
        self.0.store(complete, Ordering::Relaxed);
    }
}

impl RecoveryState for FixedRecoveryState {
    fn is_recovery_complete(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
