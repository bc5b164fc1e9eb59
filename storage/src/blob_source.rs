// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Read access to the remote blob store, and the part-stitching adapter
//! that presents a file split across many fixed-size parts as a single
//! contiguous byte stream.
//!
//! Grounded on nydus-rs's `BlobBackend` trait (`rafs/src/storage/backend/mod.rs`):
//! a small synchronous `try_read(blob_id, buf, offset) -> Result<usize>`
//! surface that higher layers (here, the cache-fetch executor and the
//! eviction fallback) call from a dedicated thread, never from the
//! caller's own thread during the steady-state cache-hit path.

use std::io::{self, Read};
use std::sync::Arc;

use crate::error::BlobSourceError;
use crate::file_info::{self, FileInfo};
use crate::stats::Stats;

/// Read access to the remote, immutable blob store backing a file.
///
/// `open` returns a stream over the half-open logical range
/// `[position, position + length)`; reading past the declared `length`
/// is a caller bug, and reading short (the stream ending before `length`
/// bytes are delivered) is reported as [`BlobSourceError::UnexpectedEof`].
pub trait BlobSource: Send + Sync {
    fn open(&self, position: u64, length: u64) -> Result<Box<dyn Read + Send>, BlobSourceError>;
}

/// Fetches a single part of a file from the remote store. A production
/// implementation wraps whatever transport the blob store exposes (HTTP
/// range requests, an object-storage SDK, ...); this crate only needs
/// the part-at-a-time contract.
pub trait PartBackend: Send + Sync {
    /// Open a stream over `[offset, offset + length)` of the named part.
    fn open_part(&self, part_name: &str, offset: u64, length: u64) -> io::Result<Box<dyn Read + Send>>;
}

/// A [`BlobSource`] that stitches together the fixed-size parts a
/// [`PartBackend`] serves, presenting them as one contiguous stream, and
/// accounts every part-slice request against [`Stats::blob_store_bytes_requested`].
pub struct FileBlobSource<B> {
    file_info: Arc<FileInfo>,
    backend: Arc<B>,
    stats: Arc<dyn Stats>,
}

impl<B: PartBackend + 'static> FileBlobSource<B> {
    pub fn new(file_info: Arc<FileInfo>, backend: Arc<B>, stats: Arc<dyn Stats>) -> FileBlobSource<B> {
        FileBlobSource {
            file_info,
            backend,
            stats,
        }
    }
}

impl<B: PartBackend + 'static> BlobSource for FileBlobSource<B> {
    fn open(&self, position: u64, length: u64) -> Result<Box<dyn Read + Send>, BlobSourceError> {
        if length == 0 {
            return Ok(Box::new(io::empty()));
        }
        if position + length > self.file_info.length() {
            return Err(BlobSourceError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "requested range exceeds file length",
            )));
        }
        Ok(Box::new(PartStitchingReader {
            file_info: self.file_info.clone(),
            backend: self.backend.clone(),
            stats: self.stats.clone(),
            pos: position,
            remaining: length,
            current: None,
        }))
    }
}

/// Lazily opens one part stream at a time as the caller reads through a
/// multi-part range, so a caller reading only the first few bytes never
/// pays for parts it doesn't touch.
struct PartStitchingReader<B> {
    file_info: Arc<FileInfo>,
    backend: Arc<B>,
    stats: Arc<dyn Stats>,
    pos: u64,
    remaining: u64,
    current: Option<Box<dyn Read + Send>>,
}

impl<B: PartBackend> Read for PartStitchingReader<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        if self.current.is_none() {
            let to_io_error = |e: crate::error::Error| io::Error::new(io::ErrorKind::InvalidInput, e.to_string());
            let part_index = file_info::part_index(&self.file_info, self.pos).map_err(to_io_error)?;
            let part_offset = file_info::offset_in_part(&self.file_info, self.pos).map_err(to_io_error)?;
            let part_len = file_info::length_of_part(&self.file_info, part_index).map_err(to_io_error)?;
            let slice_len = std::cmp::min(self.remaining, part_len - part_offset);
            let part_name = self.file_info.part_name(self.pos).map_err(to_io_error)?;
            let stream = self.backend.open_part(&part_name, part_offset, slice_len)?;
            self.stats.blob_store_bytes_requested(slice_len);
            self.current = Some(stream);
        }

        let want = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let n = self.current.as_mut().unwrap().read(&mut buf[..want])?;
        if n == 0 {
            // This part's stream is exhausted; move on to the next part
            // on the following call rather than report a short read here,
            // so a part boundary in the middle of `buf` is transparent to
            // the caller.
            self.current = None;
            return self.read(buf);
        }
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    use crate::stats::AtomicStats;

    struct MapBackend {
        parts: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl PartBackend for MapBackend {
        fn open_part(&self, part_name: &str, offset: u64, length: u64) -> io::Result<Box<dyn Read + Send>> {
            let parts = self.parts.lock().unwrap();
            let data = parts
                .get(part_name)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such part"))?;
            let start = offset as usize;
            let end = start + length as usize;
            Ok(Box::new(Cursor::new(data[start..end].to_vec())))
        }
    }

    #[test]
    fn stitches_a_read_spanning_two_parts() {
        let file_info = FileInfo::new("f", 15, 10, None);
        let mut parts = HashMap::new();
        parts.insert("f.part.0".to_string(), vec![0u8; 10]);
        parts.insert("f.part.1".to_string(), vec![1u8; 5]);
        let backend = Arc::new(MapBackend {
            parts: Mutex::new(parts),
        });
        let stats: Arc<dyn Stats> = Arc::new(AtomicStats::new());
        let source = FileBlobSource::new(file_info, backend, stats.clone());

        let mut stream = source.open(5, 8).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![0, 0, 0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn rejects_a_range_past_the_file_length() {
        let file_info = FileInfo::new("f", 15, 10, None);
        let backend = Arc::new(MapBackend {
            parts: Mutex::new(HashMap::new()),
        });
        let stats: Arc<dyn Stats> = Arc::new(AtomicStats::new());
        let source = FileBlobSource::new(file_info, backend, stats);
        assert!(source.open(10, 10).is_err());
    }
}
