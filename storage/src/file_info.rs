// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Immutable description of a logical file and the pure arithmetic that
//! maps logical byte positions onto the fixed-size parts a [`crate::blob_source`]
//! fetches independently.
//!
//! Grounded on nydus-rs's `blobcache.rs` (`rafs/src/storage/cache/blobcache.rs`),
//! which pulls `RafsChunkInfo`/`RafsSuperMeta` in from the metadata crate
//! and keeps only the few fields (blob id, chunk bounds) a cache actually
//! consumes; this module does the same, trimmed further since parts here
//! are a pure stitching concern, not a content-defined chunk boundary.

use std::sync::Arc;

use crate::error::{Error, Result};

/// A file as the cache sees it: a name, a total length, the fixed part
/// size the remote blob store shards it into, and an optional checksum
/// used for the footer shortcut.
#[derive(Debug, Clone)]
pub struct FileInfo {
    name: String,
    length: u64,
    part_size: u64,
    checksum: Option<String>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, length: u64, part_size: u64, checksum: Option<String>) -> Arc<FileInfo> {
        Arc::new(FileInfo {
            name: name.into(),
            length,
            part_size,
            checksum,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Number of parts covering the file, including a final partial part.
    pub fn number_of_parts(&self) -> u64 {
        if self.length == 0 {
            return 0;
        }
        (self.length + self.part_size - 1) / self.part_size
    }

    /// Name of the blob-store part holding byte `pos`.
    pub fn part_name(&self, pos: u64) -> Result<String> {
        Ok(format!("{}.part.{}", self.name, part_index(self, pos)?))
    }

    /// Number of bytes actually stored in part `i` (the last part may be short).
    pub fn length_of_part(&self, i: u64) -> Result<u64> {
        length_of_part(self, i)
    }
}

/// Index of the part holding byte `pos` of `file`. Fails with
/// `InvalidPosition` when `pos >= file.length()`.
pub fn part_index(file: &FileInfo, pos: u64) -> Result<u64> {
    check_position(file, pos)?;
    Ok(pos / file.part_size)
}

/// Offset of byte `pos` of `file` within its containing part. Fails with
/// `InvalidPosition` when `pos >= file.length()`.
pub fn offset_in_part(file: &FileInfo, pos: u64) -> Result<u64> {
    check_position(file, pos)?;
    Ok(pos % file.part_size)
}

/// Number of bytes stored in part `i` of `file` (the final part is
/// truncated to whatever remains of the file). Fails with
/// `InvalidPosition` when `i >= file.number_of_parts()`.
pub fn length_of_part(file: &FileInfo, i: u64) -> Result<u64> {
    if i >= file.number_of_parts() {
        return Err(Error::InvalidPosition {
            pos: i,
            len: file.number_of_parts(),
        });
    }
    let start = i * file.part_size;
    Ok(std::cmp::min(file.part_size, file.length - start))
}

fn check_position(file: &FileInfo, pos: u64) -> Result<()> {
    if pos >= file.length {
        return Err(Error::InvalidPosition {
            pos,
            len: file.length,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(length: u64, part_size: u64) -> Arc<FileInfo> {
        FileInfo::new("x", length, part_size, None)
    }

    #[test]
    fn part_index_and_offset_agree_with_part_size() {
        let f = file(2500, 1000);
        assert_eq!(part_index(&f, 0).unwrap(), 0);
        assert_eq!(part_index(&f, 999).unwrap(), 0);
        assert_eq!(part_index(&f, 1000).unwrap(), 1);
        assert_eq!(part_index(&f, 2400).unwrap(), 2);
        assert_eq!(offset_in_part(&f, 1500).unwrap(), 500);
    }

    #[test]
    fn position_at_or_past_length_is_invalid() {
        let f = file(2500, 1000);
        assert!(matches!(part_index(&f, 2500), Err(Error::InvalidPosition { pos: 2500, len: 2500 })));
        assert!(matches!(offset_in_part(&f, 3000), Err(Error::InvalidPosition { .. })));
    }

    #[test]
    fn final_part_is_short() {
        let f = file(2500, 1000);
        assert_eq!(f.number_of_parts(), 3);
        assert_eq!(length_of_part(&f, 0).unwrap(), 1000);
        assert_eq!(length_of_part(&f, 1).unwrap(), 1000);
        assert_eq!(length_of_part(&f, 2).unwrap(), 500);
        assert!(matches!(length_of_part(&f, 3), Err(Error::InvalidPosition { .. })));
    }

    #[test]
    fn empty_file_has_no_parts() {
        let f = file(0, 1000);
        assert_eq!(f.number_of_parts(), 0);
    }

    #[test]
    fn single_part_file_rounds_up_exactly() {
        let f = file(1000, 1000);
        assert_eq!(f.number_of_parts(), 1);
        assert_eq!(length_of_part(&f, 0).unwrap(), 1000);
    }
}
