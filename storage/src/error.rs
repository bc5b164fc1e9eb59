// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Error classes a caller of [`crate::CachedInput`] can branch on.

use thiserror::Error;

/// Errors surfaced across the `storage` crate's public boundary.
///
/// Kept as a small closed set, in the idiom of `nydus-rs`'s own top-level
/// `Error` enum (`Chasing1020-nydus`'s `src/lib.rs`), rather than the
/// stringly-typed `std::io::Error` the low-level positional-IO helpers in
/// `nydus-utils` still use internally.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("position {pos} is out of bounds for a file of length {len}")]
    InvalidPosition { pos: u64, len: u64 },

    #[error("seek position {0} is negative")]
    InvalidSeek(i64),

    #[error("end of file")]
    Eof,

    #[error("read issued against the warming IO context, which this core does not serve")]
    InvalidContext,

    #[error("blob source returned fewer bytes than requested")]
    UnexpectedEof,

    #[error("shared cache region was evicted")]
    Evicted,

    #[error("cache read failed: {0}")]
    CacheReadFailed(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error surfaced by the [`crate::coordinator::SharedCacheCoordinator`] contract.
///
/// Distinct from [`Error`] because `CachedInput` must branch on eviction
/// without downcasting an opaque `anyhow::Error` (spec §7: "Only this class
/// triggers Step 5 fallback").
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("shared cache region was evicted")]
    Evicted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error surfaced by the [`crate::blob_source::BlobSource`] contract.
#[derive(Error, Debug)]
pub enum BlobSourceError {
    #[error("blob stream ended before the requested length was reached")]
    UnexpectedEof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<BlobSourceError> for std::io::Error {
    fn from(e: BlobSourceError) -> Self {
        match e {
            BlobSourceError::UnexpectedEof => {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "unexpected eof")
            }
            BlobSourceError::Io(e) => e,
        }
    }
}
