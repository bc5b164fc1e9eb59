// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! The out-of-process header cache: an external collaborator that keeps a
//! small prefix of "small enough to fully cache" files resident, separate
//! from the shared byte-range cache `CachedInput` otherwise reads through.
//!
//! Modeled as a trait rather than a concrete type for the same reason
//! nydus-rs's `RafsCache` is a trait (`rafs/src/storage/cache/mod.rs`):
//! `CachedInput` only needs the lookup/put surface, and both the
//! production implementation and the in-memory test double
//! ([`crate::testkit::InMemoryHeaderCache`]) implement it.

use std::sync::Arc;

/// Result of a header-cache lookup.
pub enum HeaderCacheLookup {
    /// `bytes` holds the half-open range `[from, to)` of the file.
    Hit { bytes: Arc<[u8]>, from: u64, to: u64 },
    /// The range is not cached and no fill is in flight.
    Miss,
    /// A fill for this range is already in flight; treat like a miss for
    /// this read (the caller falls through to the blob-store path) but
    /// do not issue a second fill.
    NotReady,
}

/// The header cache contract `CachedInput` reads through and backfills.
pub trait HeaderCacheAdapter: Send + Sync {
    /// Look up bytes `[from, from + length)` of `name`.
    fn lookup(&self, name: &str, from: u64, length: u64) -> HeaderCacheLookup;

    /// Offer `bytes` (covering `[from, from + bytes.len())` of `name`) to
    /// the header cache. `completion` must be invoked exactly once, once
    /// the header cache has durably accepted or dropped the offer.
    fn put(&self, name: &str, from: u64, bytes: Vec<u8>, completion: Box<dyn FnOnce() + Send>);
}
