// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! A read-through byte-range cache sitting between a search engine's
//! index-input abstraction and a remote, immutable blob store: disk
//! reads when the range is already resident, a small out-of-process
//! header cache for file prefixes, and a blob-store fetch (merged with
//! concurrent overlapping requests) otherwise.

pub mod blob_source;
pub mod cached_input;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod file_info;
pub mod footer;
pub mod header_cache;
pub mod io_context;
pub mod range;
pub mod range_math;
pub mod stats;
pub mod testkit;

pub use cached_input::{CachedInput, OpenParams};
pub use error::{BlobSourceError, CoordinatorError, Error, Result};
pub use file_info::FileInfo;
pub use io_context::IoContext;
pub use range::Range;
