// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Deserializable tuning knobs for a `CachedInput`, in the shape of
//! nydus-rs's `BlobCacheConfig` (`rafs/src/storage/cache/blobcache.rs`):
//! a plain `serde`-derived struct with `#[serde(default = ...)]` fall
//! backs, loaded once by whatever owns the process configuration file.

use serde::Deserialize;

fn default_range_size() -> u64 {
    8 * 1024 * 1024
}

fn default_recovery_range_size() -> u64 {
    1024 * 1024
}

fn default_header_cache_blob_size() -> u64 {
    512 * 1024
}

/// Sizing knobs for the blob-store miss path (spec §4.2, §4.6 step 4).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheRangeConfig {
    /// Range size used for ordinary reads once recovery has completed.
    #[serde(default = "default_range_size")]
    pub default_range_size: u64,

    /// Range size used for ordinary reads while recovery is still in
    /// progress, kept smaller so a single miss doesn't stall behind a
    /// large fetch competing with recovery traffic.
    #[serde(default = "default_recovery_range_size")]
    pub recovery_range_size: u64,

    /// Upper bound on how much of a file is eligible for whole-file
    /// header-cache residency (spec §4.3's "can be fully cached" test).
    #[serde(default = "default_header_cache_blob_size")]
    pub header_cache_blob_size: u64,
}

impl Default for CacheRangeConfig {
    fn default() -> Self {
        CacheRangeConfig {
            default_range_size: default_range_size(),
            recovery_range_size: default_recovery_range_size(),
            header_cache_blob_size: default_header_cache_blob_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: CacheRangeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.default_range_size, default_range_size());
        assert_eq!(cfg.recovery_range_size, default_recovery_range_size());
        assert_eq!(cfg.header_cache_blob_size, default_header_cache_blob_size());
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let cfg: CacheRangeConfig =
            serde_json::from_str(r#"{"default_range_size": 4096}"#).unwrap();
        assert_eq!(cfg.default_range_size, 4096);
        assert_eq!(cfg.recovery_range_size, default_recovery_range_size());
    }
}
