// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! The fixed-format trailer a Lucene-style index file ends with, and the
//! shortcut that synthesizes it from a pre-known checksum rather than
//! touching the cache or the backing store at all.

/// Bytes occupied by the footer: magic (4) + algorithm id (4) + checksum (8).
pub const FOOTER_LENGTH: u64 = 16;

const FOOTER_MAGIC: u32 = 0x3fd7_6c17;
const FOOTER_ALGORITHM_ID: u32 = 0;

/// Parse a hex-encoded checksum string as used in `FileInfo::checksum`.
pub fn parse_checksum(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex, 16).ok()
}

/// Build the literal footer bytes for a file whose trailing checksum is
/// `checksum_hex`. Returns `None` if the checksum can't be parsed, in
/// which case the caller should fall through to the ordinary read path
/// rather than fail the read outright.
pub fn synthesize_footer(checksum_hex: &str) -> Option<[u8; FOOTER_LENGTH as usize]> {
    let checksum = parse_checksum(checksum_hex)?;
    let mut footer = [0u8; FOOTER_LENGTH as usize];
    footer[0..4].copy_from_slice(&FOOTER_MAGIC.to_be_bytes());
    footer[4..8].copy_from_slice(&FOOTER_ALGORITHM_ID.to_be_bytes());
    footer[8..16].copy_from_slice(&checksum.to_be_bytes());
    Some(footer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_footer_carries_magic_and_checksum() {
        let footer = synthesize_footer("deadbeefcafef00d").unwrap();
        assert_eq!(&footer[0..4], &FOOTER_MAGIC.to_be_bytes());
        assert_eq!(&footer[4..8], &FOOTER_ALGORITHM_ID.to_be_bytes());
        assert_eq!(u64::from_be_bytes(footer[8..16].try_into().unwrap()), 0xdeadbeefcafef00d);
    }

    #[test]
    fn unparseable_checksum_yields_none() {
        assert!(synthesize_footer("not hex").is_none());
    }
}
