// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Pure range arithmetic used to size the disk-backed write underlying a
//! blob-store miss. Kept free of any cache or IO state so it can be unit
//! tested on its own, the way nydus-rs keeps chunk-bound math
//! (`rafs/src/metadata/chunk.rs`) separate from the cache that uses it.

use crate::range::Range;

/// The range-size-aligned window covering `position`, clamped to
/// `[0, file_length)`.
///
/// `position` is rounded down to the nearest multiple of `range_size` to
/// get the window start; the window extends `range_size` bytes or to
/// `file_length`, whichever is shorter.
pub fn aligned_range(position: u64, range_size: u64, file_length: u64) -> Range {
    debug_assert!(range_size > 0);
    let start = (position / range_size) * range_size;
    let end = std::cmp::min(start + range_size, file_length);
    Range::new(start, end)
}

/// Smallest range containing both `a` and `b`.
pub fn union(a: Range, b: Range) -> Range {
    Range::new(std::cmp::min(a.from, b.from), std::cmp::max(a.to, b.to))
}

/// `union`, but tolerant of either side being absent.
pub fn union_opt(a: Option<Range>, b: Option<Range>) -> Option<Range> {
    match (a, b) {
        (Some(a), Some(b)) => Some(union(a, b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_range_rounds_down_to_range_size() {
        let r = aligned_range(1500, 1000, 10_000);
        assert_eq!(r, Range::new(1000, 2000));
    }

    #[test]
    fn aligned_range_clamps_to_file_length() {
        let r = aligned_range(9500, 1000, 10_000);
        assert_eq!(r, Range::new(9000, 10_000));
    }

    #[test]
    fn aligned_range_at_exact_boundary() {
        let r = aligned_range(1000, 1000, 10_000);
        assert_eq!(r, Range::new(1000, 2000));
    }

    #[test]
    fn union_covers_both_inputs() {
        let a = Range::new(100, 200);
        let b = Range::new(150, 400);
        assert_eq!(union(a, b), Range::new(100, 400));

        let disjoint = union(Range::new(0, 10), Range::new(500, 600));
        assert_eq!(disjoint, Range::new(0, 600));
    }

    #[test]
    fn union_opt_passes_through_single_side() {
        let a = Range::new(10, 20);
        assert_eq!(union_opt(Some(a), None), Some(a));
        assert_eq!(union_opt(None, Some(a)), Some(a));
        assert_eq!(union_opt(None, None), None);
    }
}
