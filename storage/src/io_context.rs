// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! The caller-declared intent behind a read, used to pick the range size
//! a blob-store miss fetches (see [`crate::cached_input::CachedInput::range_size`]).

/// Why a `CachedInput` was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoContext {
    /// An ordinary query-time read. Range size follows recovery state.
    Normal,
    /// A prefetch/warm-up pass. Range size is always a full part, and this
    /// core declines to serve it (see `Error::InvalidContext`); warming is
    /// an external collaborator's concern (spec Non-goals).
    Warming,
}
