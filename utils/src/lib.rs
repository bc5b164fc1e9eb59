// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Small ambient helpers shared by the cache crates: `std::io::Error`
//! construction macros for the positional-IO boundary, and logging setup.

#[macro_use]
pub mod einval;
pub mod logging;

pub use einval::*;
