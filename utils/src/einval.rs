// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! `std::io::Error` construction macros, in the idiom nydus-rs uses at the
//! positional-IO boundary (`blobcache.rs`'s `einval!`/`enoent!`/`enosys!`/
//! `last_error!`). Kept deliberately small: this crate only needs to wrap
//! `nix::Error`/plain messages into `io::Error` before the caller converts
//! them into the typed `storage::Error`.

/// Build an `io::Error` of kind `InvalidInput`.
#[macro_export]
macro_rules! einval {
    () => {
        std::io::Error::from(std::io::ErrorKind::InvalidInput)
    };
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}", $e))
    };
}

/// Build an `io::Error` of kind `NotFound`.
#[macro_export]
macro_rules! enoent {
    () => {
        std::io::Error::from(std::io::ErrorKind::NotFound)
    };
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}", $e))
    };
}

/// Build an `io::Error` for an unsupported operation.
#[macro_export]
macro_rules! enosys {
    () => {
        std::io::Error::new(std::io::ErrorKind::Unsupported, "operation not supported")
    };
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::Unsupported, format!("{}", $e))
    };
}

/// Build a generic `io::Error` of kind `Other`.
#[macro_export]
macro_rules! eio {
    () => {
        std::io::Error::new(std::io::ErrorKind::Other, "i/o error")
    };
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::Other, format!("{}", $e))
    };
}

/// Alias of `eio!`, kept because nydus-rs source uses both spellings
/// depending on whether the call site reads more naturally as "other".
#[macro_export]
macro_rules! eother {
    ($($arg:tt)*) => { $crate::eio!($($arg)*) };
}

/// Wrap `std::io::Error::last_os_error()`, optionally prefixed with context.
#[macro_export]
macro_rules! last_error {
    () => {
        std::io::Error::last_os_error()
    };
    ($e:expr) => {
        std::io::Error::new(
            std::io::Error::last_os_error().kind(),
            format!("{}: {}", $e, std::io::Error::last_os_error()),
        )
    };
}
