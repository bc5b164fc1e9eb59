// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Logging setup built on `flexi_logger`, the logging crate nydus-rs
//! carries as an ambient dependency alongside the `log` facade macros used
//! throughout the cache code (`trace!`, `debug!`, `warn!`, `error!`).

use std::path::Path;

use flexi_logger::{FileSpec, LogSpecification, Logger, LoggerHandle};
use log::LevelFilter;

/// Initialize process-wide logging at the given level.
///
/// When `log_file` is `Some`, log records are written to a file in that
/// directory in addition to stderr; otherwise only stderr is used. Returns
/// a handle that must be kept alive for the duration of the process.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> std::io::Result<LoggerHandle> {
    let spec = LogSpecification::builder().default(level.into()).build();
    let mut logger = Logger::with(spec);

    if let Some(dir) = log_file {
        logger = logger
            .log_to_file(FileSpec::default().directory(dir))
            .duplicate_to_stderr(flexi_logger::Duplicate::All);
    }

    logger
        .start()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{}", e)))
}
