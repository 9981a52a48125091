// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types and the fatal-exit path.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::error;

/// Prefix of every diagnostic the library prints on its own.
pub const DIAGNOSTIC_PREFIX: &str = "libear";

/// Load-time failures. Non-fatal: interception degrades to pass-through.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("newlocale failed: {0}")]
    Locale(#[source] io::Error),

    #[error("environment variable {name} is not set")]
    MissingVariable { name: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("escaped string does not fit into {capacity} bytes")]
    BufferTooSmall { capacity: usize },

    #[error("invalid multibyte sequence for the current locale")]
    InvalidMultibyte,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot create report file in {}: {source}", dir.display())]
    CreateFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("uselocale failed: {0}")]
    SwitchLocale(#[source] io::Error),

    #[error("getcwd failed: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("writing json problem: {0}")]
    Encode(#[from] EncodeError),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("close failed: {0}")]
    Close(#[source] io::Error),
}

/// Print a diagnostic and terminate the process with `EXIT_FAILURE`.
///
/// Used once a process-creation call is already in flight and the shim can
/// neither record it faithfully nor forward it.
pub fn fatal(context: &str, err: &dyn Display) -> ! {
    error!(context, error = %err, "fatal interception failure");
    let _ = writeln!(io::stderr(), "{DIAGNOSTIC_PREFIX}: {context}: {err}");
    std::process::exit(libc::EXIT_FAILURE)
}
