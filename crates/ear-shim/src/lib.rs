// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exec/spawn interposition library
//!
//! Preloaded into a build (`LD_PRELOAD` on Linux, `DYLD_INSERT_LIBRARIES` on
//! macOS), the library shadows the libc process-creation primitives. Every
//! call writes a JSON report into `INTERCEPT_BUILD_TARGET_DIR` and is then
//! forwarded to the real primitive with the preload variables re-injected, so
//! the whole process tree keeps reporting.
//!
//! If the required variables are missing at load time the library stays
//! loaded but forwards every call untouched.

#![cfg_attr(not(test), feature(c_variadic))]

#[cfg(any(target_os = "macos", target_os = "linux"))]
pub mod platform;

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
compile_error!("libear supports Linux and macOS only");

pub mod environment;
pub mod error;
pub mod intercept;
pub mod json;
pub mod lifecycle;
pub mod locale;
pub mod logging;
pub mod report;
pub mod resolve;
pub mod string_array;

#[cfg(not(test))]
mod hooks;

/// Process-wide lifecycle, driven by the load/unload hooks.
pub static CONTEXT: lifecycle::Context = lifecycle::Context::new();
