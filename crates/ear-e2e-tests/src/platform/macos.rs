// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! macOS loads the shim through `DYLD_INSERT_LIBRARIES`. Interposition by
//! name only works in a flat namespace.

pub const SHIM_FILE_NAME: &str = "libear.dylib";
pub const PRELOAD_VAR: &str = "DYLD_INSERT_LIBRARIES";

/// Variables besides the preload list that the loader needs.
pub const LOADER_VARS: &[(&str, &str)] = &[("DYLD_FORCE_FLAT_NAMESPACE", "1")];
