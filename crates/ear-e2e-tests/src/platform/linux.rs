// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Linux loads the shim through `LD_PRELOAD`.

pub const SHIM_FILE_NAME: &str = "libear.so";
pub const PRELOAD_VAR: &str = "LD_PRELOAD";

/// Variables besides the preload list that the loader needs.
pub const LOADER_VARS: &[(&str, &str)] = &[];
