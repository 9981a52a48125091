// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;

fn main() {
    // OUT_DIR is <target>/<profile>/build/<pkg>-<hash>/out
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_default());
    let profile_dir = out_dir.ancestors().nth(3).map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("target")
            .join(env::var("PROFILE").unwrap_or_else(|_| "debug".into()))
    });

    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "cargo:rustc-env=EAR_E2E_PROFILE_DIR={}", profile_dir.display());

    // Re-run build script if the shim changes
    let _ = writeln!(stdout, "cargo:rerun-if-changed=../ear-shim/src");
    let _ = writeln!(stdout, "cargo:rerun-if-changed=../ear-shim/Cargo.toml");
}
