// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end tests for the exec/spawn interposition library
//!
//! This crate provides utilities to run programs with the built shim
//! preloaded and to read back the report files it writes.

#[cfg(any(target_os = "macos", target_os = "linux"))]
pub mod platform;

#[cfg(any(target_os = "macos", target_os = "linux"))]
pub use platform::*;

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;

/// Directory the shim writes its reports into.
pub const OUTPUT_DIR_VAR: &str = "INTERCEPT_BUILD_TARGET_DIR";

const RUN_TIMEOUT: Duration = Duration::from_secs(30);

static SHIM_PATH: OnceCell<PathBuf> = OnceCell::new();

/// One report file as written by the shim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Report {
    pub pid: u32,
    pub cmd: Vec<String>,
    pub cwd: PathBuf,
}

/// `target/<profile>` of the build that produced this crate.
pub fn profile_dir() -> PathBuf {
    PathBuf::from(env!("EAR_E2E_PROFILE_DIR"))
}

/// Find the path to the built shim library, building it if necessary
pub fn find_shim_path() -> Result<PathBuf> {
    SHIM_PATH.get_or_try_init(locate_or_build_shim).cloned()
}

fn locate_or_build_shim() -> Result<PathBuf> {
    let profile_dir = profile_dir();
    let candidates = [
        profile_dir.join(SHIM_FILE_NAME),
        profile_dir.join("deps").join(SHIM_FILE_NAME),
    ];
    match candidates.into_iter().find(|path| path.exists()) {
        Some(found) => Ok(found),
        None => build_shim(&profile_dir),
    }
}

fn build_shim(profile_dir: &Path) -> Result<PathBuf> {
    let profile_name = profile_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("debug")
        .to_string();
    let cargo_profile = if profile_name == "debug" { "dev" } else { profile_name.as_str() };
    // The running `cargo test` keeps the main target directory locked.
    let target_dir = profile_dir.join("ear-e2e-shim");
    let cargo = std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into());

    let status = std::process::Command::new(cargo)
        .args(["build", "-p", "ear-shim", "--profile", cargo_profile])
        .arg("--target-dir")
        .arg(&target_dir)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .status()
        .context("failed to run cargo to build ear-shim")?;
    ensure!(status.success(), "building ear-shim failed: {status}");

    let built = target_dir.join(&profile_name).join(SHIM_FILE_NAME);
    ensure!(built.exists(), "shim library not found at {}", built.display());
    Ok(built)
}

/// A command for `program` with the shim preloaded.
///
/// `output_dir` of `None` leaves the report directory variable unset.
pub fn shim_command(program: &Path, output_dir: Option<&Path>) -> Result<tokio::process::Command> {
    let shim_path = find_shim_path()?;
    let mut command = tokio::process::Command::new(program);
    command
        .env(PRELOAD_VAR, &shim_path)
        .envs(LOADER_VARS.iter().copied())
        .env_remove(OUTPUT_DIR_VAR)
        .kill_on_drop(true);
    if let Some(dir) = output_dir {
        command.env(OUTPUT_DIR_VAR, dir);
    }
    Ok(command)
}

/// Run a prepared command to completion, failing if it hangs.
pub async fn run(mut command: tokio::process::Command) -> Result<Output> {
    let output = tokio::time::timeout(RUN_TIMEOUT, command.output())
        .await
        .context("command timed out")?
        .context("failed to run command")?;
    Ok(output)
}

/// Run `program args...` with the shim preloaded and reports sent to
/// `output_dir`.
pub async fn run_with_shim(program: &Path, args: &[&str], output_dir: Option<&Path>) -> Result<Output> {
    let mut command = shim_command(program, output_dir)?;
    command.args(args);
    run(command).await
}

/// Every report in `dir`, ordered by file name.
pub fn read_reports(dir: &Path) -> Result<Vec<Report>> {
    report_files(dir)?
        .iter()
        .map(|path| {
            let contents = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_slice(&contents).with_context(|| format!("parsing {}", path.display()))
        })
        .collect()
}

/// Paths of the files in `dir`, ordered by name.
pub fn report_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    files.sort();
    Ok(files)
}
