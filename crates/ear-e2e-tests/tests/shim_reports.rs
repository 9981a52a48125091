// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One report per intercepted call, for every primitive variant.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ear_e2e_tests::{read_reports, report_files, run, run_with_shim, shim_command, Report};
use tempfile::TempDir;

fn helper() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_exec_helper"))
}

fn helper_str() -> &'static str {
    env!("CARGO_BIN_EXE_exec_helper")
}

/// `PATH` with the helper's directory first, for the search-path variants.
fn search_path() -> OsString {
    let dir = helper().parent().map(PathBuf::from).unwrap_or_default();
    let rest = std::env::var_os("PATH").unwrap_or_default();
    std::env::join_paths(std::iter::once(dir).chain(std::env::split_paths(&rest)))
        .unwrap_or_default()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

async fn single_report(primitive: &str, program: &str) -> Result<Report> {
    let reports = TempDir::new()?;
    let mut command = shim_command(helper(), Some(reports.path()))?;
    command.args([primitive, program, "noop"]).env("PATH", search_path());
    let output = run(command).await?;

    assert!(output.status.success(), "{primitive} failed: {output:?}");
    let mut found = read_reports(reports.path())?;
    assert_eq!(found.len(), 1, "{primitive} wrote {found:?}");
    Ok(found.remove(0))
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn path_variants_report_argv_verbatim() -> Result<()> {
    for primitive in ["execve", "execv", "execl", "execle", "posix_spawn"] {
        let report = single_report(primitive, helper_str()).await?;
        assert_eq!(report.cmd, strings(&[helper_str(), "noop"]), "{primitive}");
        assert!(report.pid > 0);
    }
    Ok(())
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn search_path_variants_report_argv_verbatim() -> Result<()> {
    let mut primitives = vec!["execvp", "execlp", "posix_spawnp"];
    if cfg!(target_os = "linux") {
        primitives.push("execvpe");
    }
    if cfg!(target_os = "macos") {
        primitives.push("execvP");
    }

    for primitive in primitives {
        let report = single_report(primitive, "exec_helper").await?;
        assert_eq!(report.cmd, strings(&["exec_helper", "noop"]), "{primitive}");
    }
    Ok(())
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn report_records_escaped_arguments_and_working_directory() -> Result<()> {
    let reports = TempDir::new()?;
    let scratch = TempDir::new()?;
    let build = scratch.path().join("build");
    std::fs::create_dir(&build)?;

    let mut command = shim_command(helper(), Some(reports.path()))?;
    command
        .args(["execl", helper_str(), "noop", "hi \"there\"", r"tab\there"])
        .current_dir(&build);
    let output = run(command).await?;
    assert!(output.status.success(), "{output:?}");

    let files = report_files(reports.path())?;
    assert_eq!(files.len(), 1);
    let raw = std::fs::read_to_string(&files[0])?;
    assert!(raw.contains(r#""hi \"there\"", "tab\\there"]"#), "{raw}");

    let report = &read_reports(reports.path())?[0];
    assert_eq!(report.cmd, strings(&[helper_str(), "noop", "hi \"there\"", r"tab\there"]));
    assert_eq!(report.cwd, build.canonicalize()?);
    Ok(())
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn report_file_names_use_the_execution_prefix() -> Result<()> {
    let reports = TempDir::new()?;
    let output = run_with_shim(helper(), &["execve", helper_str(), "noop"], Some(reports.path())).await?;
    assert!(output.status.success(), "{output:?}");

    for file in report_files(reports.path())? {
        let name = file.file_name().unwrap_or_default().to_string_lossy().into_owned();
        assert!(name.starts_with("execution."), "{name}");
    }
    Ok(())
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn concurrent_spawns_write_distinct_valid_reports() -> Result<()> {
    const THREADS: usize = 8;
    let reports = TempDir::new()?;
    let count = THREADS.to_string();

    let output = run_with_shim(
        helper(),
        &["threads", &count, "posix_spawn", helper_str(), "noop"],
        Some(reports.path()),
    )
    .await?;
    assert!(output.status.success(), "{output:?}");

    let files = report_files(reports.path())?;
    assert_eq!(files.len(), THREADS);
    let found = read_reports(reports.path())?;
    assert!(found.iter().all(|r| r.cmd == strings(&[helper_str(), "noop"])));
    assert!(found.iter().all(|r| r.pid == found[0].pid), "all calls come from one process");
    Ok(())
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn failed_exec_is_reported_and_errno_reaches_the_caller() -> Result<()> {
    let reports = TempDir::new()?;
    let missing = "/nonexistent/ear-e2e-program";

    let output = run_with_shim(helper(), &["execv", missing, "noop"], Some(reports.path())).await?;

    assert_eq!(output.status.code(), Some(127), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("errno {}", libc::ENOENT)), "{stdout}");
    assert_eq!(read_reports(reports.path())?[0].cmd, strings(&[missing, "noop"]));
    Ok(())
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), ignore)]
#[tokio::test]
async fn failed_spawn_returns_the_real_error_code() -> Result<()> {
    let reports = TempDir::new()?;

    let output = run_with_shim(
        helper(),
        &["posix_spawnp", "ear-e2e-no-such-program"],
        Some(reports.path()),
    )
    .await?;

    assert_eq!(output.status.code(), Some(127), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("returned {}", libc::ENOENT)), "{stdout}");
    assert_eq!(read_reports(reports.path())?.len(), 1);
    Ok(())
}
