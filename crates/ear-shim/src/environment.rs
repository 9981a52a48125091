// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Environment capture at load time and re-injection into forwarded calls.
//!
//! Children only keep loading this library if the preload variable (and the
//! output directory) survive into their environment. Hosts routinely build
//! a fresh environment block for a child, so every block handed to a real
//! exec/spawn primitive is patched with the values captured at load time.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::raw::c_char;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use tracing::warn;

use crate::error::InitError;
use crate::platform;
use crate::string_array::{BorrowedStringArray, OwnedStringArray};

/// Directory that receives one report file per intercepted call.
pub const ENV_OUTPUT: &str = "INTERCEPT_BUILD_TARGET_DIR";

#[cfg(target_os = "macos")]
pub const ENV_PRELOAD: &str = "DYLD_INSERT_LIBRARIES";
#[cfg(not(target_os = "macos"))]
pub const ENV_PRELOAD: &str = "LD_PRELOAD";

/// Interposition on macOS only works with a flat namespace.
#[cfg(target_os = "macos")]
pub const ENV_FLAT: &str = "DYLD_FORCE_FLAT_NAMESPACE";

/// Captured variables, in the order missing entries get appended.
#[cfg(target_os = "macos")]
pub const CAPTURED_NAMES: [&str; 3] = [ENV_OUTPUT, ENV_PRELOAD, ENV_FLAT];
#[cfg(not(target_os = "macos"))]
pub const CAPTURED_NAMES: [&str; 2] = [ENV_OUTPUT, ENV_PRELOAD];

pub const ENV_SIZE: usize = CAPTURED_NAMES.len();

/// Values of [`CAPTURED_NAMES`] as seen when the library was loaded.
///
/// Immutable once built; shared read-only by every interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    values: [Option<CString>; ENV_SIZE],
}

impl EnvironmentSnapshot {
    /// Capture from the process environment. Fails if any variable is unset.
    pub fn capture() -> Result<Self, InitError> {
        Self::capture_with(|name| std::env::var_os(name))
    }

    /// Capture through `lookup`. Every variable is required.
    pub fn capture_with<F>(mut lookup: F) -> Result<Self, InitError>
    where
        F: FnMut(&str) -> Option<OsString>,
    {
        let snapshot = Self {
            values: CAPTURED_NAMES.map(|name| lookup(name).and_then(to_c_string)),
        };

        let missing: Vec<&'static str> = snapshot
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect();
        match missing.split_first() {
            None => Ok(snapshot),
            Some((name, others)) => {
                for other in others {
                    warn!(variable = *other, "environment variable not set");
                }
                Err(InitError::MissingVariable { name: *name })
            }
        }
    }

    /// Build a snapshot from explicit values; `None` entries are skipped by
    /// [`patch`].
    pub fn from_values(values: [Option<CString>; ENV_SIZE]) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&CStr> {
        self.iter().find(|(n, _)| *n == name).and_then(|(_, value)| value)
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.get(ENV_OUTPUT).map(|dir| Path::new(OsStr::from_bytes(dir.to_bytes())))
    }

    /// `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&CStr>)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| (CAPTURED_NAMES[index], value.as_deref()))
    }
}

fn to_c_string(value: OsString) -> Option<CString> {
    CString::new(value.into_vec()).ok()
}

/// Copy `block` and set every captured variable of `snapshot` in the copy.
///
/// Existing entries keep their position; absent ones are appended in
/// snapshot order. The input block is never written to.
pub fn patch(block: BorrowedStringArray<'_>, snapshot: &EnvironmentSnapshot) -> OwnedStringArray {
    let mut result = block.to_owned_array();
    for (name, value) in snapshot.iter() {
        if let Some(value) = value {
            single_update(&mut result, name, value);
        }
    }
    result
}

/// Set `key=value` in `envs`, replacing the first `key=` entry in place or
/// appending one. Later duplicates of `key` are dropped so that the block
/// resolves `key` to a single value.
pub fn single_update(envs: &mut OwnedStringArray, key: &str, value: &CStr) {
    let mut entry = Vec::with_capacity(key.len() + 1 + value.to_bytes().len());
    entry.extend_from_slice(key.as_bytes());
    entry.push(b'=');
    entry.extend_from_slice(value.to_bytes());
    // Neither part can contain a NUL byte.
    let entry = CString::new(entry).unwrap_or_default();

    match envs.position(|e| is_entry_for(e, key)) {
        Some(index) => {
            envs.replace(index, entry);
            while let Some(duplicate) = next_entry_after(envs, key, index) {
                envs.remove(duplicate);
            }
        }
        None => envs.push(entry),
    }
}

fn next_entry_after(envs: &OwnedStringArray, key: &str, index: usize) -> Option<usize> {
    envs.iter()
        .enumerate()
        .skip(index + 1)
        .find(|(_, e)| is_entry_for(e, key))
        .map(|(i, _)| i)
}

fn is_entry_for(entry: &CStr, key: &str) -> bool {
    let bytes = entry.to_bytes();
    bytes.len() > key.len() && bytes.starts_with(key.as_bytes()) && bytes[key.len()] == b'='
}

/// The process-wide environment block (`environ`).
///
/// # Safety
///
/// The returned view is only valid until the host next modifies its
/// environment (`setenv`, `putenv`, ...).
pub unsafe fn ambient<'a>() -> BorrowedStringArray<'a> {
    BorrowedStringArray::from_mut_ptr(*platform::environ_slot())
}

/// Run `f` with `environ` pointing at `block`, restoring the previous
/// pointer afterwards on every exit path.
///
/// The substitution is visible to every thread for its duration. Another
/// thread that spawns or reads its environment inside that window observes
/// `block`; that race is inherent to overriding a process-wide pointer and
/// is accepted. No lock is taken, since the host may itself hold the libc
/// environment lock around exec calls.
///
/// # Safety
///
/// `f` must not keep references into `block` or the previous environment
/// beyond its own execution.
pub unsafe fn with_environ<R, F>(block: &OwnedStringArray, f: F) -> R
where
    F: FnOnce() -> R,
{
    let slot = platform::environ_slot();
    let original = *slot;
    *slot = block.as_ptr() as *mut *mut c_char;
    let _restore = scopeguard::guard(original, |original| *slot = original);
    f()
}

/// Serializes unit tests that swap or walk `environ`.
#[cfg(test)]
pub(crate) fn lock_environ() -> std::sync::MutexGuard<'static, ()> {
    static ENVIRON: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENVIRON.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
