// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One JSON report file per intercepted call.
//!
//! ```text
//! { "pid": 4242, "cmd": [ "/bin/echo", "hi"], "cwd": "/tmp/build" }
//! ```
//!
//! Files are created exclusively under a random `execution.XXXXXX` name in
//! the output directory, so concurrent calls never share a file. Nothing is
//! appended or reopened later.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::Write;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::io::IntoRawFd;
use std::path::{Path, PathBuf};

use crate::error::{EncodeError, ReportError};
use crate::json;
use crate::locale::Locale;
use crate::string_array::BorrowedStringArray;

/// File name prefix of every report.
pub const REPORT_PREFIX: &str = "execution.";
const RANDOM_SUFFIX_LEN: usize = 6;

/// A single process-creation call as it is persisted.
pub struct ReportRecord<'a> {
    pub pid: i32,
    pub cwd: &'a CStr,
    pub command: BorrowedStringArray<'a>,
}

impl ReportRecord<'_> {
    /// Serialize with the thread's current locale.
    pub fn to_json(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = format!("{{ \"pid\": {}, \"cmd\": [", self.pid).into_bytes();
        for (index, arg) in self.command.iter().enumerate() {
            if index > 0 {
                out.push(b',');
            }
            out.extend_from_slice(b" \"");
            out.extend_from_slice(&json::escape_to_vec(arg)?);
            out.push(b'"');
        }
        out.extend_from_slice(b"], \"cwd\": \"");
        out.extend_from_slice(&json::escape_to_vec(self.cwd)?);
        out.extend_from_slice(b"\" }");
        Ok(out)
    }
}

/// Record `command`, issued by this process from its current directory,
/// into a new file under `dir`. Returns the path of the written report.
pub fn write_report(
    dir: &Path,
    command: BorrowedStringArray<'_>,
    locale: &Locale,
) -> Result<PathBuf, ReportError> {
    // Encoded before the file exists: a failed call leaves nothing behind.
    let contents = {
        let _locale = locale.activate().map_err(ReportError::SwitchLocale)?;
        let cwd = current_dir()?;
        let record = ReportRecord {
            pid: nix::unistd::getpid().as_raw(),
            cwd: &cwd,
            command,
        };
        record.to_json()?
    };

    let (file, path) = create_report_file(dir)?;
    write_and_close(file, &contents)?;
    Ok(path)
}

fn create_report_file(dir: &Path) -> Result<(File, PathBuf), ReportError> {
    let create_error = |source| ReportError::CreateFile {
        dir: dir.to_path_buf(),
        source,
    };
    tempfile::Builder::new()
        .prefix(REPORT_PREFIX)
        .rand_bytes(RANDOM_SUFFIX_LEN)
        .tempfile_in(dir)
        .map_err(create_error)?
        .keep()
        .map_err(|persist| create_error(persist.error))
}

fn current_dir() -> Result<CString, ReportError> {
    let cwd = nix::unistd::getcwd().map_err(|errno| ReportError::CurrentDir(errno.into()))?;
    // Paths from getcwd never contain a NUL byte.
    Ok(CString::new(cwd.into_os_string().into_vec()).unwrap_or_default())
}

fn write_and_close(mut file: File, contents: &[u8]) -> Result<(), ReportError> {
    file.write_all(contents).map_err(ReportError::Write)?;
    // Closed by hand: dropping a File swallows close errors.
    nix::unistd::close(file.into_raw_fd()).map_err(|errno| ReportError::Close(errno.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_array::OwnedStringArray;
    use std::os::unix::fs::PermissionsExt;

    fn command(values: &[&str]) -> OwnedStringArray {
        values.iter().map(|v| CString::new(*v).unwrap()).collect()
    }

    fn c_locale() -> Locale {
        Locale::with_ctype(c"C").unwrap()
    }

    fn reports_in(dir: &Path) -> Vec<PathBuf> {
        let mut reports: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        reports.sort();
        reports
    }

    #[test]
    fn record_serializes_in_the_documented_layout() {
        let cmd = command(&["/bin/echo", "hi \"there\"", r"tab\there"]);
        let record = ReportRecord {
            pid: 4242,
            cwd: c"/tmp/build",
            command: cmd.as_borrowed(),
        };

        let json = String::from_utf8(record.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{ "pid": 4242, "cmd": [ "/bin/echo", "hi \"there\"", "tab\\there"], "cwd": "/tmp/build" }"#
        );
    }

    #[test]
    fn empty_command_is_an_empty_array() {
        let cmd = OwnedStringArray::new();
        let record = ReportRecord {
            pid: 1,
            cwd: c"/",
            command: cmd.as_borrowed(),
        };
        let json = String::from_utf8(record.to_json().unwrap()).unwrap();
        assert_eq!(json, r#"{ "pid": 1, "cmd": [], "cwd": "/" }"#);
    }

    #[test]
    fn write_report_creates_one_private_file() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = command(&["cc", "-c", "main.c", "-o", "main.o"]);

        let path = write_report(dir.path(), cmd.as_borrowed(), &c_locale()).unwrap();

        assert_eq!(reports_in(dir.path()), vec![path.clone()]);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(REPORT_PREFIX), "{name}");
        assert_eq!(name.len(), REPORT_PREFIX.len() + RANDOM_SUFFIX_LEN);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let report: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(report["pid"], std::process::id());
        assert_eq!(report["cmd"], serde_json::json!(["cc", "-c", "main.c", "-o", "main.o"]));
        assert_eq!(
            report["cwd"],
            std::env::current_dir().unwrap().to_string_lossy().as_ref()
        );
    }

    #[test]
    fn missing_directory_is_a_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");
        let cmd = command(&["true"]);

        let err = write_report(&missing, cmd.as_borrowed(), &c_locale()).unwrap_err();
        assert!(
            matches!(&err, ReportError::CreateFile { dir, .. } if dir == &missing),
            "{err}"
        );
    }

    #[test]
    fn undecodable_argument_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let locale = Locale::with_ctype(c"C.UTF-8").unwrap();
        let cmd: OwnedStringArray = [CString::new(b"a\xff".to_vec()).unwrap()].into_iter().collect();

        let err = write_report(dir.path(), cmd.as_borrowed(), &locale).unwrap_err();

        assert!(
            matches!(err, ReportError::Encode(EncodeError::InvalidMultibyte)),
            "{err}"
        );
        assert!(reports_in(dir.path()).is_empty());
    }

    #[test]
    fn concurrent_writers_get_distinct_files() {
        const WRITERS: usize = 16;
        let dir = tempfile::tempdir().unwrap();
        let locale = c_locale();

        std::thread::scope(|scope| {
            for i in 0..WRITERS {
                let (dir, locale) = (dir.path(), &locale);
                scope.spawn(move || {
                    let cmd = command(&["worker", &i.to_string()]);
                    write_report(dir, cmd.as_borrowed(), locale).unwrap();
                });
            }
        });

        let reports = reports_in(dir.path());
        assert_eq!(reports.len(), WRITERS);
        let mut seen: Vec<String> = reports
            .iter()
            .map(|path| {
                let report: serde_json::Value =
                    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
                report["cmd"][1].as_str().unwrap().to_string()
            })
            .collect();
        seen.sort_by_key(|s| s.parse::<usize>().unwrap());
        assert_eq!(seen, (0..WRITERS).map(|i| i.to_string()).collect::<Vec<_>>());
    }
}
