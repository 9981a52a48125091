// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Calls one process-creation primitive directly through libc.
//!
//! `exec_helper <primitive> <program> [args...]` runs `program` with argv
//! `[program, args...]` through the named primitive. Exec-family calls that
//! return print the errno and exit with 127. Spawn-family calls wait for the
//! child and exit with its status.

use std::ffi::{CString, OsString};
use std::io::{self, Write};
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStringExt;
use std::ptr;

/// Environment handed to children by `execle` (and `execve`/`execvpe` with
/// `--clean-env`). It deliberately lacks the preload variables.
const CLEAN_ENV: &str = "EAR_E2E=1";

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }

    let primitive = args[1].as_str();
    match primitive {
        "noop" => {}
        "print-env" => print_env(),
        "threads" => threads(&args[2..]),
        _ => {
            let Some(call) = Call::parse(&args[2..]) else {
                usage(&args[0]);
            };
            std::process::exit(call.run(primitive));
        }
    }
}

fn usage(program: &str) -> ! {
    let _ = writeln!(
        io::stderr(),
        "Usage: {program} <noop|print-env|threads N PRIMITIVE PROGRAM...|PRIMITIVE [--clean-env] PROGRAM [args...]>"
    );
    let _ = writeln!(
        io::stderr(),
        "Primitives: execve execv execvp execvpe execvP execl execlp execle posix_spawn posix_spawnp"
    );
    std::process::exit(2);
}

fn print_env() {
    let mut stdout = io::stdout();
    for (key, value) in std::env::vars_os() {
        let _ = writeln!(stdout, "{}={}", key.to_string_lossy(), value.to_string_lossy());
    }
}

/// `threads N PRIMITIVE PROGRAM...`: N concurrent spawn-family calls.
fn threads(args: &[String]) {
    let Some((count, rest)) = args.split_first() else {
        usage("exec_helper");
    };
    let Ok(count) = count.parse::<usize>() else {
        usage("exec_helper");
    };
    let Some((primitive, rest)) = rest.split_first() else {
        usage("exec_helper");
    };
    let Some(call) = Call::parse(rest) else {
        usage("exec_helper");
    };

    let failures: usize = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..count)
            .map(|_| scope.spawn(|| call.run(primitive)))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().map_or(1, |status| usize::from(status != 0)))
            .sum()
    });
    std::process::exit(if failures == 0 { 0 } else { 1 });
}

struct Call {
    clean_env: bool,
    program: CString,
    argv: Vec<CString>,
}

impl Call {
    fn parse(args: &[String]) -> Option<Self> {
        let (clean_env, args) = match args.split_first() {
            Some((flag, rest)) if flag == "--clean-env" => (true, rest),
            _ => (false, args),
        };
        let program = CString::new(args.first()?.as_str()).ok()?;
        let argv = args
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        Some(Self {
            clean_env,
            program,
            argv,
        })
    }

    fn run(&self, primitive: &str) -> c_int {
        let argv = null_terminated(&self.argv);
        let env_strings = self.environment();
        let envp = null_terminated(&env_strings);
        let path = self.program.as_ptr();

        let result = unsafe {
            match primitive {
                "execve" => libc::execve(path, argv.as_ptr(), envp.as_ptr()),
                "execv" => libc::execv(path, argv.as_ptr()),
                "execvp" => libc::execvp(path, argv.as_ptr()),
                #[cfg(target_os = "linux")]
                "execvpe" => libc::execvpe(path, argv.as_ptr(), envp.as_ptr()),
                #[cfg(target_os = "macos")]
                "execvP" => {
                    let search_path = CString::new(std::env::var("PATH").unwrap_or_default()).unwrap_or_default();
                    execvP(path, search_path.as_ptr(), argv.as_ptr())
                }
                "execl" => self.execl(|a, b, c, d| libc::execl(path, a, b, c, d, ptr::null::<c_char>())),
                "execlp" => self.execl(|a, b, c, d| libc::execlp(path, a, b, c, d, ptr::null::<c_char>())),
                "execle" => {
                    let clean = [CString::new(CLEAN_ENV).unwrap_or_default()];
                    let clean = null_terminated(&clean);
                    self.execle(path, clean.as_ptr())
                }
                "posix_spawn" | "posix_spawnp" => return spawn_and_wait(primitive, path, &argv, &envp),
                _ => usage("exec_helper"),
            }
        };

        let errno = io::Error::last_os_error();
        let _ = writeln!(
            io::stdout(),
            "{primitive} returned {result}: errno {}",
            errno.raw_os_error().unwrap_or(0)
        );
        127
    }

    fn environment(&self) -> Vec<CString> {
        if self.clean_env {
            return vec![CString::new(CLEAN_ENV).unwrap_or_default()];
        }
        std::env::vars_os()
            .filter_map(|(key, value)| {
                let mut entry: OsString = key;
                entry.push("=");
                entry.push(value);
                CString::new(entry.into_vec()).ok()
            })
            .collect()
    }

    /// Call a variadic exec with up to four arguments, padded with nulls.
    fn execl<F>(&self, call: F) -> c_int
    where
        F: FnOnce(*const c_char, *const c_char, *const c_char, *const c_char) -> c_int,
    {
        if self.argv.len() > 4 {
            let _ = writeln!(io::stderr(), "variadic forms take at most 4 arguments");
            std::process::exit(2);
        }
        let mut slots = [ptr::null::<c_char>(); 4];
        for (slot, arg) in slots.iter_mut().zip(&self.argv) {
            *slot = arg.as_ptr();
        }
        call(slots[0], slots[1], slots[2], slots[3])
    }

    /// `execle` reads envp right after the first null, so the argument list
    /// must have its exact length.
    unsafe fn execle(&self, path: *const c_char, envp: *const *const c_char) -> c_int {
        let end = ptr::null::<c_char>();
        match self.argv.iter().map(|a| a.as_ptr()).collect::<Vec<_>>()[..] {
            [a] => libc::execle(path, a, end, envp),
            [a, b] => libc::execle(path, a, b, end, envp),
            [a, b, c] => libc::execle(path, a, b, c, end, envp),
            [a, b, c, d] => libc::execle(path, a, b, c, d, end, envp),
            _ => {
                let _ = writeln!(io::stderr(), "variadic forms take 1 to 4 arguments");
                std::process::exit(2);
            }
        }
    }
}

#[cfg(target_os = "macos")]
extern "C" {
    #[allow(non_snake_case)]
    fn execvP(file: *const c_char, search_path: *const c_char, argv: *const *const c_char) -> c_int;
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

fn spawn_and_wait(
    primitive: &str,
    path: *const c_char,
    argv: &[*const c_char],
    envp: &[*const c_char],
) -> c_int {
    let mut pid: libc::pid_t = 0;
    let spawn = if primitive == "posix_spawnp" {
        libc::posix_spawnp
    } else {
        libc::posix_spawn
    };
    let result = unsafe {
        spawn(
            &mut pid,
            path,
            ptr::null(),
            ptr::null(),
            argv.as_ptr() as *const *mut c_char,
            envp.as_ptr() as *const *mut c_char,
        )
    };
    if result != 0 {
        let _ = writeln!(io::stdout(), "{primitive} returned {result}");
        return 127;
    }

    let mut status: c_int = 0;
    if unsafe { libc::waitpid(pid, &mut status, 0) } != pid {
        let _ = writeln!(io::stdout(), "waitpid failed: {}", io::Error::last_os_error());
        return 127;
    }
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else {
        128
    }
}
