// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Trampolines behind every exported process-creation entry point.
//!
//! Each call reports its argument list, resolves the real primitive, forwards
//! with the captured variables re-injected into the child's environment, and
//! hands back the real return value with `errno` as the primitive left it.
//!
//! | entry point      | forwarded to     | environment                    |
//! |------------------|------------------|--------------------------------|
//! | `execve`         | `execve`         | patched copy of `envp`         |
//! | `execv`, `execl` | `execve`         | patched copy of `environ`      |
//! | `execle`         | `execve`         | patched copy of trailing envp  |
//! | `execvpe`        | `execvpe`        | patched copy of `envp`         |
//! | `execvp`,`execlp`| `execvp`         | `environ` swapped for the call |
//! | `execvP`         | `execvP`         | `environ` swapped for the call |
//! | `posix_spawn[p]` | same name        | patched copy of `envp`         |
//!
//! When loading failed every argument is forwarded untouched.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::sync::Arc;

use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use nix::errno::Errno;
use tracing::debug;

use crate::environment::{self, with_environ};
use crate::error::fatal;
use crate::lifecycle::{Context, Session};
use crate::resolve::{resolve_or_exit, SymbolResolver};
use crate::string_array::{BorrowedStringArray, OwnedStringArray};

type StringArrayPtr = *const *const c_char;

pub type ExecveFn = unsafe extern "C" fn(*const c_char, StringArrayPtr, StringArrayPtr) -> c_int;
pub type ExecvpFn = unsafe extern "C" fn(*const c_char, StringArrayPtr) -> c_int;
pub type ExecSearchPathFn = unsafe extern "C" fn(*const c_char, *const c_char, StringArrayPtr) -> c_int;
pub type SpawnFn = unsafe extern "C" fn(
    *mut pid_t,
    *const c_char,
    *const posix_spawn_file_actions_t,
    *const posix_spawnattr_t,
    StringArrayPtr,
    StringArrayPtr,
) -> c_int;

/// Arguments of `posix_spawn`/`posix_spawnp` other than argv and envp.
#[derive(Clone, Copy)]
pub struct SpawnRequest {
    pub pid: *mut pid_t,
    pub file_actions: *const posix_spawn_file_actions_t,
    pub attributes: *const posix_spawnattr_t,
}

pub struct Interceptor<'a, R: ?Sized> {
    context: &'a Context,
    resolver: &'a R,
}

impl<'a, R: SymbolResolver + ?Sized> Interceptor<'a, R> {
    pub fn new(context: &'a Context, resolver: &'a R) -> Self {
        Self { context, resolver }
    }

    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `execve`.
    pub unsafe fn execve(
        &self,
        path: *const c_char,
        argv: BorrowedStringArray<'_>,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        self.exec_with_env("execve", path, argv, envp)
    }

    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `execv`.
    pub unsafe fn execv(&self, path: *const c_char, argv: BorrowedStringArray<'_>) -> c_int {
        self.exec_with_env("execv", path, argv, environment::ambient())
    }

    /// `argv` holds the collected variadic arguments.
    ///
    /// # Safety
    ///
    /// `path` must be null or a valid C string.
    pub unsafe fn execl(&self, path: *const c_char, argv: &OwnedStringArray) -> c_int {
        self.exec_with_env("execl", path, argv.as_borrowed(), environment::ambient())
    }

    /// `envp` is the trailing argument after the variadic list's terminator.
    ///
    /// # Safety
    ///
    /// `path` must be null or a valid C string and `envp` a valid block.
    pub unsafe fn execle(
        &self,
        path: *const c_char,
        argv: &OwnedStringArray,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        self.exec_with_env("execle", path, argv.as_borrowed(), envp)
    }

    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `execvpe`.
    pub unsafe fn execvpe(
        &self,
        file: *const c_char,
        argv: BorrowedStringArray<'_>,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        let session = self.announce("execvpe", argv);
        let real: ExecveFn = self.real(c"execvpe");
        forward_with_block(session.as_deref(), envp, |env| real(file, argv.as_ptr(), env))
    }

    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `execvp`.
    pub unsafe fn execvp(&self, file: *const c_char, argv: BorrowedStringArray<'_>) -> c_int {
        self.exec_search("execvp", file, argv)
    }

    /// # Safety
    ///
    /// `file` must be null or a valid C string.
    pub unsafe fn execlp(&self, file: *const c_char, argv: &OwnedStringArray) -> c_int {
        self.exec_search("execlp", file, argv.as_borrowed())
    }

    /// `execvP`: search `search_path` instead of `PATH`.
    ///
    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `execvP`.
    pub unsafe fn exec_search_path(
        &self,
        file: *const c_char,
        search_path: *const c_char,
        argv: BorrowedStringArray<'_>,
    ) -> c_int {
        let session = self.announce("execvP", argv);
        let real: ExecSearchPathFn = self.real(c"execvP");
        forward_with_environ(session.as_deref(), || real(file, search_path, argv.as_ptr()))
    }

    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `posix_spawn`.
    pub unsafe fn posix_spawn(
        &self,
        request: SpawnRequest,
        path: *const c_char,
        argv: BorrowedStringArray<'_>,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        self.spawn(c"posix_spawn", request, path, argv, envp)
    }

    /// # Safety
    ///
    /// Arguments must satisfy the C contract of `posix_spawnp`.
    pub unsafe fn posix_spawnp(
        &self,
        request: SpawnRequest,
        file: *const c_char,
        argv: BorrowedStringArray<'_>,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        self.spawn(c"posix_spawnp", request, file, argv, envp)
    }

    unsafe fn exec_with_env(
        &self,
        primitive: &str,
        path: *const c_char,
        argv: BorrowedStringArray<'_>,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        let session = self.announce(primitive, argv);
        let real: ExecveFn = self.real(c"execve");
        forward_with_block(session.as_deref(), envp, |env| real(path, argv.as_ptr(), env))
    }

    unsafe fn exec_search(&self, primitive: &str, file: *const c_char, argv: BorrowedStringArray<'_>) -> c_int {
        let session = self.announce(primitive, argv);
        let real: ExecvpFn = self.real(c"execvp");
        forward_with_environ(session.as_deref(), || real(file, argv.as_ptr()))
    }

    unsafe fn spawn(
        &self,
        symbol: &CStr,
        request: SpawnRequest,
        path: *const c_char,
        argv: BorrowedStringArray<'_>,
        envp: BorrowedStringArray<'_>,
    ) -> c_int {
        let session = self.announce(&symbol.to_string_lossy(), argv);
        let real: SpawnFn = self.real(symbol);
        forward_with_block(session.as_deref(), envp, |env| {
            real(
                request.pid,
                path,
                request.file_actions,
                request.attributes,
                argv.as_ptr(),
                env,
            )
        })
    }

    /// Log and report the call. Returns the session to forward with, if any.
    fn announce(&self, primitive: &str, argv: BorrowedStringArray<'_>) -> Option<Arc<Session>> {
        let session = self.context.session();
        debug!(primitive, args = argv.len(), reporting = session.is_some(), "intercepted");
        if let Some(session) = &session {
            if let Err(err) = session.report(argv) {
                fatal("report", &err);
            }
        }
        session
    }

    unsafe fn real<F: Copy>(&self, symbol: &CStr) -> F {
        resolve_or_exit(self.resolver, symbol)
    }
}

/// Call `f` with a patched copy of `envp`, or with `envp` itself when there
/// is no session.
unsafe fn forward_with_block<F>(session: Option<&Session>, envp: BorrowedStringArray<'_>, f: F) -> c_int
where
    F: FnOnce(StringArrayPtr) -> c_int,
{
    match session {
        Some(session) => {
            let patched = environment::patch(envp, session.environment());
            preserving_errno(f(patched.as_ptr()), patched)
        }
        None => f(envp.as_ptr()),
    }
}

/// Call `f` with `environ` temporarily replaced by a patched copy.
unsafe fn forward_with_environ<F>(session: Option<&Session>, f: F) -> c_int
where
    F: FnOnce() -> c_int,
{
    match session {
        Some(session) => {
            let patched = environment::patch(environment::ambient(), session.environment());
            let result = with_environ(&patched, f);
            preserving_errno(result, patched)
        }
        None => f(),
    }
}

/// Release `block` without disturbing the `errno` the real call left.
fn preserving_errno(result: c_int, block: OwnedStringArray) -> c_int {
    let errno = Errno::last_raw();
    drop(block);
    Errno::set_raw(errno);
    result
}
