// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exported symbols that shadow libc, plus the load/unload hooks.

use std::os::raw::{c_char, c_int};

use ctor::{ctor, dtor};
use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};

use crate::intercept::{Interceptor, SpawnRequest};
use crate::lifecycle::Session;
use crate::logging;
use crate::resolve::NextSymbol;
use crate::string_array::{BorrowedStringArray, OwnedStringArray};
use crate::CONTEXT;

pub(crate) fn interceptor() -> Interceptor<'static, NextSymbol> {
    Interceptor::new(&CONTEXT, &NextSymbol)
}

#[ctor]
fn on_load() {
    logging::init();
    CONTEXT.initialize(Session::capture);
}

#[dtor]
fn on_unload() {
    CONTEXT.finalize();
}

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    interceptor().execve(
        path,
        BorrowedStringArray::from_ptr(argv),
        BorrowedStringArray::from_ptr(envp),
    )
}

#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    interceptor().execv(path, BorrowedStringArray::from_ptr(argv))
}

#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    interceptor().execvp(file, BorrowedStringArray::from_ptr(argv))
}

#[no_mangle]
pub unsafe extern "C" fn execl(path: *const c_char, arg: *const c_char, mut args: ...) -> c_int {
    let argv = OwnedStringArray::from_varargs(arg, || args.arg::<*const c_char>());
    interceptor().execl(path, &argv)
}

#[no_mangle]
pub unsafe extern "C" fn execlp(file: *const c_char, arg: *const c_char, mut args: ...) -> c_int {
    let argv = OwnedStringArray::from_varargs(arg, || args.arg::<*const c_char>());
    interceptor().execlp(file, &argv)
}

/// `execle(path, arg, ..., NULL, envp)`
#[no_mangle]
pub unsafe extern "C" fn execle(path: *const c_char, arg: *const c_char, mut args: ...) -> c_int {
    let argv = OwnedStringArray::from_varargs(arg, || args.arg::<*const c_char>());
    let envp = args.arg::<*const *const c_char>();
    interceptor().execle(path, &argv, BorrowedStringArray::from_ptr(envp))
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attributes: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let request = SpawnRequest {
        pid,
        file_actions,
        attributes,
    };
    interceptor().posix_spawn(
        request,
        path,
        BorrowedStringArray::from_ptr(argv),
        BorrowedStringArray::from_ptr(envp),
    )
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attributes: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let request = SpawnRequest {
        pid,
        file_actions,
        attributes,
    };
    interceptor().posix_spawnp(
        request,
        file,
        BorrowedStringArray::from_ptr(argv),
        BorrowedStringArray::from_ptr(envp),
    )
}
