// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! macOS: shared libraries cannot link against `environ` directly, so the
//! pointer is reached through `_NSGetEnviron`. `execvP` takes its search path
//! as an argument.

use std::os::raw::c_char;

extern "C" {
    fn _NSGetEnviron() -> *mut *mut *mut c_char;
}

/// Address of the process-wide `environ` pointer.
pub fn environ_slot() -> *mut *mut *mut c_char {
    unsafe { _NSGetEnviron() }
}

#[cfg(not(test))]
mod exports {
    use std::os::raw::{c_char, c_int};

    use crate::hooks::interceptor;
    use crate::string_array::BorrowedStringArray;

    #[no_mangle]
    #[allow(non_snake_case)]
    pub unsafe extern "C" fn execvP(
        file: *const c_char,
        search_path: *const c_char,
        argv: *const *const c_char,
    ) -> c_int {
        interceptor().exec_search_path(file, search_path, BorrowedStringArray::from_ptr(argv))
    }
}
