// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Linux (glibc): `environ` is a plain exported symbol, and `execvpe` exists.

use std::os::raw::c_char;
use std::ptr;

extern "C" {
    static mut environ: *mut *mut c_char;
}

/// Address of the process-wide `environ` pointer.
pub fn environ_slot() -> *mut *mut *mut c_char {
    #[allow(unused_unsafe)]
    unsafe {
        ptr::addr_of_mut!(environ)
    }
}

#[cfg(not(test))]
mod exports {
    use std::os::raw::{c_char, c_int};

    use crate::hooks::interceptor;
    use crate::string_array::BorrowedStringArray;

    #[no_mangle]
    pub unsafe extern "C" fn execvpe(
        file: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> c_int {
        interceptor().execvpe(
            file,
            BorrowedStringArray::from_ptr(argv),
            BorrowedStringArray::from_ptr(envp),
        )
    }
}
