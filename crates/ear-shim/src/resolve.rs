// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lookup of the real implementations shadowed by this library.

use std::ffi::{c_void, CStr};
use std::mem;
use std::ptr::NonNull;

use crate::error::fatal;

/// Finds the definition of a symbol that this library shadows.
pub trait SymbolResolver {
    fn resolve(&self, symbol: &CStr) -> Option<NonNull<c_void>>;
}

/// `dlsym(RTLD_NEXT, ...)`: the next definition in load order after ours.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextSymbol;

impl SymbolResolver for NextSymbol {
    fn resolve(&self, symbol: &CStr) -> Option<NonNull<c_void>> {
        NonNull::new(unsafe { libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr()) })
    }
}

/// Resolve `symbol` as a function pointer of type `F`, exiting the process
/// if it cannot be found.
///
/// # Safety
///
/// `F` must be an `extern "C"` function pointer type matching the C
/// signature of `symbol`.
pub unsafe fn resolve_or_exit<F: Copy, R: SymbolResolver + ?Sized>(resolver: &R, symbol: &CStr) -> F {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());
    match resolver.resolve(symbol) {
        Some(address) => mem::transmute_copy(&address.as_ptr()),
        None => fatal(
            "dlsym",
            &format_args!("{}: symbol not found", symbol.to_string_lossy()),
        ),
    }
}
