// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owned `locale_t` objects and per-thread activation.
//!
//! Report strings are decoded with `mbstowcs`, which follows the calling
//! thread's `LC_CTYPE`. The host may run under any locale, so the report
//! writer switches the thread to a locale built from the environment at load
//! time and switches back afterwards.

use std::ffi::CStr;
use std::io;
use std::marker::PhantomData;
use std::ptr;

use crate::error::{fatal, InitError};

pub struct Locale {
    raw: libc::locale_t,
}

// SAFETY: a locale object is never modified after `newlocale` returns, and
// POSIX allows the same object to be installed on several threads.
unsafe impl Send for Locale {}
unsafe impl Sync for Locale {}

impl Locale {
    /// `LC_CTYPE` as configured by the process environment (`LC_ALL`,
    /// `LC_CTYPE`, `LANG`).
    pub fn from_environment() -> Result<Self, InitError> {
        Self::with_ctype(c"").map_err(InitError::Locale)
    }

    /// `LC_CTYPE` of the named locale, e.g. `c"C.UTF-8"`.
    pub fn with_ctype(name: &CStr) -> io::Result<Self> {
        let raw = unsafe { libc::newlocale(libc::LC_CTYPE_MASK, name.as_ptr(), ptr::null_mut()) };
        if raw.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { raw })
    }

    /// Install this locale on the calling thread until the guard drops.
    pub fn activate(&self) -> io::Result<ThreadLocaleGuard<'_>> {
        let previous = unsafe { libc::uselocale(self.raw) };
        if previous.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(ThreadLocaleGuard {
            previous,
            _locale: PhantomData,
        })
    }

    pub fn as_raw(&self) -> libc::locale_t {
        self.raw
    }
}

impl Drop for Locale {
    fn drop(&mut self) {
        unsafe { libc::freelocale(self.raw) };
    }
}

impl std::fmt::Debug for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locale").field("raw", &self.raw).finish()
    }
}

/// Restores the thread's previous locale on drop.
pub struct ThreadLocaleGuard<'a> {
    previous: libc::locale_t,
    _locale: PhantomData<&'a Locale>,
}

impl Drop for ThreadLocaleGuard<'_> {
    fn drop(&mut self) {
        if unsafe { libc::uselocale(self.previous) }.is_null() {
            fatal("uselocale", &io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> libc::locale_t {
        unsafe { libc::uselocale(ptr::null_mut()) }
    }

    #[test]
    fn activation_is_scoped_to_the_guard() {
        let locale = Locale::with_ctype(c"C").expect("the C locale always exists");
        let before = current();
        {
            let _guard = locale.activate().unwrap();
            assert_eq!(current(), locale.as_raw());
        }
        assert_eq!(current(), before);
    }

    #[test]
    fn unknown_locale_is_an_error() {
        assert!(Locale::with_ctype(c"xx_NOT.A-LOCALE").is_err());
    }
}
