// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Null-terminated string arrays (`char *const []`).
//!
//! Process arguments and environment blocks share one representation in C.
//! Two distinct types keep ownership explicit:
//!
//! - [`BorrowedStringArray`] is a read-only view over an array handed to us by
//!   the host. It has no `Drop` and offers no mutation, so it can never be
//!   released or written through.
//! - [`OwnedStringArray`] owns every string and the pointer table. It is the
//!   only array that can grow or have entries replaced, and it is released
//!   exactly once when dropped.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::ptr;

/// Read-only view over a caller-supplied null-terminated array of C strings.
#[derive(Clone, Copy)]
pub struct BorrowedStringArray<'a> {
    ptr: *const *const c_char,
    _marker: PhantomData<&'a CStr>,
}

impl<'a> BorrowedStringArray<'a> {
    /// Wrap a raw `char *const []`. A null pointer is treated as an empty array.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a null-terminated array of valid C
    /// strings that stay alive and unmodified for `'a`.
    pub unsafe fn from_ptr(ptr: *const *const c_char) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Same as [`from_ptr`](Self::from_ptr) for the `char **` spelling.
    ///
    /// # Safety
    ///
    /// See [`from_ptr`](Self::from_ptr).
    pub unsafe fn from_mut_ptr(ptr: *const *mut c_char) -> Self {
        Self::from_ptr(ptr as *const *const c_char)
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptr
    }

    /// Number of entries before the null sentinel, found by scanning.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> BorrowedIter<'a> {
        BorrowedIter {
            cursor: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Duplicate every entry into a new owned array.
    pub fn to_owned_array(&self) -> OwnedStringArray {
        self.iter().map(CStr::to_owned).collect()
    }
}

impl<'a> IntoIterator for BorrowedStringArray<'a> {
    type Item = &'a CStr;
    type IntoIter = BorrowedIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct BorrowedIter<'a> {
    cursor: *const *const c_char,
    _marker: PhantomData<&'a CStr>,
}

impl<'a> Iterator for BorrowedIter<'a> {
    type Item = &'a CStr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_null() {
            return None;
        }
        // SAFETY: the constructor contract guarantees a null-terminated array.
        let entry = unsafe { *self.cursor };
        if entry.is_null() {
            self.cursor = ptr::null();
            return None;
        }
        self.cursor = unsafe { self.cursor.add(1) };
        Some(unsafe { CStr::from_ptr(entry) })
    }
}

/// Heap-owned null-terminated array of owned C strings.
///
/// `pointers` always mirrors `strings` and ends with a null sentinel, so
/// [`as_ptr`](Self::as_ptr) can be handed straight to a C function expecting
/// `char *const []`. The `CString` buffers never move when `strings`
/// reallocates, which keeps the mirrored pointers valid.
pub struct OwnedStringArray {
    strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl OwnedStringArray {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            pointers: vec![ptr::null()],
        }
    }

    /// Collect a C variadic argument list into an owned array.
    ///
    /// `first` is the last named parameter of the variadic function; `next`
    /// pulls the following `const char *` from the list. Collection stops at
    /// the first null pointer, which is consumed but not stored.
    ///
    /// # Safety
    ///
    /// Every non-null pointer produced by `first`/`next` must be a valid C
    /// string, and the list must contain a null terminator.
    pub unsafe fn from_varargs<F>(first: *const c_char, mut next: F) -> Self
    where
        F: FnMut() -> *const c_char,
    {
        let mut array = Self::new();
        let mut current = first;
        while !current.is_null() {
            array.push(CStr::from_ptr(current).to_owned());
            current = next();
        }
        array
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn push(&mut self, value: CString) {
        let sentinel = self.pointers.len() - 1;
        self.pointers[sentinel] = value.as_ptr();
        self.pointers.push(ptr::null());
        self.strings.push(value);
    }

    /// Replace the entry at `index`, releasing the previous string.
    pub fn replace(&mut self, index: usize, value: CString) {
        self.pointers[index] = value.as_ptr();
        self.strings[index] = value;
    }

    pub fn remove(&mut self, index: usize) -> CString {
        self.pointers.remove(index);
        self.strings.remove(index)
    }

    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: FnMut(&CString) -> bool,
    {
        self.strings.iter().position(predicate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }

    /// Pointer to the null-terminated pointer table.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    /// View this array through the same type used for caller-supplied arrays.
    pub fn as_borrowed(&self) -> BorrowedStringArray<'_> {
        // SAFETY: the table is null-terminated and borrowed from `self`.
        unsafe { BorrowedStringArray::from_ptr(self.as_ptr()) }
    }
}

impl Default for OwnedStringArray {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<CString> for OwnedStringArray {
    fn from_iter<I: IntoIterator<Item = CString>>(iter: I) -> Self {
        let mut array = Self::new();
        for value in iter {
            array.push(value);
        }
        array
    }
}

impl std::fmt::Debug for OwnedStringArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.strings.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(values: &[&str]) -> OwnedStringArray {
        values.iter().map(|v| CString::new(*v).unwrap()).collect()
    }

    fn collect(array: BorrowedStringArray<'_>) -> Vec<String> {
        array.iter().map(|s| s.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn null_pointer_is_an_empty_array() {
        let array = unsafe { BorrowedStringArray::from_ptr(ptr::null()) };
        assert_eq!(array.len(), 0);
        assert!(array.is_empty());
        assert!(array.to_owned_array().is_empty());
    }

    #[test]
    fn owned_array_stays_null_terminated_while_growing() {
        let mut array = OwnedStringArray::new();
        assert!(unsafe { *array.as_ptr() }.is_null());

        for i in 0..64 {
            array.push(CString::new(format!("ENTRY_{i}=value")).unwrap());
        }

        assert_eq!(array.len(), 64);
        assert_eq!(array.as_borrowed().len(), 64);
        assert!(unsafe { *array.as_ptr().add(64) }.is_null());
        assert_eq!(collect(array.as_borrowed())[63], "ENTRY_63=value");
    }

    #[test]
    fn replace_keeps_length_and_order() {
        let mut array = owned(&["A=1", "B=2", "C=3"]);
        let index = array.position(|s| s.as_bytes().starts_with(b"B=")).unwrap();
        array.replace(index, CString::new("B=two").unwrap());

        assert_eq!(collect(array.as_borrowed()), vec!["A=1", "B=two", "C=3"]);
        assert!(unsafe { *array.as_ptr().add(3) }.is_null());
    }

    #[test]
    fn copy_of_borrowed_array_is_independent() {
        let source = owned(&["/bin/echo", "hello"]);
        let borrowed = source.as_borrowed();
        let mut copy = borrowed.to_owned_array();
        copy.push(CString::new("extra").unwrap());

        assert_eq!(collect(source.as_borrowed()), vec!["/bin/echo", "hello"]);
        assert_eq!(collect(copy.as_borrowed()), vec!["/bin/echo", "hello", "extra"]);
        assert_ne!(
            unsafe { *source.as_ptr() },
            unsafe { *copy.as_ptr() },
            "copies must not alias the source strings"
        );
    }

    #[test]
    fn varargs_collection_stops_at_the_null_marker() {
        let args = [
            CString::new("-c").unwrap(),
            CString::new("echo hi").unwrap(),
        ];
        let first = CString::new("sh").unwrap();
        let mut rest = args
            .iter()
            .map(|a| a.as_ptr())
            .chain([ptr::null(), c"never read".as_ptr()]);

        let array =
            unsafe { OwnedStringArray::from_varargs(first.as_ptr(), || rest.next().unwrap()) };

        assert_eq!(collect(array.as_borrowed()), vec!["sh", "-c", "echo hi"]);
        assert_eq!(rest.next(), Some(c"never read".as_ptr()));
    }

    #[test]
    fn varargs_with_null_first_argument_is_empty() {
        let array = unsafe {
            OwnedStringArray::from_varargs(ptr::null(), || panic!("list must not be consumed"))
        };
        assert!(array.is_empty());
        assert!(unsafe { *array.as_ptr() }.is_null());
    }
}
