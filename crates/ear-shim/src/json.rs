// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! JSON string escaping for report files.
//!
//! Arguments and paths are arbitrary bytes. They are decoded as multibyte
//! text under the calling thread's locale and written back as a JSON string
//! body (no surrounding quotes) that only contains printable ASCII.
//!
//! Destination buffers must hold [`escaped_capacity`] bytes for the source
//! length: six output bytes per source byte plus a NUL terminator. Encoding
//! into anything smaller fails instead of truncating.

use std::ffi::CStr;
use std::io::Write;
use std::os::raw::c_char;
use std::ptr;

use crate::error::EncodeError;

/// Widest escape emitted per source byte (`\uXXXX`).
pub const MAX_ESCAPE_WIDTH: usize = 6;

extern "C" {
    fn mbstowcs(dest: *mut libc::wchar_t, src: *const c_char, n: libc::size_t) -> libc::size_t;
}

/// Bytes a destination buffer needs for a source of `source_len` bytes.
pub fn escaped_capacity(source_len: usize) -> usize {
    source_len * MAX_ESCAPE_WIDTH + 1
}

/// Decode `source` into code points using the thread's `LC_CTYPE`.
pub fn decode_multibyte(source: &CStr) -> Result<Vec<u32>, EncodeError> {
    let len = unsafe { mbstowcs(ptr::null_mut(), source.as_ptr(), 0) };
    if len == usize::MAX {
        return Err(EncodeError::InvalidMultibyte);
    }
    let mut wide: Vec<libc::wchar_t> = vec![0; len + 1];
    let written = unsafe { mbstowcs(wide.as_mut_ptr(), source.as_ptr(), len + 1) };
    if written != len {
        return Err(EncodeError::InvalidMultibyte);
    }
    wide.truncate(len);
    Ok(wide.into_iter().map(|c| c as u32).collect())
}

/// Escape `source` into `dst`, returning the body length (terminator excluded).
pub fn escape(source: &CStr, dst: &mut [u8]) -> Result<usize, EncodeError> {
    escape_code_points(decode_multibyte(source)?, dst)
}

/// Escape `source` into a buffer sized by [`escaped_capacity`].
pub fn escape_to_vec(source: &CStr) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = vec![0u8; escaped_capacity(source.to_bytes().len())];
    let len = escape(source, &mut buffer)?;
    buffer.truncate(len);
    Ok(buffer)
}

/// Escape already-decoded code points into `dst`, NUL-terminated.
pub fn escape_code_points<I>(code_points: I, dst: &mut [u8]) -> Result<usize, EncodeError>
where
    I: IntoIterator<Item = u32>,
{
    let capacity = dst.len();
    let overflow = |_| EncodeError::BufferTooSmall { capacity };
    let mut out: &mut [u8] = dst;

    for code_point in code_points {
        match code_point {
            0x08 => out.write_all(b"\\b"),
            0x0c => out.write_all(b"\\f"),
            0x0a => out.write_all(b"\\n"),
            0x0d => out.write_all(b"\\r"),
            0x09 => out.write_all(b"\\t"),
            0x22 => out.write_all(b"\\\""),
            0x5c => out.write_all(b"\\\\"),
            c if c > 0x10ffff => return Err(EncodeError::InvalidMultibyte),
            c if c > 0xffff => {
                let v = c - 0x10000;
                let (high, low) = (0xd800 + (v >> 10), 0xdc00 + (v & 0x3ff));
                write!(out, "\\u{high:04x}\\u{low:04x}")
            }
            c if c < 0x20 || c > 0x7f => write!(out, "\\u{c:04x}"),
            c => out.write_all(&[c as u8]),
        }
        .map_err(overflow)?;
    }

    let len = capacity - out.len();
    out.write_all(&[0]).map_err(overflow)?;
    Ok(len)
}
