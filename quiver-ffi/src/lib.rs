#![allow(clippy::missing_safety_doc)]

//! Native interface to Quiver schemas, arrays, streams, the wire codec and files.
//!
//! Schemas, arrays and streams cross the boundary as Arrow C Data Interface structures
//! ([`ArrowSchema`], [`ArrowArray`], [`ArrowArrayStream`]). Every other object is an opaque
//! handle created and freed through the functions in this crate. Fallible functions take a
//! trailing `quiver_error **` out-parameter which is set to NULL on success.

pub mod array;
pub mod error;
pub mod file;
pub mod format;
pub mod ipc;
pub mod log;
pub mod schema;
pub mod session;
pub mod stream;

use std::ffi::{CStr, c_char};
use std::slice;

pub use array::{ArrowArray, export_array, import_array};
use quiver_error::{QuiverResult, quiver_bail, quiver_err};
pub use schema::{ArrowSchema, export_schema, import_schema};
pub use stream::{ArrowArrayStream, export_stream, import_stream};

pub(crate) unsafe fn to_string(ptr: *const c_char) -> QuiverResult<String> {
    if ptr.is_null() {
        quiver_bail!(InvalidArgument: "null string");
    }
    let c_str = unsafe { CStr::from_ptr(ptr) };
    Ok(c_str.to_string_lossy().into_owned())
}

/// Turn a possibly NULL pointer into a reference, failing with an invalid-argument error.
pub(crate) unsafe fn deref<'a, T>(ptr: *const T, what: &str) -> QuiverResult<&'a T> {
    match unsafe { ptr.as_ref() } {
        Some(value) => Ok(value),
        None => quiver_bail!(InvalidArgument: "{} is null", what),
    }
}

pub(crate) unsafe fn deref_mut<'a, T>(ptr: *mut T, what: &str) -> QuiverResult<&'a mut T> {
    match unsafe { ptr.as_mut() } {
        Some(value) => Ok(value),
        None => quiver_bail!(InvalidArgument: "{} is null", what),
    }
}

/// View a C array of `len` elements. An empty array may be NULL.
pub(crate) unsafe fn raw_slice<'a, T>(ptr: *const T, len: i64, what: &str) -> QuiverResult<&'a [T]> {
    let len = to_usize(len, what)?;
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        quiver_bail!(InvalidArgument: "{} is null but has {} entries", what, len);
    }
    Ok(unsafe { slice::from_raw_parts(ptr, len) })
}

pub(crate) fn to_usize(value: i64, what: &str) -> QuiverResult<usize> {
    usize::try_from(value).map_err(|_| quiver_err!(InvalidArgument: "{} of {}", what, value))
}

pub(crate) fn to_i64(value: usize, what: &str) -> QuiverResult<i64> {
    i64::try_from(value).map_err(|_| quiver_err!(InvalidArgument: "{} of {}", what, value))
}
