//! Wire codec entry points.
//!
//! Serialized messages are returned as heap buffers owned by the caller, who frees them with
//! [`quiver_bytes_free`].

use std::ptr;
use std::slice;

use quiver_buffer::ByteBuffer;
use ::quiver_error::{QuiverResult, quiver_bail};
use quiver_ipc::{
    decode_array, decode_batch, decode_schema, encode_array, encode_batch, encode_schema,
};

use crate::array::{ArrowArray, array_from_c, export_array};
use crate::error::{quiver_error, try_or};
use crate::schema::{ArrowSchema, export_schema, schema_from_c};
use crate::{deref, to_i64};

unsafe fn into_raw_bytes(buffer: ByteBuffer, len: *mut usize) -> *mut u8 {
    let bytes = buffer.into_vec().into_boxed_slice();
    unsafe { len.write(bytes.len()) };
    Box::into_raw(bytes).cast()
}

unsafe fn input<'a>(data: *const u8, len: usize) -> QuiverResult<&'a [u8]> {
    if data.is_null() {
        if len == 0 {
            return Ok(&[]);
        }
        quiver_bail!(InvalidArgument: "input is null");
    }
    // Bounds the length the same way slice construction requires.
    to_i64(len, "input length")?;
    Ok(unsafe { slice::from_raw_parts(data, len) })
}

fn check_len(len: *mut usize) -> QuiverResult<()> {
    if len.is_null() {
        quiver_bail!(InvalidArgument: "length out-parameter is null");
    }
    Ok(())
}

/// Serialize a standalone schema message. The schema is not released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_serialize_schema(
    schema: *const ArrowSchema,
    len: *mut usize,
    error: *mut *mut quiver_error,
) -> *mut u8 {
    try_or(error, ptr::null_mut(), || {
        check_len(len)?;
        let schema = unsafe { schema_from_c(deref(schema, "schema")?) }?;
        let bytes = encode_schema(&schema)?;
        Ok(unsafe { into_raw_bytes(bytes, len) })
    })
}

/// Serialize a standalone array message for an array described by `schema`. Neither argument
/// is released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_serialize_array(
    array: *const ArrowArray,
    schema: *const ArrowSchema,
    len: *mut usize,
    error: *mut *mut quiver_error,
) -> *mut u8 {
    try_or(error, ptr::null_mut(), || {
        check_len(len)?;
        let schema = unsafe { schema_from_c(deref(schema, "schema")?) }?;
        let array = unsafe { array_from_c(deref(array, "array")?, &schema) }?;
        let bytes = encode_array(&array, &schema)?;
        Ok(unsafe { into_raw_bytes(bytes, len) })
    })
}

/// Serialize a batch message holding both `schema` and `array`. Neither argument is released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_serialize_batch(
    schema: *const ArrowSchema,
    array: *const ArrowArray,
    len: *mut usize,
    error: *mut *mut quiver_error,
) -> *mut u8 {
    try_or(error, ptr::null_mut(), || {
        check_len(len)?;
        let schema = unsafe { schema_from_c(deref(schema, "schema")?) }?;
        let array = unsafe { array_from_c(deref(array, "array")?, &schema) }?;
        let bytes = encode_batch(&schema, &array)?;
        Ok(unsafe { into_raw_bytes(bytes, len) })
    })
}

/// Decode a schema message into `out`, which the caller must release.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_deserialize_schema(
    data: *const u8,
    len: usize,
    out: *mut ArrowSchema,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        if out.is_null() {
            quiver_bail!(InvalidArgument: "schema out-parameter is null");
        }
        let schema = decode_schema(unsafe { input(data, len) }?)?;
        let exported = export_schema(schema)?;
        unsafe { out.write(exported) };
        Ok(true)
    })
}

/// Decode an array message into `out`, which the caller must release.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_deserialize_array(
    data: *const u8,
    len: usize,
    out: *mut ArrowArray,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        if out.is_null() {
            quiver_bail!(InvalidArgument: "array out-parameter is null");
        }
        let array = decode_array(unsafe { input(data, len) }?)?;
        let exported = export_array(array)?;
        unsafe { out.write(exported) };
        Ok(true)
    })
}

/// Decode a batch message into `out_schema` and `out_array`, which the caller must release.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_deserialize_batch(
    data: *const u8,
    len: usize,
    out_schema: *mut ArrowSchema,
    out_array: *mut ArrowArray,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        if out_schema.is_null() || out_array.is_null() {
            quiver_bail!(InvalidArgument: "batch out-parameter is null");
        }
        let (schema, array) = decode_batch(unsafe { input(data, len) }?)?;
        let schema = export_schema(schema)?;
        let array = export_array(array)?;
        unsafe {
            out_schema.write(schema);
            out_array.write(array);
        }
        Ok(true)
    })
}

/// Free a buffer returned by one of the `quiver_serialize_*` functions. Freeing NULL does
/// nothing.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_bytes_free(data: *mut u8, len: usize) {
    if !data.is_null() {
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)) });
    }
}
