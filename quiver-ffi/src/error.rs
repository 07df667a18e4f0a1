use std::ffi::{CString, c_char, c_int};
use std::ptr;

use ::quiver_error::{ErrorCode, QuiverError, QuiverResult};

/// An error returned through a `quiver_error **` out-parameter.
#[allow(non_camel_case_types)]
pub struct quiver_error {
    code: c_int,
    message: CString,
}

impl From<QuiverError> for quiver_error {
    fn from(err: QuiverError) -> Self {
        let message = err.message().replace('\0', " ");
        Self {
            code: err.code().as_i32(),
            message: CString::new(message).unwrap_or_default(),
        }
    }
}

/// Run `function`, storing any failure into `error` and returning `default_value` in that case.
///
/// `error` may be NULL, in which case failures are only logged.
pub(crate) fn try_or<T>(
    error: *mut *mut quiver_error,
    default_value: T,
    function: impl FnOnce() -> QuiverResult<T>,
) -> T {
    match function() {
        Ok(value) => {
            if !error.is_null() {
                unsafe { error.write(ptr::null_mut()) };
            }
            value
        }
        Err(err) => {
            log::debug!("native call failed: {}", err.message());
            if !error.is_null() {
                let boxed = Box::new(quiver_error::from(err));
                unsafe { error.write(Box::into_raw(boxed)) };
            }
            default_value
        }
    }
}

/// The numeric code of `error`, see `ErrorCode`. A NULL error reports success.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_error_code(error: *const quiver_error) -> c_int {
    match unsafe { error.as_ref() } {
        Some(error) => error.code,
        None => ErrorCode::Ok.as_i32(),
    }
}

/// The message of `error`. The string is owned by the error and lives until it is freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_error_message(error: *const quiver_error) -> *const c_char {
    match unsafe { error.as_ref() } {
        Some(error) => error.message.as_ptr(),
        None => ptr::null(),
    }
}

/// Free an error. Freeing NULL does nothing.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_error_free(error: *mut quiver_error) {
    if !error.is_null() {
        drop(unsafe { Box::from_raw(error) })
    }
}
