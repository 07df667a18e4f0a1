//! Format code queries.

use std::ffi::{CStr, c_char};

use quiver_array::format::{ElementWidth, Layout};

/// Element size reported for variable-width types, whose sizes come from an offsets buffer.
pub const ELEMENT_SIZE_VARIABLE: i64 = -1;
/// Element size reported for types stored as one bit per element.
pub const ELEMENT_SIZE_BITS: i64 = -2;
/// Element size reported for unrecognised format codes.
pub const ELEMENT_SIZE_UNKNOWN: i64 = -3;

unsafe fn layout(format: *const c_char) -> Option<Layout> {
    if format.is_null() {
        return None;
    }
    let format = unsafe { CStr::from_ptr(format) }.to_string_lossy();
    Some(Layout::of(&format))
}

/// Number of physical buffers of `format`, or -1 when `format` is NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_format_n_buffers(format: *const c_char) -> i64 {
    unsafe { layout(format) }
        .and_then(|layout| i64::try_from(layout.n_buffers()).ok())
        .unwrap_or(-1)
}

/// Bytes per element of `format`: 0 for types without values, or one of the
/// `ELEMENT_SIZE_*` sentinels.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_format_element_size(format: *const c_char) -> i64 {
    match unsafe { layout(format) }.map(|layout| layout.width()) {
        Some(ElementWidth::None) => 0,
        Some(ElementWidth::Fixed(width)) => i64::try_from(width).unwrap_or(ELEMENT_SIZE_UNKNOWN),
        Some(ElementWidth::Bits) => ELEMENT_SIZE_BITS,
        Some(ElementWidth::Variable) => ELEMENT_SIZE_VARIABLE,
        Some(ElementWidth::Unknown) | None => ELEMENT_SIZE_UNKNOWN,
    }
}
