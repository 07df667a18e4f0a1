//! Export and import of [`Array`] through the Arrow C Data Interface, and typed value access
//! over foreign arrays.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;

use itertools::Itertools;
use quiver_array::{Array, NullState, Schema};
use quiver_buffer::{ByteBuffer, NativeType, get_bit};
use quiver_error::{QuiverResult, quiver_bail};
use quiver_ipc::MAX_DEPTH;

use crate::{deref_mut, raw_slice, to_i64, to_usize};

/// ArrowArray as per the Arrow C Data Interface.
#[repr(C)]
#[derive(Debug)]
pub struct ArrowArray {
    pub length: i64,
    pub null_count: i64,
    pub offset: i64,
    pub n_buffers: i64,
    pub n_children: i64,
    pub buffers: *mut *const c_void,
    pub children: *mut *mut ArrowArray,
    pub dictionary: *mut ArrowArray,
    pub release: Option<unsafe extern "C" fn(*mut ArrowArray)>,
    pub private_data: *mut c_void,
}

impl ArrowArray {
    /// A released array. Streams yield it to signal their end.
    pub fn empty() -> Self {
        Self {
            length: 0,
            null_count: 0,
            offset: 0,
            n_buffers: 0,
            n_children: 0,
            buffers: ptr::null_mut(),
            children: ptr::null_mut(),
            dictionary: ptr::null_mut(),
            release: None,
            private_data: ptr::null_mut(),
        }
    }

    /// Whether the release callback has already run.
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ArrowArray {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) }
        }
    }
}

/// Keeps the buffers of an exported array alive until it is released.
struct ArrayPrivate {
    // Only held so the pointers below stay valid.
    _buffers: Vec<Option<ByteBuffer>>,
    buffer_ptrs: Vec<*const c_void>,
    children: Vec<*mut ArrowArray>,
    dictionary: *mut ArrowArray,
}

unsafe extern "C" fn release_array(array: *mut ArrowArray) {
    let Some(array) = (unsafe { array.as_mut() }) else {
        return;
    };
    if array.release.is_none() {
        return;
    }
    let private = unsafe { Box::from_raw(array.private_data.cast::<ArrayPrivate>()) };
    let ArrayPrivate {
        children,
        dictionary,
        ..
    } = *private;
    for child in children {
        drop(unsafe { Box::from_raw(child) });
    }
    if !dictionary.is_null() {
        drop(unsafe { Box::from_raw(dictionary) });
    }
    array.release = None;
    array.private_data = ptr::null_mut();
}

/// Move `array` into a C structure without copying its buffers. The consumer owns the result
/// and must release it.
pub fn export_array(mut array: Array) -> QuiverResult<ArrowArray> {
    if array.is_released() {
        quiver_bail!(InvalidArgument: "cannot export a released array");
    }
    let children: Vec<Box<ArrowArray>> = array
        .take_children()
        .into_iter()
        .map(|child| export_array(child).map(Box::new))
        .try_collect()?;
    let dictionary = array
        .take_dictionary()
        .map(export_array)
        .transpose()?
        .map(Box::new);
    let buffers: Vec<Option<ByteBuffer>> = (0..array.n_buffers())
        .map(|index| array.take_buffer(index))
        .collect();
    let buffer_ptrs = buffers
        .iter()
        .map(|buffer| {
            buffer
                .as_ref()
                .map_or(ptr::null(), |buffer| buffer.as_slice().as_ptr().cast())
        })
        .collect();

    let length = to_i64(array.len(), "length")?;
    let null_count = to_i64(array.null_count(), "null count")?;
    let offset = to_i64(array.offset(), "offset")?;
    let n_buffers = to_i64(buffers.len(), "buffers")?;
    let n_children = to_i64(children.len(), "children")?;

    let mut private = Box::new(ArrayPrivate {
        _buffers: buffers,
        buffer_ptrs,
        children: children.into_iter().map(Box::into_raw).collect(),
        dictionary: dictionary.map_or(ptr::null_mut(), Box::into_raw),
    });
    Ok(ArrowArray {
        length,
        null_count,
        offset,
        n_buffers,
        n_children,
        buffers: private.buffer_ptrs.as_mut_ptr(),
        children: private.children.as_mut_ptr(),
        dictionary: private.dictionary,
        release: Some(release_array),
        private_data: Box::into_raw(private).cast(),
    })
}

/// Copy a foreign array described by `schema` without taking ownership of it.
///
/// Buffer sizes are not part of the interface; they are derived from the schema's format code
/// and the array's `offset + length`.
pub unsafe fn array_from_c(array: &ArrowArray, schema: &Schema) -> QuiverResult<Array> {
    unsafe { copy_array(array, schema, 0) }
}

/// Copy a foreign array and release it.
///
/// The producer's release callback is invoked whether or not the copy succeeds.
pub unsafe fn import_array(array: *mut ArrowArray, schema: &Schema) -> QuiverResult<Array> {
    let raw = unsafe { deref_mut(array, "array") }?;
    let result = unsafe { array_from_c(raw, schema) };
    if let Some(release) = raw.release {
        unsafe { release(raw) }
    }
    result
}

unsafe fn copy_array(raw: &ArrowArray, schema: &Schema, depth: usize) -> QuiverResult<Array> {
    if depth > MAX_DEPTH {
        quiver_bail!(InvalidArgument: "array nesting exceeds {} levels", MAX_DEPTH);
    }
    if raw.is_released() {
        quiver_bail!(InvalidArgument: "array has been released");
    }
    let length = to_usize(raw.length, "length")?;
    let offset = to_usize(raw.offset, "offset")?;
    let Some(extent) = offset.checked_add(length) else {
        quiver_bail!(InvalidArgument: "offset {} plus length {} overflows", offset, length);
    };

    let layout = schema.layout();
    let mut array = Array::new(length).with_offset(offset);
    let buffers = unsafe { raw_slice(raw.buffers.cast_const(), raw.n_buffers, "buffers") }?;
    array.set_n_buffers(buffers.len());
    for (index, &data) in buffers.iter().enumerate() {
        if data.is_null() {
            continue;
        }
        let len = layout.buffer_len(index, extent, array.buffer(1))?;
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) };
        array.set_buffer(index, ByteBuffer::copy_from(bytes)?);
    }
    // -1 means the producer did not compute the null count.
    let null_count = match raw.null_count {
        -1 => array.buffer(0).map_or(0, |validity| {
            (offset..extent)
                .filter(|&i| !get_bit(validity, i))
                .count()
        }),
        n => to_usize(n, "null count")?,
    };
    array.set_null_count(null_count);

    let children =
        unsafe { raw_slice(raw.children.cast_const(), raw.n_children, "array children") }?;
    if children.len() != schema.n_children() {
        quiver_bail!(
            InvalidArgument: "array has {} children, schema {} has {}",
            children.len(),
            schema,
            schema.n_children()
        );
    }
    for (&child, child_schema) in children.iter().zip(schema.children()) {
        let Some(child) = (unsafe { child.as_ref() }) else {
            quiver_bail!(InvalidArgument: "array child is null");
        };
        array.add_child(unsafe { copy_array(child, child_schema, depth + 1) }?);
    }
    if let Some(dictionary) = unsafe { raw.dictionary.as_ref() } {
        let Some(dictionary_schema) = schema.dictionary() else {
            quiver_bail!(InvalidArgument: "array has a dictionary but schema {} does not", schema);
        };
        array.set_dictionary(unsafe { copy_array(dictionary, dictionary_schema, depth + 1) }?);
    }
    Ok(array)
}

/// Pointer to buffer `index`, or NULL when it is absent.
unsafe fn raw_buffer(array: &ArrowArray, index: usize) -> *const u8 {
    let n_buffers = usize::try_from(array.n_buffers).unwrap_or(0);
    if index >= n_buffers || array.buffers.is_null() {
        return ptr::null();
    }
    unsafe { *array.buffers.add(index) }.cast()
}

unsafe fn raw_bit(bitmap: *const u8, index: usize) -> bool {
    (unsafe { *bitmap.add(index / 8) } & (1 << (index % 8))) != 0
}

/// Validity of slot `index` together with its physical position in the data buffers.
///
/// The validity bitmap is read at `index`, without the array offset.
unsafe fn slot(array: *const ArrowArray, index: i64) -> (NullState, usize) {
    let Some(array) = (unsafe { array.as_ref() }) else {
        return (NullState::Invalid, 0);
    };
    let (Ok(index), Ok(length), Ok(offset)) = (
        usize::try_from(index),
        usize::try_from(array.length),
        usize::try_from(array.offset),
    ) else {
        return (NullState::Invalid, 0);
    };
    if array.is_released() || index >= length {
        return (NullState::Invalid, 0);
    }
    let position = index + offset;
    if array.null_count == 0 {
        return (NullState::Valid, position);
    }
    let validity = unsafe { raw_buffer(array, 0) };
    if validity.is_null() || unsafe { raw_bit(validity, index) } {
        (NullState::Valid, position)
    } else {
        (NullState::Null, position)
    }
}

unsafe fn fixed_value<T: NativeType>(array: *const ArrowArray, index: i64) -> Option<T> {
    let (NullState::Valid, position) = (unsafe { slot(array, index) }) else {
        return None;
    };
    let values = unsafe { raw_buffer(&*array, 1) };
    if values.is_null() {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(values.add(position * T::WIDTH), T::WIDTH) };
    Some(T::read_le(bytes))
}

/// Start and end of slot `index` in the data buffer of a UTF-8 or binary array.
unsafe fn var_range(array: *const ArrowArray, index: i64) -> Option<(*const u8, usize)> {
    let (NullState::Valid, position) = (unsafe { slot(array, index) }) else {
        return None;
    };
    let array = unsafe { &*array };
    let offsets = unsafe { raw_buffer(array, 1) }.cast::<i32>();
    if offsets.is_null() {
        return None;
    }
    let start = unsafe { offsets.add(position).read_unaligned() };
    let end = unsafe { offsets.add(position + 1).read_unaligned() };
    let (Ok(start), Ok(end)) = (usize::try_from(start), usize::try_from(end)) else {
        return None;
    };
    let len = end.checked_sub(start)?;
    let data = unsafe { raw_buffer(array, 2) };
    match (data.is_null(), len) {
        (true, 0) => Some((ptr::NonNull::<u8>::dangling().as_ptr().cast_const(), 0)),
        (true, _) => None,
        (false, _) => Some((unsafe { data.add(start) }, len)),
    }
}

/// Tri-state null check: `1` when slot `index` is null, `0` when it is valid, `-1` when the array
/// is NULL or released or the index is out of range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_array_is_null(array: *const ArrowArray, index: i64) -> c_int {
    unsafe { slot(array, index) }.0.as_i32()
}

/// Boolean at `index`, or `false` when the slot is null or out of range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_array_get_bool(array: *const ArrowArray, index: i64) -> bool {
    let (NullState::Valid, position) = (unsafe { slot(array, index) }) else {
        return false;
    };
    let values = unsafe { raw_buffer(&*array, 1) };
    !values.is_null() && unsafe { raw_bit(values, position) }
}

macro_rules! array_getter {
    ($($name:ident => $T:ty),* $(,)?) => {
        paste::paste! {
            $(
                #[doc = concat!("Value at `index` read as `", stringify!($T), "`, or zero when the slot is null or out of range.")]
                #[unsafe(no_mangle)]
                pub unsafe extern "C" fn [<quiver_array_get_ $name>](array: *const ArrowArray, index: i64) -> $T {
                    unsafe { fixed_value::<$T>(array, index) }.unwrap_or_default()
                }
            )*
        }
    };
}

array_getter! {
    i8 => i8,
    u8 => u8,
    i16 => i16,
    u16 => u16,
    i32 => i32,
    u32 => u32,
    i64 => i64,
    u64 => u64,
    f32 => f32,
    f64 => f64,
    date32 => i32,
    date64 => i64,
    time32 => i32,
    time64 => i64,
    timestamp => i64,
    duration => i64,
}

/// Newly allocated NUL-terminated copy of the string at `index`, or NULL when the slot is null
/// or out of range. Free it with `quiver_string_free`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_array_get_utf8(array: *const ArrowArray, index: i64) -> *mut c_char {
    let Some((data, len)) = (unsafe { var_range(array, index) }) else {
        return ptr::null_mut();
    };
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    let text = String::from_utf8_lossy(bytes).replace('\0', " ");
    CString::new(text).map_or(ptr::null_mut(), CString::into_raw)
}

/// View of the bytes at `index`, valid while the array is alive. Returns NULL when the slot is
/// null or out of range; `len` receives the length in bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_array_get_binary(
    array: *const ArrowArray,
    index: i64,
    len: *mut usize,
) -> *const u8 {
    let (data, size) = unsafe { var_range(array, index) }.unwrap_or((ptr::null(), 0));
    if !len.is_null() {
        unsafe { len.write(size) };
    }
    data
}

/// Free a string returned by `quiver_array_get_utf8`. Freeing NULL does nothing.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_string_free(string: *mut c_char) {
    if !string.is_null() {
        drop(unsafe { CString::from_raw(string) });
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use quiver_array::builder::{BoolBuilder, PrimitiveBuilder, Utf8Builder};
    use quiver_array::format::{BOOL, INT32, INT64, UTF8};
    use quiver_error::ErrorCode;

    use super::*;

    fn ints() -> Array {
        PrimitiveBuilder::<i32>::from_iter([Some(1), None, Some(3), Some(4)])
            .finish()
            .unwrap()
    }

    fn strings() -> Array {
        let mut builder = Utf8Builder::new();
        builder.append_value("ab").unwrap();
        builder.append_null().unwrap();
        builder.append_value("").unwrap();
        builder.append_value("xyz").unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn exported_values_are_readable() {
        let exported = export_array(ints()).unwrap();
        assert_eq!(exported.length, 4);
        assert_eq!(exported.null_count, 1);
        assert_eq!(exported.n_buffers, 2);
        unsafe {
            assert_eq!(quiver_array_get_i32(&exported, 0), 1);
            assert_eq!(quiver_array_is_null(&exported, 1), 1);
            assert_eq!(quiver_array_get_i32(&exported, 1), 0);
            assert_eq!(quiver_array_get_i32(&exported, 3), 4);
            assert_eq!(quiver_array_is_null(&exported, 3), 0);
            assert_eq!(quiver_array_is_null(&exported, 4), -1);
            assert_eq!(quiver_array_is_null(&exported, -1), -1);
            assert_eq!(quiver_array_get_i32(&exported, 9), 0);
            assert_eq!(quiver_array_is_null(ptr::null(), 0), -1);
        }
    }

    #[test]
    fn exported_strings_are_readable() {
        let exported = export_array(strings()).unwrap();
        unsafe {
            let first = quiver_array_get_utf8(&exported, 0);
            assert_eq!(CStr::from_ptr(first).to_str().unwrap(), "ab");
            quiver_string_free(first);
            assert!(quiver_array_get_utf8(&exported, 1).is_null());

            let mut len = 99;
            let empty = quiver_array_get_binary(&exported, 2, &mut len);
            assert!(!empty.is_null());
            assert_eq!(len, 0);
            let last = quiver_array_get_binary(&exported, 3, &mut len);
            assert_eq!(std::slice::from_raw_parts(last, len), b"xyz");
            quiver_string_free(ptr::null_mut());
        }
    }

    #[test]
    fn offsets_apply_to_values_but_not_validity() {
        let sliced = PrimitiveBuilder::<i64>::from_iter([Some(10), Some(20), None, Some(40)])
            .finish()
            .unwrap()
            .slice(1, 3)
            .unwrap();
        let exported = export_array(sliced).unwrap();
        assert_eq!(exported.offset, 1);
        unsafe {
            assert_eq!(quiver_array_get_i64(&exported, 0), 20);
            // Validity bit 2 belongs to slot 2 of the unsliced array.
            assert_eq!(quiver_array_is_null(&exported, 2), 1);
            assert_eq!(quiver_array_get_i64(&exported, 1), 0);
        }
    }

    #[test]
    fn round_trip_through_import() {
        let mut exported = export_array(strings()).unwrap();
        let imported = unsafe { import_array(&mut exported, &Schema::new(UTF8)) }.unwrap();
        assert!(exported.is_released());
        assert_eq!(imported.len(), 4);
        assert_eq!(imported.null_count(), 1);
        assert_eq!(imported.utf8_value(3).as_deref(), Some("xyz"));
        assert_eq!(imported.utf8_value(2).as_deref(), Some(""));

        let mut bools = BoolBuilder::new();
        bools.append_option(Some(true));
        bools.append_option(None);
        bools.append_option(Some(false));
        let bools = bools.finish().unwrap();
        let parent = Array::new_struct(3, [bools, ints().slice(0, 3).unwrap()]);
        let schema = Schema::new_struct([Schema::new(BOOL), Schema::new(INT32)]);
        let mut exported = export_array(parent).unwrap();
        let imported = unsafe { import_array(&mut exported, &schema) }.unwrap();
        assert_eq!(imported.n_children(), 2);
        assert!(imported.child(0).unwrap().bool_value(0));
        assert!(imported.child(0).unwrap().is_null(1));
        assert_eq!(imported.child(1).unwrap().i32_value(2), 3);
    }

    #[test]
    fn release_is_idempotent() {
        let parent = Array::new_struct(4, [ints()]);
        let mut exported = export_array(parent).unwrap();
        let release = exported.release.unwrap();
        unsafe {
            release(&mut exported);
            release(&mut exported);
            release(ptr::null_mut());
        }
        assert!(exported.is_released());
        assert_eq!(unsafe { quiver_array_get_i32(&exported, 0) }, 0);
    }

    #[test]
    fn mismatched_schema_is_rejected_and_released() {
        let mut exported = export_array(Array::new_struct(4, [ints()])).unwrap();
        let err = unsafe { import_array(&mut exported, &Schema::new(INT64)) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(exported.is_released());

        let mut empty = ArrowArray::empty();
        let err = unsafe { import_array(&mut empty, &Schema::new(INT64)) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    unsafe extern "C" fn release_in_place(array: *mut ArrowArray) {
        unsafe { (*array).release = None };
    }

    #[test]
    fn oversized_foreign_length_is_rejected() {
        let values = 7i64.to_le_bytes();
        let mut buffers = [ptr::null(), values.as_ptr().cast::<c_void>()];
        let mut raw = ArrowArray::empty();
        raw.length = 1 << 62;
        raw.n_buffers = 2;
        raw.buffers = buffers.as_mut_ptr();
        raw.release = Some(release_in_place);
        let err = unsafe { import_array(&mut raw, &Schema::new(INT64)) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(raw.is_released());
    }
}
