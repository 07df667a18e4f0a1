//! Export and import of [`Schema`] through the Arrow C Data Interface.

use std::ffi::{CString, c_char, c_void};
use std::ptr;

use itertools::Itertools;
use quiver_array::{Schema, SchemaFlags};
use quiver_error::{QuiverResult, quiver_bail, quiver_err};
use quiver_ipc::MAX_DEPTH;

use crate::{deref_mut, raw_slice, to_i64, to_string};

/// ArrowSchema as per the Arrow C Data Interface.
#[repr(C)]
#[derive(Debug)]
pub struct ArrowSchema {
    pub format: *const c_char,
    pub name: *const c_char,
    pub metadata: *const c_char,
    pub flags: i64,
    pub n_children: i64,
    pub children: *mut *mut ArrowSchema,
    pub dictionary: *mut ArrowSchema,
    pub release: Option<unsafe extern "C" fn(*mut ArrowSchema)>,
    pub private_data: *mut c_void,
}

impl ArrowSchema {
    /// A released schema, ready to be filled in by a producer.
    pub fn empty() -> Self {
        Self {
            format: ptr::null(),
            name: ptr::null(),
            metadata: ptr::null(),
            flags: 0,
            n_children: 0,
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

impl Drop for ArrowSchema {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) }
        }
    }
}

/// Owned storage behind an exported schema.
struct SchemaPrivate {
    format: CString,
    name: Option<CString>,
    metadata: Option<Vec<u8>>,
    children: Vec<*mut ArrowSchema>,
    dictionary: *mut ArrowSchema,
}

unsafe extern "C" fn release_schema(schema: *mut ArrowSchema) {
    let Some(schema) = (unsafe { schema.as_mut() }) else {
        return;
    };
    if schema.release.is_none() {
        return;
    }
    let private = unsafe { Box::from_raw(schema.private_data.cast::<SchemaPrivate>()) };
    let SchemaPrivate {
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
    schema.release = None;
    schema.private_data = ptr::null_mut();
}

/// Move `schema` into a C structure. The consumer owns the result and must release it.
///
/// Schema metadata is passed through as-is and must use the Arrow key/value encoding.
pub fn export_schema(mut schema: Schema) -> QuiverResult<ArrowSchema> {
    if schema.is_released() {
        quiver_bail!(InvalidArgument: "cannot export a released schema");
    }
    let format = CString::new(schema.format()).map_err(|_| {
        quiver_err!(InvalidArgument: "format {} contains a NUL byte", schema.format())
    })?;
    let name = schema
        .name()
        .map(CString::new)
        .transpose()
        .map_err(|_| quiver_err!(InvalidArgument: "schema name contains a NUL byte"))?;
    let metadata = schema.metadata().map(<[u8]>::to_vec);
    if let Some(metadata) = metadata.as_deref() {
        if metadata_len(metadata) != Some(metadata.len()) {
            quiver_bail!(
                InvalidArgument: "schema metadata of {} bytes is not an Arrow key/value block",
                metadata.len()
            );
        }
    }
    let flags = schema.flags().bits();

    let children: Vec<Box<ArrowSchema>> = schema
        .take_children()
        .into_iter()
        .map(|child| export_schema(child).map(Box::new))
        .try_collect()?;
    let dictionary = schema
        .take_dictionary()
        .map(export_schema)
        .transpose()?
        .map(Box::new);
    let n_children = to_i64(children.len(), "children")?;

    let mut private = Box::new(SchemaPrivate {
        format,
        name,
        metadata,
        children: children.into_iter().map(Box::into_raw).collect(),
        dictionary: dictionary.map_or(ptr::null_mut(), Box::into_raw),
    });
    Ok(ArrowSchema {
        format: private.format.as_ptr(),
        name: private.name.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
        metadata: private
            .metadata
            .as_ref()
            .map_or(ptr::null(), |metadata| metadata.as_ptr().cast()),
        flags,
        n_children,
        children: private.children.as_mut_ptr(),
        dictionary: private.dictionary,
        release: Some(release_schema),
        private_data: Box::into_raw(private).cast(),
    })
}

/// Copy a foreign schema without taking ownership of it.
pub unsafe fn schema_from_c(schema: &ArrowSchema) -> QuiverResult<Schema> {
    unsafe { copy_schema(schema, 0) }
}

/// Copy a foreign schema and release it.
///
/// The producer's release callback is invoked whether or not the copy succeeds.
pub unsafe fn import_schema(schema: *mut ArrowSchema) -> QuiverResult<Schema> {
    let raw = unsafe { deref_mut(schema, "schema") }?;
    let result = unsafe { schema_from_c(raw) };
    if let Some(release) = raw.release {
        unsafe { release(raw) }
    }
    result
}

unsafe fn copy_schema(raw: &ArrowSchema, depth: usize) -> QuiverResult<Schema> {
    if depth > MAX_DEPTH {
        quiver_bail!(InvalidArgument: "schema nesting exceeds {} levels", MAX_DEPTH);
    }
    if raw.is_released() {
        quiver_bail!(InvalidArgument: "schema has been released");
    }
    let mut schema =
        Schema::new(unsafe { to_string(raw.format) }?).with_flags(SchemaFlags::from_bits(raw.flags));
    if !raw.name.is_null() {
        schema = schema.with_name(unsafe { to_string(raw.name) }?);
    }
    if !raw.metadata.is_null() {
        schema = schema.with_metadata(unsafe { read_metadata(raw.metadata.cast()) }?);
    }
    let children = unsafe { raw_slice(raw.children.cast_const(), raw.n_children, "schema children") }?;
    for &child in children {
        let Some(child) = (unsafe { child.as_ref() }) else {
            quiver_bail!(InvalidArgument: "schema child is null");
        };
        schema.add_child(unsafe { copy_schema(child, depth + 1) }?);
    }
    if let Some(dictionary) = unsafe { raw.dictionary.as_ref() } {
        schema.set_dictionary(unsafe { copy_schema(dictionary, depth + 1) }?);
    }
    Ok(schema)
}

/// Length of the Arrow key/value block at the start of `bytes`: an `i32` pair count followed
/// by length-prefixed keys and values, all native-endian.
#[allow(clippy::host_endian_bytes)]
fn metadata_len(bytes: &[u8]) -> Option<usize> {
    let read_len = |offset: usize| -> Option<usize> {
        let raw: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        usize::try_from(i32::from_ne_bytes(raw)).ok()
    };
    let pairs = read_len(0)?;
    let mut offset = 4usize;
    for _ in 0..pairs {
        for _ in 0..2 {
            let len = read_len(offset)?;
            offset = offset.checked_add(4)?.checked_add(len)?;
        }
    }
    (offset <= bytes.len()).then_some(offset)
}

unsafe fn read_metadata(ptr: *const u8) -> QuiverResult<Vec<u8>> {
    let read_len = |offset: usize| -> QuiverResult<usize> {
        let value = unsafe { ptr.add(offset).cast::<i32>().read_unaligned() };
        usize::try_from(value)
            .map_err(|_| quiver_err!(InvalidArgument: "negative metadata length {}", value))
    };
    let overflow = || quiver_err!(InvalidArgument: "metadata length overflows");
    let pairs = read_len(0)?;
    let mut offset = 4usize;
    for _ in 0..pairs {
        for _ in 0..2 {
            let len = read_len(offset)?;
            offset = offset
                .checked_add(4)
                .and_then(|o| o.checked_add(len))
                .ok_or_else(overflow)?;
        }
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, offset) }.to_vec())
}
