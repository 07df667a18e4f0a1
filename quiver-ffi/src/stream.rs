//! Array streams across the C boundary.
//!
//! [`export_stream`] wraps any [`ArrayStream`] in an `ArrowArrayStream` whose callbacks pull
//! from it, and [`import_stream`] does the reverse for a stream produced elsewhere.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::io;
use std::ptr;

use quiver_array::{Array, ArrayStream, Schema};
use quiver_error::{ErrorCode, QuiverError, QuiverResult, quiver_bail, quiver_err};

use crate::array::{ArrowArray, array_from_c, export_array};
use crate::deref_mut;
use crate::schema::{ArrowSchema, export_schema, import_schema};

const EIO: c_int = 5;
const ENOMEM: c_int = 12;
const EINVAL: c_int = 22;

/// ArrowArrayStream as per the Arrow C Stream Interface.
#[repr(C)]
#[derive(Debug)]
pub struct ArrowArrayStream {
    pub get_schema:
        Option<unsafe extern "C" fn(stream: *mut ArrowArrayStream, out: *mut ArrowSchema) -> c_int>,
    pub get_next:
        Option<unsafe extern "C" fn(stream: *mut ArrowArrayStream, out: *mut ArrowArray) -> c_int>,
    pub get_last_error: Option<unsafe extern "C" fn(stream: *mut ArrowArrayStream) -> *const c_char>,
    pub release: Option<unsafe extern "C" fn(stream: *mut ArrowArrayStream)>,
    pub private_data: *mut c_void,
}

impl ArrowArrayStream {
    /// A released stream, ready to be filled in by a producer.
    pub fn empty() -> Self {
        Self {
            get_schema: None,
            get_next: None,
            get_last_error: None,
            release: None,
            private_data: ptr::null_mut(),
        }
    }

    /// Whether the release callback has already run.
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ArrowArrayStream {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) }
        }
    }
}

struct StreamPrivate {
    stream: Box<dyn ArrayStream>,
    last_error: Option<CString>,
}

impl StreamPrivate {
    fn record(&mut self, result: QuiverResult<()>) -> c_int {
        match result {
            Ok(()) => 0,
            Err(err) => {
                log::debug!("exported stream failed: {}", err.message());
                let message = err.message().replace('\0', " ");
                self.last_error = CString::new(message).ok();
                match err.code() {
                    ErrorCode::InvalidArgument => EINVAL,
                    ErrorCode::AllocationFailed => ENOMEM,
                    _ => EIO,
                }
            }
        }
    }
}

unsafe fn stream_private<'a>(stream: *mut ArrowArrayStream) -> Option<&'a mut StreamPrivate> {
    let stream = unsafe { stream.as_mut() }?;
    if stream.is_released() {
        return None;
    }
    unsafe { stream.private_data.cast::<StreamPrivate>().as_mut() }
}

unsafe extern "C" fn get_schema(stream: *mut ArrowArrayStream, out: *mut ArrowSchema) -> c_int {
    let Some(private) = (unsafe { stream_private(stream) }) else {
        return EINVAL;
    };
    let result = private.stream.schema().and_then(|schema| {
        if out.is_null() {
            quiver_bail!(InvalidArgument: "schema out-parameter is null");
        }
        let exported = export_schema(schema)?;
        unsafe { out.write(exported) };
        Ok(())
    });
    private.record(result)
}

unsafe extern "C" fn get_next(stream: *mut ArrowArrayStream, out: *mut ArrowArray) -> c_int {
    let Some(private) = (unsafe { stream_private(stream) }) else {
        return EINVAL;
    };
    if out.is_null() {
        return private.record(Err(quiver_err!(
            InvalidArgument: "array out-parameter is null"
        )));
    }
    let result = private.stream.next_array().and_then(|next| {
        let exported = match next {
            Some(array) => export_array(array)?,
            None => ArrowArray::empty(),
        };
        unsafe { out.write(exported) };
        Ok(())
    });
    private.record(result)
}

unsafe extern "C" fn get_last_error(stream: *mut ArrowArrayStream) -> *const c_char {
    unsafe { stream_private(stream) }
        .and_then(|private| private.last_error.as_ref())
        .map_or(ptr::null(), |message| message.as_ptr())
}

unsafe extern "C" fn release_stream(stream: *mut ArrowArrayStream) {
    let Some(stream) = (unsafe { stream.as_mut() }) else {
        return;
    };
    if stream.release.is_none() {
        return;
    }
    let mut private = unsafe { Box::from_raw(stream.private_data.cast::<StreamPrivate>()) };
    private.stream.release();
    drop(private);
    stream.release = None;
    stream.private_data = ptr::null_mut();
}

/// Move `stream` behind the C stream callbacks. The consumer owns the result and must release
/// it, which also releases `stream`.
///
/// The end of the stream is signalled by an `ArrowArray` whose `release` is NULL.
pub fn export_stream(stream: Box<dyn ArrayStream>) -> ArrowArrayStream {
    let private = Box::new(StreamPrivate {
        stream,
        last_error: None,
    });
    ArrowArrayStream {
        get_schema: Some(get_schema),
        get_next: Some(get_next),
        get_last_error: Some(get_last_error),
        release: Some(release_stream),
        private_data: Box::into_raw(private).cast(),
    }
}

/// An [`ArrayStream`] pulling from a foreign `ArrowArrayStream`.
pub struct ImportedArrayStream {
    raw: ArrowArrayStream,
    schema: Option<Schema>,
    last_error: Option<String>,
}

/// Take ownership of a foreign stream. The source structure is marked released.
pub unsafe fn import_stream(stream: *mut ArrowArrayStream) -> QuiverResult<ImportedArrayStream> {
    let source = unsafe { deref_mut(stream, "stream") }?;
    if source.is_released() {
        quiver_bail!(InvalidArgument: "stream has been released");
    }
    let raw = unsafe { ptr::read(source) };
    source.release = None;
    source.private_data = ptr::null_mut();
    Ok(ImportedArrayStream {
        raw,
        schema: None,
        last_error: None,
    })
}

impl ImportedArrayStream {
    fn foreign_error(&mut self, code: c_int) -> QuiverError {
        let message = self
            .raw
            .get_last_error
            .map(|get_last_error| unsafe { get_last_error(&mut self.raw) })
            .filter(|message| !message.is_null())
            .map(|message| unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("stream callback failed with error {code}"));
        if code == EINVAL {
            quiver_err!(InvalidArgument: "{}", message)
        } else {
            QuiverError::from(io::Error::other(message))
        }
    }

    fn load_schema(&mut self) -> QuiverResult<()> {
        if self.schema.is_some() {
            return Ok(());
        }
        let Some(get_schema) = self.raw.get_schema else {
            quiver_bail!(InvalidArgument: "stream has been released");
        };
        let mut out = ArrowSchema::empty();
        let code = unsafe { get_schema(&mut self.raw, &mut out) };
        if code != 0 {
            return Err(self.foreign_error(code));
        }
        self.schema = Some(unsafe { import_schema(&mut out) }?);
        Ok(())
    }

    fn read_next(&mut self) -> QuiverResult<Option<Array>> {
        if self.raw.is_released() {
            quiver_bail!(InvalidArgument: "stream has been released");
        }
        self.load_schema()?;
        let Some(get_next) = self.raw.get_next else {
            quiver_bail!(InvalidArgument: "stream has no get_next callback");
        };
        let mut out = ArrowArray::empty();
        let code = unsafe { get_next(&mut self.raw, &mut out) };
        if code != 0 {
            return Err(self.foreign_error(code));
        }
        if out.is_released() {
            log::trace!("foreign stream exhausted");
            return Ok(None);
        }
        let Some(schema) = self.schema.as_ref() else {
            quiver_bail!(InvalidArgument: "stream schema is unavailable");
        };
        // `out` is released when dropped.
        unsafe { array_from_c(&out, schema) }.map(Some)
    }
}

impl ArrayStream for ImportedArrayStream {
    fn schema(&mut self) -> QuiverResult<Schema> {
        if self.raw.is_released() {
            quiver_bail!(InvalidArgument: "stream has been released");
        }
        self.load_schema()
            .inspect_err(|e| self.last_error = Some(e.message()))?;
        self.schema
            .clone()
            .ok_or_else(|| quiver_err!(InvalidArgument: "stream schema is unavailable"))
    }

    fn next_array(&mut self) -> QuiverResult<Option<Array>> {
        self.read_next()
            .inspect_err(|e| self.last_error = Some(e.message()))
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn release(&mut self) {
        if let Some(release) = self.raw.release {
            unsafe { release(&mut self.raw) }
        }
        self.schema = None;
    }

    fn is_released(&self) -> bool {
        self.raw.is_released()
    }
}

#[cfg(test)]
mod tests {
    use quiver_array::builder::PrimitiveBuilder;
    use quiver_array::format::INT64;
    use quiver_array::{ArrayStreamAdapter, ArrayStreamExt};

    use super::*;

    fn batches() -> ArrayStreamAdapter {
        let arrays = [vec![1i64, 2], vec![3], vec![]].map(|values| {
            PrimitiveBuilder::<i64>::from_iter(values.into_iter().map(Some))
                .finish()
                .unwrap()
        });
        ArrayStreamAdapter::new(Schema::new(INT64).with_name("v"), arrays)
    }

    #[test]
    fn callbacks_yield_until_released_array() {
        let mut exported = export_stream(Box::new(batches()));
        unsafe {
            let mut schema = ArrowSchema::empty();
            assert_eq!((exported.get_schema.unwrap())(&mut exported, &mut schema), 0);
            assert_eq!(
                import_schema(&mut schema).unwrap(),
                Schema::new(INT64).with_name("v")
            );

            let get_next = exported.get_next.unwrap();
            let mut lengths = Vec::new();
            loop {
                let mut array = ArrowArray::empty();
                assert_eq!(get_next(&mut exported, &mut array), 0);
                if array.is_released() {
                    break;
                }
                lengths.push(array.length);
            }
            assert_eq!(lengths, [2, 1, 0]);
            assert!((exported.get_last_error.unwrap())(&mut exported).is_null());
        }
    }

    #[test]
    fn errors_are_reported_through_last_error() {
        let mut exported = export_stream(Box::new(batches()));
        unsafe {
            let code = (exported.get_next.unwrap())(&mut exported, ptr::null_mut());
            assert_eq!(code, EINVAL);
            let message = (exported.get_last_error.unwrap())(&mut exported);
            assert!(!message.is_null());
            assert!(CStr::from_ptr(message).to_str().unwrap().contains("null"));
        }
    }

    #[test]
    fn release_is_idempotent() {
        let mut exported = export_stream(Box::new(batches()));
        let release = exported.release.unwrap();
        unsafe {
            release(&mut exported);
            release(&mut exported);
            release(ptr::null_mut());
            let mut array = ArrowArray::empty();
            assert_eq!(get_next(&mut exported, &mut array), EINVAL);
        }
        assert!(exported.is_released());
    }

    #[test]
    fn imported_stream_round_trips() {
        let mut exported = export_stream(Box::new(batches()));
        let mut imported = unsafe { import_stream(&mut exported) }.unwrap();
        assert!(exported.is_released());
        assert_eq!(imported.schema().unwrap().name(), Some("v"));
        let arrays = imported.collect_arrays().unwrap();
        assert_eq!(arrays.len(), 3);
        assert_eq!(arrays[0].i64_value(1), 2);
        assert_eq!(arrays[1].i64_value(0), 3);
        assert!(arrays[2].is_empty());

        imported.release();
        imported.release();
        assert!(imported.is_released());
        assert!(imported.next_array().is_err());
        assert!(imported.last_error().is_some());
    }
}
