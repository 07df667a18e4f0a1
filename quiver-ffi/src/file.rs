//! File writer and reader handles.

use std::ffi::{c_char, c_int};
use std::fs::File;
use std::io::BufWriter;
use std::ptr;

use itertools::Itertools;
use ::quiver_error::{QuiverResult, quiver_bail, quiver_err};
use quiver_file::{CompressionCodec, FileArrayStream, FileReader, FileWriter};

use crate::array::{ArrowArray, import_array};
use crate::error::{quiver_error, try_or};
use crate::schema::{ArrowSchema, export_schema, schema_from_c};
use crate::session::quiver_session;
use crate::stream::{ArrowArrayStream, export_stream, import_stream};
use crate::{deref, deref_mut, raw_slice, to_i64, to_string, to_usize};

/// An open file writer.
#[allow(non_camel_case_types)]
pub struct quiver_file_writer {
    inner: FileWriter<BufWriter<File>>,
}

/// An open file reader.
#[allow(non_camel_case_types)]
pub struct quiver_file_reader {
    inner: FileReader<File>,
}

/// Create or truncate the file at `path` and start writing arrays described by `schema`.
///
/// The schema is copied and not released. A NULL `session` uses a default session.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_writer_open(
    path: *const c_char,
    schema: *const ArrowSchema,
    session: *const quiver_session,
    error: *mut *mut quiver_error,
) -> *mut quiver_file_writer {
    try_or(error, ptr::null_mut(), || {
        let path = unsafe { to_string(path) }?;
        let schema = unsafe { schema_from_c(deref(schema, "schema")?) }?;
        let session = unsafe { quiver_session::resolve(session) };
        let inner = FileWriter::create(path, schema, session)?;
        Ok(Box::into_raw(Box::new(quiver_file_writer { inner })))
    })
}

/// Select the codec for row groups written after this call: 0 uncompressed, 1 LZ4, 2 Zstd.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_writer_set_compression(
    writer: *mut quiver_file_writer,
    codec: c_int,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let writer = unsafe { deref_mut(writer, "writer") }?;
        let codec = CompressionCodec::try_from(codec)
            .map_err(|_| quiver_err!(InvalidArgument: "unknown compression codec {}", codec))?;
        writer.inner.set_compression(codec)?;
        Ok(true)
    })
}

/// Write one array as a row group. The array is released whether or not the write succeeds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_writer_write_array(
    writer: *mut quiver_file_writer,
    array: *mut ArrowArray,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let writer = unsafe { deref_mut(writer, "writer") }?;
        let array = unsafe { import_array(array, writer.inner.schema()) }?;
        writer.inner.write_batch(&array)?;
        Ok(true)
    })
}

/// Write every array of `stream` as its own row group, then release the stream.
///
/// Returns the number of arrays written, or -1 on error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_writer_write_stream(
    writer: *mut quiver_file_writer,
    stream: *mut ArrowArrayStream,
    error: *mut *mut quiver_error,
) -> i64 {
    try_or(error, -1, || {
        let writer = unsafe { deref_mut(writer, "writer") }?;
        let mut stream = unsafe { import_stream(stream) }?;
        let written = writer.inner.write_stream(&mut stream)?;
        to_i64(written, "written arrays")
    })
}

/// Write the footer and flush. The writer must still be freed afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_writer_close(
    writer: *mut quiver_file_writer,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let writer = unsafe { deref_mut(writer, "writer") }?;
        writer.inner.close()?;
        Ok(true)
    })
}

/// Free a writer. A writer that was not closed leaves an unreadable file behind.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_writer_free(writer: *mut quiver_file_writer) {
    if writer.is_null() {
        return;
    }
    let writer = unsafe { Box::from_raw(writer) };
    if !writer.inner.is_closed() {
        log::warn!("file writer freed without being closed");
    }
}

/// Open the file at `path` and validate its footer. A NULL `session` uses a default session.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_open(
    path: *const c_char,
    session: *const quiver_session,
    error: *mut *mut quiver_error,
) -> *mut quiver_file_reader {
    try_or(error, ptr::null_mut(), || {
        let path = unsafe { to_string(path) }?;
        let session = unsafe { quiver_session::resolve(session) };
        let inner = FileReader::open(path, session)?;
        Ok(Box::into_raw(Box::new(quiver_file_reader { inner })))
    })
}

/// Total number of rows, or 0 for a NULL reader.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_num_rows(reader: *const quiver_file_reader) -> u64 {
    unsafe { reader.as_ref() }.map_or(0, |reader| reader.inner.num_rows())
}

/// Number of row groups, or 0 for a NULL reader.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_num_row_groups(
    reader: *const quiver_file_reader,
) -> u64 {
    unsafe { reader.as_ref() }.map_or(0, |reader| {
        u64::try_from(reader.inner.num_row_groups()).unwrap_or(u64::MAX)
    })
}

/// Export the file schema into `out`, which the caller must release.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_schema(
    reader: *const quiver_file_reader,
    out: *mut ArrowSchema,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let reader = unsafe { deref(reader, "reader") }?;
        let exported = export_schema(reader.inner.schema().clone())?;
        unsafe { write_out(out, exported) }?;
        Ok(true)
    })
}

/// Stream every row group into `out`. The stream keeps the file open until it is released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_read_all(
    reader: *const quiver_file_reader,
    out: *mut ArrowArrayStream,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let reader = unsafe { deref(reader, "reader") }?;
        unsafe { write_stream(out, reader.inner.read_all()) }?;
        Ok(true)
    })
}

/// Stream the single row group at `index` into `out`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_read_row_group(
    reader: *const quiver_file_reader,
    index: i64,
    out: *mut ArrowArrayStream,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let reader = unsafe { deref(reader, "reader") }?;
        let index = to_usize(index, "row group index")?;
        unsafe { write_stream(out, reader.inner.read_row_group(index)?) }?;
        Ok(true)
    })
}

/// Stream every row group restricted to the `n_names` columns in `names`, in that order.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_read_columns(
    reader: *const quiver_file_reader,
    names: *const *const c_char,
    n_names: i64,
    out: *mut ArrowArrayStream,
    error: *mut *mut quiver_error,
) -> bool {
    try_or(error, false, || {
        let reader = unsafe { deref(reader, "reader") }?;
        let names: Vec<String> = unsafe { raw_slice(names, n_names, "column names") }?
            .iter()
            .map(|&name| unsafe { to_string(name) })
            .try_collect()?;
        let names = names.iter().map(String::as_str).collect_vec();
        unsafe { write_stream(out, reader.inner.read_columns(&names)?) }?;
        Ok(true)
    })
}

/// Free a reader. Streams created from it stay valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_file_reader_free(reader: *mut quiver_file_reader) {
    if !reader.is_null() {
        drop(unsafe { Box::from_raw(reader) })
    }
}

unsafe fn write_out<T>(out: *mut T, value: T) -> QuiverResult<()> {
    if out.is_null() {
        quiver_bail!(InvalidArgument: "out-parameter is null");
    }
    unsafe { out.write(value) };
    Ok(())
}

unsafe fn write_stream(out: *mut ArrowArrayStream, stream: FileArrayStream<File>) -> QuiverResult<()> {
    if out.is_null() {
        quiver_bail!(InvalidArgument: "stream out-parameter is null");
    }
    unsafe { out.write(export_stream(Box::new(stream))) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use quiver_array::builder::{PrimitiveBuilder, Utf8Builder};
    use quiver_array::format::{INT32, UTF8};
    use quiver_array::{Array, ArrayStreamAdapter, ArrayStreamExt, Schema};
    use ::quiver_error::ErrorCode;

    use super::*;
    use crate::array::export_array;
    use crate::error::{quiver_error_code, quiver_error_free};
    use crate::schema::import_schema;

    fn schema() -> Schema {
        Schema::new_struct([
            Schema::new(INT32).with_name("id"),
            Schema::new(UTF8).with_name("name").nullable(),
        ])
    }

    fn batch(ids: &[i32]) -> Array {
        let id = PrimitiveBuilder::<i32>::from_iter(ids.iter().copied().map(Some))
            .finish()
            .unwrap();
        let mut names = Utf8Builder::new();
        for value in ids {
            if value % 2 == 0 {
                names.append_value(&format!("n{value}")).unwrap();
            } else {
                names.append_null().unwrap();
            }
        }
        Array::new_struct(ids.len(), vec![id, names.finish().unwrap()])
    }

    fn path_string(dir: &tempfile::TempDir) -> CString {
        CString::new(dir.path().join("data.qvf").to_str().unwrap()).unwrap()
    }

    unsafe fn write_file(path: &CString) {
        let mut error = ptr::null_mut();
        let c_schema = export_schema(schema()).unwrap();
        unsafe {
            let writer = quiver_file_writer_open(path.as_ptr(), &c_schema, ptr::null(), &mut error);
            assert!(error.is_null());
            assert!(quiver_file_writer_set_compression(writer, 2, &mut error));

            let mut array = export_array(batch(&[1, 2, 3])).unwrap();
            assert!(quiver_file_writer_write_array(writer, &mut array, &mut error));
            assert!(array.is_released());

            let stream = ArrayStreamAdapter::new(schema(), [batch(&[4, 5]), batch(&[6])]);
            let mut c_stream = export_stream(Box::new(stream));
            assert_eq!(quiver_file_writer_write_stream(writer, &mut c_stream, &mut error), 2);

            assert!(quiver_file_writer_close(writer, &mut error));
            assert!(quiver_file_writer_close(writer, &mut error));
            quiver_file_writer_free(writer);
        }
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_string(&dir);
        let mut error = ptr::null_mut();
        unsafe {
            write_file(&path);
            let session = crate::session::quiver_session_create();
            let reader = quiver_file_reader_open(path.as_ptr(), session, &mut error);
            assert!(error.is_null());
            crate::session::quiver_session_free(session);
            assert_eq!(quiver_file_reader_num_rows(reader), 6);
            assert_eq!(quiver_file_reader_num_row_groups(reader), 3);

            let mut c_schema = ArrowSchema::empty();
            assert!(quiver_file_reader_schema(reader, &mut c_schema, &mut error));
            assert_eq!(import_schema(&mut c_schema).unwrap(), schema());

            let mut out = ArrowArrayStream::empty();
            assert!(quiver_file_reader_read_all(reader, &mut out, &mut error));
            quiver_file_reader_free(reader);

            let arrays = import_stream(&mut out).unwrap().collect_arrays().unwrap();
            assert_eq!(arrays.iter().map(Array::len).collect_vec(), [3, 2, 1]);
            let names = arrays[0].child(1).unwrap();
            assert!(names.is_null(0));
            assert_eq!(names.utf8_value(1).as_deref(), Some("n2"));
            assert_eq!(arrays[2].child(0).unwrap().i32_value(0), 6);
        }
    }

    #[test]
    fn projection_and_row_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_string(&dir);
        let mut error = ptr::null_mut();
        unsafe {
            write_file(&path);
            let reader = quiver_file_reader_open(path.as_ptr(), ptr::null(), &mut error);

            let names = [c"name".as_ptr()];
            let mut out = ArrowArrayStream::empty();
            assert!(quiver_file_reader_read_columns(reader, names.as_ptr(), 1, &mut out, &mut error));
            let mut stream = import_stream(&mut out).unwrap();
            let arrays = stream.collect_arrays().unwrap();
            assert_eq!(arrays.len(), 3);
            assert_eq!(arrays[1].n_children(), 1);
            assert_eq!(arrays[0].child(0).unwrap().utf8_value(1).as_deref(), Some("n2"));

            let missing = [c"missing".as_ptr()];
            assert!(!quiver_file_reader_read_columns(
                reader,
                missing.as_ptr(),
                1,
                &mut out,
                &mut error
            ));
            assert_eq!(quiver_error_code(error), ErrorCode::InvalidArgument.as_i32());
            quiver_error_free(error);

            assert!(quiver_file_reader_read_row_group(reader, 1, &mut out, &mut error));
            let arrays = import_stream(&mut out).unwrap().collect_arrays().unwrap();
            assert_eq!(arrays.len(), 1);
            assert_eq!(arrays[0].child(0).unwrap().i32_value(1), 5);

            assert!(!quiver_file_reader_read_row_group(reader, 3, &mut out, &mut error));
            quiver_error_free(error);
            quiver_file_reader_free(reader);
        }
    }

    #[test]
    fn open_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_string(&dir);
        let mut error = ptr::null_mut();
        unsafe {
            let reader = quiver_file_reader_open(path.as_ptr(), ptr::null(), &mut error);
            assert!(reader.is_null());
            assert_eq!(quiver_error_code(error), ErrorCode::Io.as_i32());
            quiver_error_free(error);

            let writer =
                quiver_file_writer_open(path.as_ptr(), ptr::null(), ptr::null(), &mut error);
            assert!(writer.is_null());
            assert_eq!(quiver_error_code(error), ErrorCode::InvalidArgument.as_i32());
            quiver_error_free(error);

            assert_eq!(quiver_file_reader_num_rows(ptr::null()), 0);
            quiver_file_reader_free(ptr::null_mut());
            quiver_file_writer_free(ptr::null_mut());
        }
    }

    #[test]
    fn unknown_codec_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_string(&dir);
        let c_schema = export_schema(schema()).unwrap();
        let mut error = ptr::null_mut();
        unsafe {
            let writer = quiver_file_writer_open(path.as_ptr(), &c_schema, ptr::null(), &mut error);
            assert!(!quiver_file_writer_set_compression(writer, 9, &mut error));
            assert_eq!(quiver_error_code(error), ErrorCode::InvalidArgument.as_i32());
            quiver_error_free(error);
            assert!(quiver_file_writer_close(writer, ptr::null_mut()));
            quiver_file_writer_free(writer);
        }
    }
}
