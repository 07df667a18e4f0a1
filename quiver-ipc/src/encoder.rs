use quiver_array::{Array, Schema};
use quiver_buffer::ByteBuffer;
use quiver_error::{QuiverResult, quiver_bail, quiver_err};

use crate::{ARRAY_MAGIC, BATCH_MAGIC, SCHEMA_MAGIC, VERSION};

/// Encode a standalone schema message.
pub fn encode_schema(schema: &Schema) -> QuiverResult<ByteBuffer> {
    let mut out = ByteBuffer::empty();
    write_header(&mut out, SCHEMA_MAGIC)?;
    write_schema_content(&mut out, schema)?;
    Ok(out)
}

/// Encode a standalone array message. Buffer sizes are derived from `schema`.
pub fn encode_array(array: &Array, schema: &Schema) -> QuiverResult<ByteBuffer> {
    let mut out = ByteBuffer::empty();
    write_header(&mut out, ARRAY_MAGIC)?;
    write_array_content(&mut out, array, schema)?;
    Ok(out)
}

/// Encode a schema and a conforming array as a single batch message.
pub fn encode_batch(schema: &Schema, array: &Array) -> QuiverResult<ByteBuffer> {
    let mut out = ByteBuffer::empty();
    write_header(&mut out, BATCH_MAGIC)?;
    write_schema_content(&mut out, schema)?;
    write_array_content(&mut out, array, schema)?;
    Ok(out)
}

fn write_header(out: &mut ByteBuffer, magic: u32) -> QuiverResult<()> {
    out.push(magic)?;
    out.push(VERSION)
}

/// Append the header-less encoding of `schema` and its children, depth first.
///
/// Metadata and dictionary schemas are not part of the wire format.
pub fn write_schema_content(out: &mut ByteBuffer, schema: &Schema) -> QuiverResult<()> {
    write_str(out, schema.format())?;
    write_str(out, schema.name().unwrap_or_default())?;
    out.push(schema.flags().bits())?;
    out.push(to_i64(schema.n_children())?)?;
    for child in schema.children() {
        write_schema_content(out, child)?;
    }
    Ok(())
}

/// Append the header-less encoding of `array` and its children, depth first.
///
/// Each buffer is written with the size its layout implies for the physical extent
/// `offset + length`, so sliced arrays keep the elements before their offset. Absent buffers are
/// written with size zero.
pub fn write_array_content(
    out: &mut ByteBuffer,
    array: &Array,
    schema: &Schema,
) -> QuiverResult<()> {
    if array.n_children() != schema.n_children() {
        quiver_bail!(
            InvalidArgument: "array has {} children but schema {} has {}",
            array.n_children(),
            schema,
            schema.n_children()
        );
    }

    out.push(to_i64(array.len())?)?;
    out.push(to_i64(array.null_count())?)?;
    out.push(to_i64(array.offset())?)?;
    out.push(to_i64(array.n_buffers())?)?;
    out.push(to_i64(array.n_children())?)?;

    let layout = schema.layout();
    let Some(extent) = array.offset().checked_add(array.len()) else {
        quiver_bail!(
            InvalidArgument: "offset {} plus length {} overflows",
            array.offset(),
            array.len()
        );
    };
    for (index, buffer) in array.buffers().enumerate() {
        let Some(buffer) = buffer else {
            out.push(0u64)?;
            continue;
        };
        let size = layout.buffer_len(index, extent, array.buffer(1))?;
        if buffer.len() < size {
            quiver_bail!(
                InvalidArgument: "buffer {} of {} holds {} bytes, expected at least {}",
                index,
                schema,
                buffer.len(),
                size
            );
        }
        out.push(size as u64)?;
        out.extend_from_slice(&buffer[..size])?;
    }

    for (child, child_schema) in array.children().iter().zip(schema.children()) {
        write_array_content(out, child, child_schema)?;
    }
    Ok(())
}

fn write_str(out: &mut ByteBuffer, value: &str) -> QuiverResult<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        quiver_err!(InvalidArgument: "string of {} bytes is too long", value.len())
    })?;
    out.push(len)?;
    out.extend_from_slice(value.as_bytes())
}

fn to_i64(value: usize) -> QuiverResult<i64> {
    i64::try_from(value).map_err(|_| quiver_err!(InvalidArgument: "{} does not fit in i64", value))
}

#[cfg(test)]
mod tests {
    use quiver_array::builder::PrimitiveBuilder;
    use quiver_array::format::{INT32, INT64, STRUCT, UTF8};
    use quiver_error::ErrorCode;

    use super::*;

    #[test]
    fn schema_bytes() {
        let schema = Schema::new(INT64).with_name("id").nullable();
        let bytes = encode_schema(&schema).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"QVSC");
        expected.extend_from_slice(&[1, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0, 0, 0, b'l']);
        expected.extend_from_slice(&[2, 0, 0, 0, b'i', b'd']);
        expected.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[0; 8]);
        assert_eq!(bytes.as_slice(), expected.as_slice());
    }

    #[test]
    fn nested_schema_bytes() {
        let schema = Schema::new_struct([Schema::new(UTF8)]);
        let bytes = encode_schema(&schema).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"QVSC");
        expected.extend_from_slice(&[1, 0, 0, 0]);
        expected.extend_from_slice(&[2, 0, 0, 0, b'+', b's']);
        expected.extend_from_slice(&[0; 4]);
        expected.extend_from_slice(&[0; 8]);
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0, 0, 0, b'u']);
        expected.extend_from_slice(&[0; 4]);
        expected.extend_from_slice(&[0; 8]);
        expected.extend_from_slice(&[0; 8]);
        assert_eq!(bytes.as_slice(), expected.as_slice());
        assert_eq!(schema.format(), STRUCT);
    }

    #[test]
    fn array_bytes() {
        let array = PrimitiveBuilder::<i32>::from_iter([Some(1), None, Some(3)])
            .finish()
            .unwrap();
        let bytes = encode_array(&array, &Schema::new(INT32)).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"QVAR");
        expected.extend_from_slice(&[1, 0, 0, 0]);
        expected.extend_from_slice(&[3, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[0; 8]);
        expected.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[0; 8]);
        // validity
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 0b101]);
        // values
        expected.extend_from_slice(&[12, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(bytes.as_slice(), expected.as_slice());
    }

    #[test]
    fn absent_buffers_are_written_empty() {
        let array = PrimitiveBuilder::<i64>::from_iter([Some(5)]).finish().unwrap();
        let bytes = encode_array(&array, &Schema::new(INT64)).unwrap();
        // header + five counts, then the absent validity buffer
        assert_eq!(&bytes[48..56], &[0u8; 8]);
        assert_eq!(&bytes[56..64], &[8, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes.len(), 72);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut array = Array::new(4);
        array.set_buffer(1, ByteBuffer::from_values(&[1i32, 2]).unwrap());
        let err = encode_array(&array, &Schema::new(INT32)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn child_counts_must_match() {
        let array = Array::new_struct(0, [Array::new(0)]);
        let err = encode_array(&array, &Schema::new_struct([])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
