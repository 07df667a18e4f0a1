use bytes::Buf;
use quiver_array::{Array, Schema, SchemaFlags};
use quiver_buffer::ByteBuffer;
use quiver_error::{QuiverResult, quiver_bail, quiver_err};

use crate::{ARRAY_MAGIC, BATCH_MAGIC, MAX_DEPTH, SCHEMA_MAGIC, VERSION};

/// Length, null count, offset, buffer count and child count.
const ARRAY_HEADER_SIZE: usize = 40;
/// Two empty strings, flags and child count.
const SCHEMA_MIN_SIZE: usize = 24;

/// Decode a standalone schema message.
pub fn decode_schema(bytes: &[u8]) -> QuiverResult<Schema> {
    let mut buf = bytes;
    read_header(&mut buf, SCHEMA_MAGIC, "schema")?;
    read_schema_content(&mut buf)
}

/// Decode a standalone array message.
pub fn decode_array(bytes: &[u8]) -> QuiverResult<Array> {
    let mut buf = bytes;
    read_header(&mut buf, ARRAY_MAGIC, "array")?;
    read_array_content(&mut buf)
}

/// Decode a batch message into its schema and array.
pub fn decode_batch(bytes: &[u8]) -> QuiverResult<(Schema, Array)> {
    let mut buf = bytes;
    read_header(&mut buf, BATCH_MAGIC, "batch")?;
    let schema = read_schema_content(&mut buf)?;
    let array = read_array_content(&mut buf)?;
    Ok((schema, array))
}

/// Check the magic and version at the front of `buf`, then advance past them.
pub fn read_header(buf: &mut &[u8], magic: u32, kind: &str) -> QuiverResult<()> {
    ensure_remaining(buf, 8, "message header")?;
    let found = buf.get_u32_le();
    if found != magic {
        quiver_bail!(
            FormatMismatch: "expected {} magic {:#010x}, found {:#010x}",
            kind,
            magic,
            found
        );
    }
    let version = buf.get_u32_le();
    if version != VERSION {
        quiver_bail!(
            UnsupportedVersion: "{} message has version {}, expected {}",
            kind,
            version,
            VERSION
        );
    }
    Ok(())
}

/// Read header-less schema content from the front of `buf`.
pub fn read_schema_content(buf: &mut &[u8]) -> QuiverResult<Schema> {
    schema_at_depth(buf, 0)
}

/// Read header-less array content from the front of `buf`.
///
/// Every buffer is copied into freshly allocated memory. A buffer of size zero decodes as an
/// absent buffer.
pub fn read_array_content(buf: &mut &[u8]) -> QuiverResult<Array> {
    array_at_depth(buf, 0)
}

fn schema_at_depth(buf: &mut &[u8], depth: usize) -> QuiverResult<Schema> {
    check_depth(depth)?;
    let format = read_str(buf, "format")?;
    let name = read_str(buf, "name")?;
    ensure_remaining(buf, 16, "schema flags and child count")?;
    let flags = SchemaFlags::from_bits(buf.get_i64_le());
    let n_children = read_count(buf.get_i64_le(), "schema child count")?;

    ensure_count(buf, n_children, SCHEMA_MIN_SIZE, "schema children")?;

    let mut schema = Schema::new(format).with_flags(flags);
    if !name.is_empty() {
        schema = schema.with_name(name);
    }
    for _ in 0..n_children {
        schema.add_child(schema_at_depth(buf, depth + 1)?);
    }
    Ok(schema)
}

fn array_at_depth(buf: &mut &[u8], depth: usize) -> QuiverResult<Array> {
    check_depth(depth)?;
    ensure_remaining(buf, ARRAY_HEADER_SIZE, "array header")?;
    let length = read_count(buf.get_i64_le(), "array length")?;
    let null_count = read_count(buf.get_i64_le(), "array null count")?;
    let offset = read_count(buf.get_i64_le(), "array offset")?;
    let n_buffers = read_count(buf.get_i64_le(), "array buffer count")?;
    let n_children = read_count(buf.get_i64_le(), "array child count")?;

    ensure_count(buf, n_buffers, 8, "buffer sizes")?;

    let mut array = Array::new(length)
        .with_null_count(null_count)
        .with_offset(offset);
    array.set_n_buffers(n_buffers);
    for index in 0..n_buffers {
        ensure_remaining(buf, 8, "buffer size")?;
        let size = usize::try_from(buf.get_u64_le())
            .map_err(|_| quiver_err!(Truncated: "buffer {} size exceeds the address space", index))?;
        if size == 0 {
            continue;
        }
        ensure_remaining(buf, size, "buffer data")?;
        array.set_buffer(index, ByteBuffer::copy_from(&buf[..size])?);
        buf.advance(size);
    }
    ensure_count(buf, n_children, ARRAY_HEADER_SIZE, "array children")?;
    for _ in 0..n_children {
        array.add_child(array_at_depth(buf, depth + 1)?);
    }
    Ok(array)
}

fn read_str(buf: &mut &[u8], what: &str) -> QuiverResult<String> {
    ensure_remaining(buf, 4, what)?;
    let len = buf.get_u32_le() as usize;
    ensure_remaining(buf, len, what)?;
    let value = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| quiver_err!(InvalidSerde: "{} is not valid UTF-8: {}", what, e))?;
    buf.advance(len);
    Ok(value)
}

fn read_count(value: i64, what: &str) -> QuiverResult<usize> {
    usize::try_from(value).map_err(|_| quiver_err!(InvalidSerde: "{} is negative: {}", what, value))
}

fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> QuiverResult<()> {
    if buf.remaining() < needed {
        quiver_bail!(
            Truncated: "truncated {}: need {} bytes, {} remaining",
            what,
            needed,
            buf.remaining()
        );
    }
    Ok(())
}

/// Fail unless `count` items of at least `min_size` bytes each can still follow.
fn ensure_count(buf: &[u8], count: usize, min_size: usize, what: &str) -> QuiverResult<()> {
    if count > buf.remaining() / min_size {
        quiver_bail!(
            Truncated: "truncated {}: {} declared, {} bytes remaining",
            what,
            count,
            buf.remaining()
        );
    }
    Ok(())
}

fn check_depth(depth: usize) -> QuiverResult<()> {
    if depth > MAX_DEPTH {
        quiver_bail!(InvalidSerde: "nesting exceeds {} levels", MAX_DEPTH);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use quiver_array::builder::PrimitiveBuilder;
    use quiver_array::format::{INT16, INT32, STRUCT};
    use quiver_error::ErrorCode;
    use rstest::rstest;

    use super::*;
    use crate::{encode_array, encode_batch, encode_schema};

    fn sample_schema() -> Schema {
        Schema::new_struct([
            Schema::new(INT32).with_name("a").nullable(),
            Schema::new(INT16).with_name("b"),
        ])
        .with_name("root")
    }

    #[test]
    fn schema_round_trip() {
        let schema = sample_schema();
        let decoded = decode_schema(&encode_schema(&schema).unwrap()).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn decodes_literal_array_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"QVAR");
        bytes.extend_from_slice(&[1, 0, 0, 0]);
        bytes.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[4, 0, 0, 0, 0, 0, 0, 0, 7, 0, 9, 0]);

        let array = decode_array(&bytes).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.n_buffers(), 2);
        assert!(array.buffer(0).is_none());
        assert_eq!(array.i16_value(0), 7);
        assert_eq!(array.i16_value(1), 9);
    }

    #[test]
    fn struct_batch_round_trip() {
        let a = PrimitiveBuilder::<i32>::from_iter([Some(1), None, Some(3)])
            .finish()
            .unwrap();
        let b = PrimitiveBuilder::<i16>::from_iter([Some(4), Some(5), Some(6)])
            .finish()
            .unwrap();
        let array = Array::new_struct(3, [a, b]);
        let schema = sample_schema();

        let (decoded_schema, decoded) =
            decode_batch(&encode_batch(&schema, &array).unwrap()).unwrap();
        assert_eq!(decoded_schema, schema);
        assert_eq!(decoded, array);
        assert_eq!(decoded_schema.format(), STRUCT);
    }

    #[test]
    fn sliced_arrays_keep_their_prefix() {
        let array = PrimitiveBuilder::<i32>::from_iter((0..6).map(Some))
            .finish()
            .unwrap()
            .slice(2, 3)
            .unwrap();
        let decoded = decode_array(&encode_array(&array, &Schema::new(INT32)).unwrap()).unwrap();
        assert_eq!(decoded.offset(), 2);
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            (0..3).map(|i| decoded.i32_value(i)).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[rstest]
    #[case(b"QVAR", ErrorCode::FormatMismatch)]
    #[case(b"XXXX", ErrorCode::FormatMismatch)]
    fn wrong_magic(#[case] magic: &[u8; 4], #[case] code: ErrorCode) {
        let mut bytes = encode_schema(&sample_schema()).unwrap().into_vec();
        bytes[..4].copy_from_slice(magic);
        assert_eq!(decode_schema(&bytes).unwrap_err().code(), code);
    }

    #[test]
    fn wrong_version() {
        let mut bytes = encode_schema(&sample_schema()).unwrap().into_vec();
        bytes[4] = 2;
        assert_eq!(
            decode_schema(&bytes).unwrap_err().code(),
            ErrorCode::UnsupportedVersion
        );
    }

    #[test]
    fn every_prefix_is_truncated() {
        let bytes = encode_schema(&sample_schema()).unwrap();
        for len in 0..bytes.len() {
            assert_eq!(
                decode_schema(&bytes[..len]).unwrap_err().code(),
                ErrorCode::Truncated,
                "prefix of {len} bytes"
            );
        }
    }

    #[test]
    fn negative_counts_are_corrupt() {
        let mut bytes = encode_array(&Array::new(0), &Schema::new(INT32))
            .unwrap()
            .into_vec();
        bytes[8..16].copy_from_slice(&(-1i64).to_le_bytes());
        assert_eq!(decode_array(&bytes).unwrap_err().code(), ErrorCode::Corrupt);
    }

    fn array_header(n_buffers: i64, n_children: i64) -> Vec<u8> {
        let mut bytes = b"QVAR".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        for value in [1, 0, 0, n_buffers, n_children] {
            bytes.extend_from_slice(&i64::to_le_bytes(value));
        }
        bytes
    }

    #[rstest]
    #[case(1 << 40, 0)]
    #[case(0, 1 << 40)]
    #[case(3, 0)]
    #[case(0, 1)]
    fn impossible_counts_are_truncated(#[case] n_buffers: i64, #[case] n_children: i64) {
        let bytes = array_header(n_buffers, n_children);
        assert_eq!(bytes.len(), 48);
        assert_eq!(decode_array(&bytes).unwrap_err().code(), ErrorCode::Truncated);
    }

    #[test]
    fn impossible_schema_child_count_is_truncated() {
        let mut bytes = encode_schema(&Schema::new(INT32)).unwrap().into_vec();
        let count = bytes.len() - 8;
        bytes[count..].copy_from_slice(&i64::to_le_bytes(1 << 40));
        assert_eq!(decode_schema(&bytes).unwrap_err().code(), ErrorCode::Truncated);
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut schema = Schema::new(INT32);
        for _ in 0..=MAX_DEPTH {
            schema = Schema::new_struct([schema]);
        }
        let bytes = encode_schema(&schema).unwrap();
        assert_eq!(decode_schema(&bytes).unwrap_err().code(), ErrorCode::Corrupt);
    }
}
