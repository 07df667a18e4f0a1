//! Read and write Quiver columnar files.
//!
//! A file holds a sequence of row groups. Each row group stores one column chunk per column,
//! where a chunk is the wire-format content of the column array compressed as a single block.
//! The file schema is either a struct (`+s`) whose children are the columns, or any other type,
//! which is stored as a single column.
//!
//! # File Format
//!
//! ```text
//! ┌────────────────────────────┐
//! │    4-byte magic "QVF1"     │
//! ├────────────────────────────┤
//! │                            │
//! │       Column Chunks        │
//! │ (compressed array content) │
//! │                            │
//! ├────────────────────────────┤
//! │                            │
//! │      Protobuf Footer       │
//! │ (schema, row groups and    │
//! │   column chunk metadata)   │
//! │                            │
//! ├────────────────────────────┤
//! │    12-byte End of File     │
//! │ (version, footer length,   │
//! │        magic bytes)        │
//! └────────────────────────────┘
//! ```
//!
//! Files are written with a [`FileWriter`] and read with a [`FileReader`], both created against
//! a shared [`Session`] holding the codec registry and default [`WriteOptions`].

pub mod compression;
pub mod footer;
mod metadata;
mod read_at;
mod reader;
mod session;
mod stream;
mod writer;

pub use compression::{CompressionCodec, Compressor, CompressorRegistry};
pub use footer::Encoding;
pub use metadata::*;
use quiver_array::format::STRUCT;
use quiver_array::{Array, Schema};
pub use read_at::*;
pub use reader::*;
pub use session::*;
pub use stream::*;
pub use writer::*;

/// Whether the children of `schema` are stored as separate columns.
fn is_columnar(schema: &Schema) -> bool {
    schema.format() == STRUCT
}

/// The schemas of the stored columns.
fn column_schemas(schema: &Schema) -> Vec<&Schema> {
    if is_columnar(schema) {
        schema.children().iter().collect()
    } else {
        vec![schema]
    }
}

/// The column arrays of a batch conforming to `schema`.
fn column_arrays<'a>(schema: &Schema, batch: &'a Array) -> Vec<&'a Array> {
    if is_columnar(schema) {
        batch.children().iter().collect()
    } else {
        vec![batch]
    }
}

fn column_name(schema: &Schema, index: usize) -> String {
    schema
        .name()
        .map_or_else(|| format!("column_{index}"), str::to_string)
}

#[cfg(test)]
mod tests {
    use quiver_array::format::{INT32, UTF8};

    use super::*;

    #[test]
    fn struct_children_are_columns() {
        let schema = Schema::new_struct([Schema::new(INT32).with_name("a"), Schema::new(UTF8)]);
        let columns = column_schemas(&schema);
        assert_eq!(columns.len(), 2);
        assert_eq!(column_name(columns[0], 0), "a");
        assert_eq!(column_name(columns[1], 1), "column_1");
    }

    #[test]
    fn other_schemas_are_one_column() {
        let schema = Schema::new(INT32).with_name("x");
        assert_eq!(column_schemas(&schema).len(), 1);
        let batch = Array::new(3);
        assert_eq!(column_arrays(&schema, &batch).len(), 1);
    }
}
