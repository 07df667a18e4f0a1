use quiver_array::Schema;

use crate::compression::CompressionCodec;
use crate::footer::{ColumnChunkFooter, Encoding, RowGroupFooter};

/// File-level metadata recovered from the footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Total rows over all row groups.
    pub num_rows: u64,
    /// Number of row groups.
    pub num_row_groups: usize,
    /// Size of the file in bytes.
    pub file_size: u64,
    /// Format version of the file.
    pub version: u16,
    /// Identification of the writer that produced the file.
    pub created_by: String,
    /// The file schema.
    pub schema: Schema,
}

/// Metadata of a single row group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroupMetadata {
    /// Rows in the row group.
    pub num_rows: u64,
    /// Column chunks in the row group.
    pub num_columns: usize,
    /// Sum of the column chunk sizes before compression.
    pub total_uncompressed_size: u64,
    /// Sum of the column chunk sizes on disk.
    pub total_compressed_size: u64,
}

/// Metadata of a single column chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Name of the column.
    pub name: String,
    /// Codec the chunk is compressed with.
    pub codec: CompressionCodec,
    /// Layout of the chunk before compression.
    pub encoding: Encoding,
    /// Absolute file offset of the chunk.
    pub offset: u64,
    /// Size of the chunk on disk.
    pub compressed_size: u64,
    /// Size of the chunk after decompression.
    pub uncompressed_size: u64,
    /// Number of values in the chunk.
    pub num_values: u64,
    /// Number of nulls in the chunk.
    pub null_count: u64,
}

impl From<&RowGroupFooter> for RowGroupMetadata {
    fn from(footer: &RowGroupFooter) -> Self {
        Self {
            num_rows: footer.num_rows,
            num_columns: footer.columns.len(),
            total_uncompressed_size: saturating_total(footer, |c| c.uncompressed_size),
            total_compressed_size: saturating_total(footer, |c| c.compressed_size),
        }
    }
}

impl From<&ColumnChunkFooter> for ColumnMetadata {
    fn from(footer: &ColumnChunkFooter) -> Self {
        Self {
            name: footer.name.clone(),
            codec: footer.codec(),
            encoding: footer.encoding(),
            offset: footer.offset,
            compressed_size: footer.compressed_size,
            uncompressed_size: footer.uncompressed_size,
            num_values: footer.num_values,
            null_count: footer.null_count,
        }
    }
}

fn saturating_total(footer: &RowGroupFooter, size: impl Fn(&ColumnChunkFooter) -> u64) -> u64 {
    footer
        .columns
        .iter()
        .fold(0u64, |total, chunk| total.saturating_add(size(chunk)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_group_totals_saturate() {
        let chunk = ColumnChunkFooter {
            compressed_size: u64::MAX,
            uncompressed_size: u64::MAX - 1,
            ..Default::default()
        };
        let footer = RowGroupFooter {
            num_rows: 3,
            columns: vec![chunk.clone(), chunk],
        };
        let metadata = RowGroupMetadata::from(&footer);
        assert_eq!(metadata.num_columns, 2);
        assert_eq!(metadata.total_compressed_size, u64::MAX);
        assert_eq!(metadata.total_uncompressed_size, u64::MAX);
    }
}
