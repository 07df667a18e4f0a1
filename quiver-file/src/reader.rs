use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use itertools::Itertools;
use prost::Message;
use quiver_array::{Array, Schema};
use quiver_error::{QuiverError, QuiverResult, quiver_bail, quiver_err};
use quiver_ipc::{decode_schema, read_array_content};

use crate::compression::CompressionCodec;
use crate::footer::{ColumnChunkFooter, EOF_SIZE, EndOfFile, Encoding, FileFooter, MAGIC};
use crate::metadata::{ColumnMetadata, FileMetadata, RowGroupMetadata};
use crate::read_at::ReadAt;
use crate::session::Session;
use crate::stream::FileArrayStream;
use crate::{column_name, column_schemas, is_columnar};

/// Reads row groups and columns out of a file.
///
/// The footer is parsed and validated when the reader is opened. Cloning a reader is cheap and
/// shares the underlying source.
pub struct FileReader<R> {
    inner: Arc<ReaderInner<R>>,
}

struct ReaderInner<R> {
    read: R,
    session: Arc<Session>,
    metadata: FileMetadata,
    footer: FileFooter,
}

impl<R> Clone for FileReader<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl FileReader<File> {
    /// Open the file at `path`.
    pub fn open(path: impl AsRef<Path>, session: Arc<Session>) -> QuiverResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            QuiverError::from(e).with_context(format!("failed to open {}", path.display()))
        })?;
        let reader = Self::try_new(file, session)
            .map_err(|e| e.with_context(format!("failed to read {}", path.display())))?;
        log::debug!(
            "opened {}: {} rows in {} row groups, schema {}",
            path.display(),
            reader.num_rows(),
            reader.num_row_groups(),
            reader.schema()
        );
        Ok(reader)
    }
}

impl<R: ReadAt> FileReader<R> {
    /// Read and validate the footer of `read`.
    pub fn try_new(read: R, session: Arc<Session>) -> QuiverResult<Self> {
        let file_size = read.size()?;
        let min_size = (MAGIC.len() + EOF_SIZE) as u64;
        if file_size < min_size {
            quiver_bail!(
                Truncated: "file of {} bytes is smaller than the minimum of {}",
                file_size,
                min_size
            );
        }
        if read.read_at(0, MAGIC.len())?.as_ref() != MAGIC {
            quiver_bail!(
                FormatMismatch: "file does not start with magic \"{}\"",
                String::from_utf8_lossy(&MAGIC)
            );
        }

        let eof_bytes = read.read_at(file_size - EOF_SIZE as u64, EOF_SIZE)?;
        let mut eof = [0u8; EOF_SIZE];
        eof.copy_from_slice(&eof_bytes);
        let eof = EndOfFile::parse(&eof)?;

        let data_end = file_size - min_size;
        let footer_len = u64::from(eof.footer_len);
        if footer_len > data_end {
            quiver_bail!(
                InvalidSerde: "footer of {} bytes does not fit in a file of {} bytes",
                footer_len,
                file_size
            );
        }
        let footer_start = file_size - EOF_SIZE as u64 - footer_len;
        let footer_len = usize::try_from(footer_len)
            .map_err(|_| quiver_err!(InvalidSerde: "footer of {} bytes", footer_len))?;
        let footer_bytes = read.read_at(footer_start, footer_len)?;
        let footer = FileFooter::decode(footer_bytes)
            .map_err(|e| QuiverError::from(e).with_context("failed to decode file footer"))?;
        if footer.version != u32::from(eof.version) {
            quiver_bail!(
                InvalidSerde: "footer version {} disagrees with end of file version {}",
                footer.version,
                eof.version
            );
        }
        let schema = decode_schema(&footer.schema)
            .map_err(|e| e.with_context("failed to decode file schema"))?;

        let num_columns = column_schemas(&schema).len();
        for (index, row_group) in footer.row_groups.iter().enumerate() {
            if row_group.columns.len() != num_columns {
                quiver_bail!(
                    InvalidSerde: "row group {} has {} columns, schema {} has {}",
                    index,
                    row_group.columns.len(),
                    schema,
                    num_columns
                );
            }
            for chunk in &row_group.columns {
                validate_chunk(chunk, footer_start)?;
            }
        }

        let num_rows = footer
            .row_groups
            .iter()
            .try_fold(0u64, |total, row_group| total.checked_add(row_group.num_rows))
            .ok_or_else(|| quiver_err!(InvalidSerde: "row counts of the footer overflow u64"))?;

        let metadata = FileMetadata {
            num_rows,
            num_row_groups: footer.row_groups.len(),
            file_size,
            version: eof.version,
            created_by: footer.created_by.clone(),
            schema,
        };
        Ok(Self {
            inner: Arc::new(ReaderInner {
                read,
                session,
                metadata,
                footer,
            }),
        })
    }

    /// File-level metadata.
    pub fn metadata(&self) -> &FileMetadata {
        &self.inner.metadata
    }

    /// The file schema.
    pub fn schema(&self) -> &Schema {
        &self.inner.metadata.schema
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> u64 {
        self.inner.metadata.num_rows
    }

    /// Number of row groups.
    pub fn num_row_groups(&self) -> usize {
        self.inner.metadata.num_row_groups
    }

    /// Number of columns in every row group.
    pub fn num_columns(&self) -> usize {
        column_schemas(self.schema()).len()
    }

    /// Metadata of row group `index`.
    pub fn row_group(&self, index: usize) -> QuiverResult<RowGroupMetadata> {
        self.inner
            .footer
            .row_groups
            .get(index)
            .map(RowGroupMetadata::from)
            .ok_or_else(|| self.row_group_out_of_range(index))
    }

    /// Metadata of column `column` in row group `row_group`.
    pub fn column(&self, row_group: usize, column: usize) -> QuiverResult<ColumnMetadata> {
        self.chunk(row_group, column).map(ColumnMetadata::from)
    }

    /// Resolve column names to column indices, in the order given.
    pub fn projection(&self, names: &[&str]) -> QuiverResult<Vec<usize>> {
        let columns = column_schemas(self.schema());
        names
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .enumerate()
                    .position(|(index, schema)| column_name(schema, index) == *name)
                    .ok_or_else(|| {
                        quiver_err!(
                            InvalidArgument: "no column named \"{}\" in {}",
                            name,
                            self.schema()
                        )
                    })
            })
            .try_collect()
    }

    /// The schema of batches read with `projection`.
    pub fn projected_schema(&self, projection: &[usize]) -> QuiverResult<Schema> {
        let schema = self.schema();
        if !is_columnar(schema) {
            return match projection {
                [0] => Ok(schema.clone()),
                _ => Err(quiver_err!(
                    InvalidArgument: "projection [{}] of single-column schema {}",
                    projection.iter().join(", "),
                    schema
                )),
            };
        }
        let mut projected = Schema::new(schema.format()).with_flags(schema.flags());
        if let Some(name) = schema.name() {
            projected = projected.with_name(name);
        }
        if let Some(metadata) = schema.metadata() {
            projected = projected.with_metadata(metadata);
        }
        for &index in projection {
            let child = schema
                .child(index)
                .ok_or_else(|| self.column_out_of_range(index))?;
            projected.add_child(child.clone());
        }
        Ok(projected)
    }

    /// Read and decode a single column chunk.
    pub fn read_column(&self, row_group: usize, column: usize) -> QuiverResult<Array> {
        let chunk = self.chunk(row_group, column)?;
        let codec = CompressionCodec::try_from(chunk.codec)
            .map_err(|_| quiver_err!(InvalidSerde: "unknown compression codec {}", chunk.codec))?;
        if Encoding::try_from(chunk.encoding).is_err() {
            quiver_bail!(InvalidSerde: "unknown column encoding {}", chunk.encoding);
        }
        let compressed_size = usize::try_from(chunk.compressed_size)
            .map_err(|_| quiver_err!(InvalidSerde: "chunk of {} bytes", chunk.compressed_size))?;
        let uncompressed_size = usize::try_from(chunk.uncompressed_size).map_err(|_| {
            quiver_err!(InvalidSerde: "chunk of {} bytes", chunk.uncompressed_size)
        })?;

        let compressed = self.inner.read.read_at(chunk.offset, compressed_size)?;
        let content = self
            .inner
            .session
            .compressors()
            .decompress(codec, &compressed, uncompressed_size)
            .map_err(|e| {
                e.with_context(format!(
                    "failed to decompress column {row_group}:{column}"
                ))
            })?;
        let mut buf = content.as_ref();
        let array = read_array_content(&mut buf)?;
        if !buf.is_empty() {
            quiver_bail!(
                InvalidSerde: "{} trailing bytes after column {}:{}",
                buf.len(),
                row_group,
                column
            );
        }
        if array.len() as u64 != chunk.num_values {
            quiver_bail!(
                InvalidSerde: "column {}:{} decoded {} values, footer records {}",
                row_group,
                column,
                array.len(),
                chunk.num_values
            );
        }
        log::trace!(
            "read column {}:{} ({}), {} bytes with {}",
            row_group,
            column,
            chunk.name,
            chunk.compressed_size,
            codec
        );
        Ok(array)
    }

    /// Read row group `index` as one batch, keeping only the columns in `projection` when given.
    pub fn read_batch(&self, index: usize, projection: Option<&[usize]>) -> QuiverResult<Array> {
        let row_group = self
            .inner
            .footer
            .row_groups
            .get(index)
            .ok_or_else(|| self.row_group_out_of_range(index))?;
        if !is_columnar(self.schema()) {
            if let Some(projection) = projection {
                self.projected_schema(projection)?;
            }
            return self.read_column(index, 0);
        }
        let num_rows = usize::try_from(row_group.num_rows)
            .map_err(|_| quiver_err!(InvalidSerde: "row group of {} rows", row_group.num_rows))?;
        let columns: Vec<Array> = match projection {
            Some(projection) => projection
                .iter()
                .map(|&column| self.read_column(index, column))
                .try_collect()?,
            None => (0..self.num_columns())
                .map(|column| self.read_column(index, column))
                .try_collect()?,
        };
        Ok(Array::new_struct(num_rows, columns))
    }

    /// Stream every row group in order.
    pub fn read_all(&self) -> FileArrayStream<R> {
        FileArrayStream::new(
            self.clone(),
            self.schema().clone(),
            0..self.num_row_groups(),
            None,
        )
    }

    /// Stream a single row group.
    pub fn read_row_group(&self, index: usize) -> QuiverResult<FileArrayStream<R>> {
        if index >= self.num_row_groups() {
            return Err(self.row_group_out_of_range(index));
        }
        Ok(FileArrayStream::new(
            self.clone(),
            self.schema().clone(),
            index..index + 1,
            None,
        ))
    }

    /// Stream every row group, reading only the named columns.
    pub fn read_columns(&self, names: &[&str]) -> QuiverResult<FileArrayStream<R>> {
        let projection = self.projection(names)?;
        let schema = self.projected_schema(&projection)?;
        Ok(FileArrayStream::new(
            self.clone(),
            schema,
            0..self.num_row_groups(),
            Some(projection),
        ))
    }

    fn chunk(&self, row_group: usize, column: usize) -> QuiverResult<&ColumnChunkFooter> {
        let footer = self
            .inner
            .footer
            .row_groups
            .get(row_group)
            .ok_or_else(|| self.row_group_out_of_range(row_group))?;
        footer
            .columns
            .get(column)
            .ok_or_else(|| self.column_out_of_range(column))
    }

    fn row_group_out_of_range(&self, index: usize) -> QuiverError {
        quiver_err!(
            InvalidArgument: "row group {} out of range for file with {} row groups",
            index,
            self.num_row_groups()
        )
    }

    fn column_out_of_range(&self, index: usize) -> QuiverError {
        quiver_err!(
            InvalidArgument: "column {} out of range for file with {} columns",
            index,
            self.num_columns()
        )
    }
}

/// Chunks must lie between the leading magic and the footer.
fn validate_chunk(chunk: &ColumnChunkFooter, footer_start: u64) -> QuiverResult<()> {
    let end = chunk.offset.checked_add(chunk.compressed_size);
    match end {
        Some(end) if chunk.offset >= MAGIC.len() as u64 && end <= footer_start => Ok(()),
        _ => Err(quiver_err!(
            InvalidSerde: "column chunk \"{}\" at {} of {} bytes lies outside the data section",
            chunk.name,
            chunk.offset,
            chunk.compressed_size
        )),
    }
}
