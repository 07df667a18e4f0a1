use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use prost::Message;
use quiver_array::{Array, ArrayStream, Schema};
use quiver_buffer::ByteBuffer;
use quiver_error::{QuiverError, QuiverResult, quiver_bail, quiver_err};
use quiver_ipc::{encode_schema, write_array_content};

use crate::compression::CompressionCodec;
use crate::footer::{
    ColumnChunkFooter, EndOfFile, Encoding, FILE_VERSION, FileFooter, MAGIC, RowGroupFooter,
};
use crate::session::Session;
use crate::{column_arrays, column_name, column_schemas};

/// Writes arrays to a columnar file, one row group per written batch.
///
/// The footer is only written by [`FileWriter::close`]. A file whose writer failed or was never
/// closed is not readable.
pub struct FileWriter<W: Write> {
    write: Option<W>,
    session: Arc<Session>,
    schema: Schema,
    compression: CompressionCodec,
    position: u64,
    row_groups: Vec<RowGroupFooter>,
    num_rows: u64,
}

impl FileWriter<BufWriter<File>> {
    /// Create or truncate the file at `path` and start writing arrays of `schema` to it.
    pub fn create(
        path: impl AsRef<Path>,
        schema: Schema,
        session: Arc<Session>,
    ) -> QuiverResult<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            QuiverError::from(e).with_context(format!("failed to create {}", path.display()))
        })?;
        log::debug!("creating {} for {}", path.display(), schema);
        Self::try_new(BufWriter::new(file), schema, session)
    }
}

impl<W: Write> FileWriter<W> {
    /// Start writing arrays of `schema` to `write`. The leading magic is written immediately.
    pub fn try_new(mut write: W, schema: Schema, session: Arc<Session>) -> QuiverResult<Self> {
        if schema.is_released() {
            quiver_bail!(InvalidArgument: "cannot write a file with a released schema");
        }
        write.write_all(&MAGIC)?;
        let compression = session.write_options().compression();
        Ok(Self {
            write: Some(write),
            session,
            schema,
            compression,
            position: MAGIC.len() as u64,
            row_groups: Vec::new(),
            num_rows: 0,
        })
    }

    /// The schema of the file.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The codec applied to row groups written from now on.
    pub fn compression(&self) -> CompressionCodec {
        self.compression
    }

    /// Compress every row group written after this call with `codec`.
    pub fn set_compression(&mut self, codec: CompressionCodec) -> QuiverResult<()> {
        self.session.compressors().get(codec)?;
        log::debug!("switching compression from {} to {}", self.compression, codec);
        self.compression = codec;
        Ok(())
    }

    /// Rows written so far.
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Row groups written so far.
    pub fn num_row_groups(&self) -> usize {
        self.row_groups.len()
    }

    /// Whether [`FileWriter::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.write.is_none()
    }

    /// Write `batch` as a new row group.
    ///
    /// For struct schemas the children of `batch` are the columns; otherwise `batch` is the
    /// single column. On failure the file is left in an unspecified state.
    pub fn write_batch(&mut self, batch: &Array) -> QuiverResult<()> {
        let Some(write) = self.write.as_mut() else {
            quiver_bail!(InvalidArgument: "cannot write to a closed file writer");
        };
        let columns = column_schemas(&self.schema);
        let arrays = column_arrays(&self.schema, batch);
        if arrays.len() != columns.len() {
            quiver_bail!(
                InvalidArgument: "batch has {} columns, schema {} has {}",
                arrays.len(),
                self.schema,
                columns.len()
            );
        }
        if self.session.write_options().verify_row_counts() {
            if let Some(bad) = arrays.iter().find(|a| a.len() != batch.len()) {
                quiver_bail!(
                    InvalidArgument: "column of {} rows in a batch of {} rows",
                    bad.len(),
                    batch.len()
                );
            }
        }

        let compressors = self.session.compressors();
        let mut chunks = Vec::with_capacity(columns.len());
        let mut content = ByteBuffer::empty();
        for (index, (array, schema)) in arrays.into_iter().zip(columns).enumerate() {
            content.resize(0)?;
            write_array_content(&mut content, array, schema)?;
            let compressed = compressors.compress(self.compression, &content)?;
            write.write_all(&compressed)?;

            chunks.push(ColumnChunkFooter {
                name: column_name(schema, index),
                codec: self.compression.into(),
                encoding: Encoding::Plain.into(),
                offset: self.position,
                compressed_size: compressed.len() as u64,
                uncompressed_size: content.len() as u64,
                num_values: array.len() as u64,
                null_count: array.null_count() as u64,
            });
            self.position += compressed.len() as u64;
        }

        let row_group = RowGroupFooter {
            num_rows: batch.len() as u64,
            columns: chunks,
        };
        log::debug!(
            "wrote row group {} with {} rows: {} bytes, {} compressed with {}",
            self.row_groups.len(),
            row_group.num_rows,
            row_group.columns.iter().map(|c| c.uncompressed_size).sum::<u64>(),
            row_group.columns.iter().map(|c| c.compressed_size).sum::<u64>(),
            self.compression
        );
        self.num_rows += row_group.num_rows;
        self.row_groups.push(row_group);
        Ok(())
    }

    /// Write every array of `stream` as its own row group. Returns the number of batches written.
    pub fn write_stream<S: ArrayStream + ?Sized>(
        &mut self,
        stream: &mut S,
    ) -> QuiverResult<usize> {
        let schema = stream.schema()?;
        if schema.format() != self.schema.format()
            || schema.n_children() != self.schema.n_children()
        {
            quiver_bail!(
                InvalidArgument: "stream schema {} does not match file schema {}",
                schema,
                self.schema
            );
        }
        let mut count = 0;
        while let Some(array) = stream.next_array()? {
            self.write_batch(&array)?;
            count += 1;
        }
        Ok(count)
    }

    /// Write the footer and the end-of-file marker, then flush. Closing again does nothing.
    pub fn close(&mut self) -> QuiverResult<()> {
        self.finish().map(drop)
    }

    /// Close the writer and return the underlying sink.
    pub fn into_inner(mut self) -> QuiverResult<W> {
        self.finish()?
            .ok_or_else(|| quiver_err!(InvalidArgument: "file writer is already closed"))
    }

    fn finish(&mut self) -> QuiverResult<Option<W>> {
        let Some(mut write) = self.write.take() else {
            return Ok(None);
        };
        let footer = FileFooter {
            version: u32::from(FILE_VERSION),
            created_by: self.session.write_options().created_by().to_string(),
            schema: encode_schema(&self.schema)?.into_vec(),
            row_groups: std::mem::take(&mut self.row_groups),
        };
        let footer_bytes = footer.encode_to_vec();
        let footer_len = u32::try_from(footer_bytes.len()).map_err(|_| {
            quiver_err!(InvalidArgument: "footer of {} bytes is too large", footer_bytes.len())
        })?;
        write.write_all(&footer_bytes)?;
        write.write_all(
            &EndOfFile {
                version: FILE_VERSION,
                footer_len,
            }
            .to_bytes(),
        )?;
        write.flush()?;
        log::debug!(
            "closed file with {} rows in {} row groups, footer of {} bytes",
            self.num_rows,
            footer.row_groups.len(),
            footer_len
        );
        self.row_groups = footer.row_groups;
        Ok(Some(write))
    }
}
