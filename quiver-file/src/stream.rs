use std::ops::Range;

use quiver_array::{Array, ArrayStream, Schema};
use quiver_error::{QuiverResult, quiver_bail};

use crate::read_at::ReadAt;
use crate::reader::FileReader;

/// An [`ArrayStream`] yielding one batch per row group of a file.
///
/// Row groups are read lazily as the stream is pulled.
pub struct FileArrayStream<R> {
    reader: Option<FileReader<R>>,
    schema: Schema,
    row_groups: Range<usize>,
    projection: Option<Vec<usize>>,
    last_error: Option<String>,
}

impl<R: ReadAt> FileArrayStream<R> {
    pub(crate) fn new(
        reader: FileReader<R>,
        schema: Schema,
        row_groups: Range<usize>,
        projection: Option<Vec<usize>>,
    ) -> Self {
        Self {
            reader: Some(reader),
            schema,
            row_groups,
            projection,
            last_error: None,
        }
    }

    /// Number of row groups not yet yielded.
    pub fn remaining(&self) -> usize {
        self.row_groups.len()
    }

    fn read_next(&mut self) -> QuiverResult<Option<Array>> {
        let Some(reader) = self.reader.as_ref() else {
            quiver_bail!(InvalidArgument: "stream has been released");
        };
        let Some(index) = self.row_groups.next() else {
            log::trace!("file stream exhausted");
            return Ok(None);
        };
        reader
            .read_batch(index, self.projection.as_deref())
            .map(Some)
    }
}

impl<R: ReadAt> ArrayStream for FileArrayStream<R> {
    fn schema(&mut self) -> QuiverResult<Schema> {
        if self.reader.is_none() {
            quiver_bail!(InvalidArgument: "stream has been released");
        }
        Ok(self.schema.clone())
    }

    fn next_array(&mut self) -> QuiverResult<Option<Array>> {
        self.read_next()
            .inspect_err(|e| self.last_error = Some(e.message()))
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            self.schema.release();
            self.row_groups = 0..0;
        }
    }

    fn is_released(&self) -> bool {
        self.reader.is_none()
    }
}
