use std::collections::VecDeque;

use quiver_error::{QuiverResult, quiver_bail};

use crate::{Array, Schema};

/// A pull cursor over a sequence of [`Array`]s that all conform to one [`Schema`].
///
/// `next_array` returns `Ok(None)` once the stream is exhausted. A failing call records its
/// message so that it can be read back through [`ArrayStream::last_error`].
pub trait ArrayStream {
    /// A copy of the schema of every array in the stream.
    fn schema(&mut self) -> QuiverResult<Schema>;

    /// The next array, or `None` at the end of the stream.
    fn next_array(&mut self) -> QuiverResult<Option<Array>>;

    /// The message of the most recent failure, if any.
    fn last_error(&self) -> Option<&str>;

    /// Release the schema and every retained array. Releasing twice is a no-op.
    fn release(&mut self);

    /// Whether the stream has been released.
    fn is_released(&self) -> bool;
}

impl<S: ArrayStream + ?Sized> ArrayStream for Box<S> {
    fn schema(&mut self) -> QuiverResult<Schema> {
        (**self).schema()
    }

    fn next_array(&mut self) -> QuiverResult<Option<Array>> {
        (**self).next_array()
    }

    fn last_error(&self) -> Option<&str> {
        (**self).last_error()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_released(&self) -> bool {
        (**self).is_released()
    }
}

/// Extension methods for every [`ArrayStream`].
pub trait ArrayStreamExt: ArrayStream {
    /// Drain the stream into a vector.
    fn collect_arrays(&mut self) -> QuiverResult<Vec<Array>> {
        let mut arrays = Vec::new();
        while let Some(array) = self.next_array()? {
            arrays.push(array);
        }
        Ok(arrays)
    }
}

impl<S: ArrayStream + ?Sized> ArrayStreamExt for S {}

/// An [`ArrayStream`] over arrays held in memory.
#[derive(Debug, Default)]
pub struct ArrayStreamAdapter {
    schema: Schema,
    arrays: VecDeque<Array>,
    last_error: Option<String>,
    released: bool,
}

impl ArrayStreamAdapter {
    /// Create a stream that yields `arrays` in order.
    pub fn new(schema: Schema, arrays: impl IntoIterator<Item = Array>) -> Self {
        Self {
            schema,
            arrays: arrays.into_iter().collect(),
            last_error: None,
            released: false,
        }
    }

    /// Append another array to the end of the stream.
    pub fn push(&mut self, array: Array) {
        self.arrays.push_back(array);
    }

    /// Number of arrays not yet yielded.
    pub fn remaining(&self) -> usize {
        self.arrays.len()
    }

    fn fail<T>(&mut self, message: &str) -> QuiverResult<T> {
        self.last_error = Some(message.to_string());
        quiver_bail!(InvalidArgument: "{}", message)
    }
}

impl ArrayStream for ArrayStreamAdapter {
    fn schema(&mut self) -> QuiverResult<Schema> {
        if self.released {
            return self.fail("stream has been released");
        }
        Ok(self.schema.clone())
    }

    fn next_array(&mut self) -> QuiverResult<Option<Array>> {
        if self.released {
            return self.fail("stream has been released");
        }
        let next = self.arrays.pop_front();
        if next.is_none() {
            log::trace!("in-memory stream exhausted");
        }
        Ok(next)
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.schema.release();
        self.arrays.iter_mut().for_each(Array::release);
        self.arrays.clear();
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
