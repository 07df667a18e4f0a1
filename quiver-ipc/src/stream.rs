use std::io::Read;

use quiver_array::{Array, ArrayStream, Schema};
use quiver_error::{QuiverResult, quiver_bail};

use crate::{Message, MessageReader};

/// An [`ArrayStream`] over framed messages written by
/// [`MessageWriter::write_stream`](crate::MessageWriter::write_stream).
///
/// The leading schema frame is read eagerly. Array frames are yielded as they are read; batch
/// frames yield their array.
pub struct MessageArrayStream<R> {
    reader: Option<MessageReader<R>>,
    schema: Schema,
    last_error: Option<String>,
}

impl<R: Read> MessageArrayStream<R> {
    /// Read the schema frame from `read` and wrap the remaining frames.
    pub fn try_new(read: R) -> QuiverResult<Self> {
        let mut reader = MessageReader::new(read);
        let schema = reader.read_schema()?;
        Ok(Self {
            reader: Some(reader),
            schema,
            last_error: None,
        })
    }

    fn read_next(&mut self) -> QuiverResult<Option<Array>> {
        let Some(reader) = self.reader.as_mut() else {
            quiver_bail!(InvalidArgument: "stream has been released");
        };
        match reader.next_message()? {
            Some(Message::Array(array)) | Some(Message::Batch(_, array)) => Ok(Some(array)),
            Some(Message::Schema(_)) => {
                quiver_bail!(FormatMismatch: "unexpected schema message inside a stream")
            }
            None => {
                log::trace!("message stream exhausted");
                Ok(None)
            }
        }
    }
}

impl<R: Read> ArrayStream for MessageArrayStream<R> {
    fn schema(&mut self) -> QuiverResult<Schema> {
        if self.reader.is_none() {
            quiver_bail!(InvalidArgument: "stream has been released");
        }
        Ok(self.schema.clone())
    }

    fn next_array(&mut self) -> QuiverResult<Option<Array>> {
        self.read_next().inspect_err(|e| self.last_error = Some(e.message()))
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            self.schema.release();
        }
    }

    fn is_released(&self) -> bool {
        self.reader.is_none()
    }
}
