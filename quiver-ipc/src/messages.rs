use std::io::{ErrorKind, Read, Write};

use quiver_array::{Array, ArrayStream, Schema};
use quiver_error::{QuiverResult, quiver_bail, quiver_err};

use crate::{
    ARRAY_MAGIC, BATCH_MAGIC, SCHEMA_MAGIC, decode_array, decode_batch, decode_schema,
    encode_array, encode_batch, encode_schema,
};

/// A decoded standalone message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A schema message.
    Schema(Schema),
    /// An array message.
    Array(Array),
    /// A schema and array pair.
    Batch(Schema, Array),
}

impl Message {
    /// Decode any standalone message, dispatching on its magic.
    pub fn decode(bytes: &[u8]) -> QuiverResult<Self> {
        let Some(magic) = bytes.first_chunk::<4>().map(|m| u32::from_le_bytes(*m)) else {
            quiver_bail!(Truncated: "message of {} bytes has no magic", bytes.len());
        };
        match magic {
            SCHEMA_MAGIC => decode_schema(bytes).map(Message::Schema),
            ARRAY_MAGIC => decode_array(bytes).map(Message::Array),
            BATCH_MAGIC => decode_batch(bytes).map(|(schema, array)| Message::Batch(schema, array)),
            _ => quiver_bail!(FormatMismatch: "unknown message magic {:#010x}", magic),
        }
    }
}

/// Writes length-prefixed messages to a byte sink.
///
/// Each frame is a `u64` little-endian length followed by one standalone message.
pub struct MessageWriter<W> {
    write: W,
    frames: usize,
}

impl<W: Write> MessageWriter<W> {
    /// Wrap a byte sink.
    pub fn new(write: W) -> Self {
        Self { write, frames: 0 }
    }

    /// Write a schema frame.
    pub fn write_schema(&mut self, schema: &Schema) -> QuiverResult<()> {
        self.write_frame(&encode_schema(schema)?)
    }

    /// Write an array frame.
    pub fn write_array(&mut self, array: &Array, schema: &Schema) -> QuiverResult<()> {
        self.write_frame(&encode_array(array, schema)?)
    }

    /// Write a batch frame.
    pub fn write_batch(&mut self, schema: &Schema, array: &Array) -> QuiverResult<()> {
        self.write_frame(&encode_batch(schema, array)?)
    }

    /// Write the schema of `stream` followed by one array frame per element. Returns the number
    /// of arrays written.
    pub fn write_stream<S: ArrayStream + ?Sized>(&mut self, stream: &mut S) -> QuiverResult<usize> {
        let schema = stream.schema()?;
        self.write_schema(&schema)?;
        let mut count = 0;
        while let Some(array) = stream.next_array()? {
            self.write_array(&array, &schema)?;
            count += 1;
        }
        log::debug!("wrote stream of {count} arrays for {schema}");
        Ok(count)
    }

    fn write_frame(&mut self, message: &[u8]) -> QuiverResult<()> {
        self.write.write_all(&(message.len() as u64).to_le_bytes())?;
        self.write.write_all(message)?;
        self.frames += 1;
        Ok(())
    }

    /// Number of frames written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> QuiverResult<()> {
        Ok(self.write.flush()?)
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.write
    }
}

/// Reads length-prefixed messages from a byte source.
pub struct MessageReader<R> {
    read: R,
}

impl<R: Read> MessageReader<R> {
    /// Wrap a byte source.
    pub fn new(read: R) -> Self {
        Self { read }
    }

    /// Read the bytes of the next frame. Returns `None` on a clean end of input at a frame
    /// boundary.
    pub fn read_frame(&mut self) -> QuiverResult<Option<Vec<u8>>> {
        let mut len = [0u8; 8];
        let mut filled = 0;
        while filled < len.len() {
            match self.read.read(&mut len[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => return Ok(None),
            8 => {}
            _ => quiver_bail!(Truncated: "frame length cut after {} bytes", filled),
        }

        let len = u64::from_le_bytes(len);
        let mut frame = Vec::new();
        (&mut self.read).take(len).read_to_end(&mut frame)?;
        if (frame.len() as u64) < len {
            quiver_bail!(
                Truncated: "frame declares {} bytes but only {} remain",
                len,
                frame.len()
            );
        }
        Ok(Some(frame))
    }

    /// Read and decode the next message.
    pub fn next_message(&mut self) -> QuiverResult<Option<Message>> {
        self.read_frame()?
            .map(|frame| Message::decode(&frame))
            .transpose()
    }

    /// Read the next message and require it to be a schema.
    pub fn read_schema(&mut self) -> QuiverResult<Schema> {
        match self.next_message()? {
            Some(Message::Schema(schema)) => Ok(schema),
            Some(_) => Err(quiver_err!(FormatMismatch: "expected a schema message")),
            None => Err(quiver_err!(Truncated: "expected a schema message, found end of input")),
        }
    }

    /// Returns the underlying source.
    pub fn into_inner(self) -> R {
        self.read
    }
}
