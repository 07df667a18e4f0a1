use std::fs::File;
use std::sync::Arc;

use bytes::Bytes;
use quiver_error::{QuiverResult, quiver_bail};

/// A source that supports positional reads.
pub trait ReadAt {
    /// Number of readable bytes.
    fn size(&self) -> QuiverResult<u64>;

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Reading past the end of the source is a truncation error.
    fn read_at(&self, offset: u64, len: usize) -> QuiverResult<Bytes>;
}

impl ReadAt for Bytes {
    fn size(&self) -> QuiverResult<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, len: usize) -> QuiverResult<Bytes> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= self.len() => Ok(self.slice(start..end)),
            _ => quiver_bail!(
                Truncated: "read of {} bytes at {} exceeds source of {} bytes",
                len,
                offset,
                self.len()
            ),
        }
    }
}

impl ReadAt for File {
    fn size(&self) -> QuiverResult<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&self, offset: u64, len: usize) -> QuiverResult<Bytes> {
        let size = self.size()?;
        if offset.saturating_add(len as u64) > size {
            quiver_bail!(
                Truncated: "read of {} bytes at {} exceeds file of {} bytes",
                len,
                offset,
                size
            );
        }
        let mut buffer = vec![0u8; len];
        read_exact_at(self, &mut buffer, offset)?;
        Ok(Bytes::from(buffer))
    }
}

impl<T: ReadAt + ?Sized> ReadAt for Arc<T> {
    fn size(&self) -> QuiverResult<u64> {
        T::size(self)
    }

    fn read_at(&self, offset: u64, len: usize) -> QuiverResult<Bytes> {
        T::read_at(self, offset, len)
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buffer: &mut [u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buffer, offset)
}

#[cfg(not(unix))]
fn read_exact_at(mut file: &File, buffer: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buffer)
}
