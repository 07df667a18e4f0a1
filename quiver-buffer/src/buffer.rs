use std::fmt::{Debug, Formatter};
use std::ops::Deref;

use bytes::Bytes;
use quiver_error::{QuiverResult, quiver_bail, quiver_err};

use crate::MIN_CAPACITY;
use crate::debug::TruncatedDebug;
use crate::native::NativeType;

/// A growable, exclusively owned region of bytes.
///
/// Every allocated byte is initialized: bytes past `len` but within `capacity` are either zero
/// or left over from a previous shrink, and are zeroed again before they become visible.
#[derive(Clone, Default)]
pub struct ByteBuffer {
    // data.len() is the capacity of the buffer.
    data: Vec<u8>,
    len: usize,
}

impl ByteBuffer {
    /// Create a new empty buffer. Does not allocate.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allocate a zero-initialized buffer of exactly `len` bytes.
    pub fn allocate(len: usize) -> QuiverResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| quiver_err!(AllocationFailed: len))?;
        data.resize(len, 0);
        Ok(Self { data, len })
    }

    /// Allocate a buffer holding a copy of `bytes`.
    pub fn copy_from(bytes: impl AsRef<[u8]>) -> QuiverResult<Self> {
        let bytes = bytes.as_ref();
        let mut buffer = Self::allocate(bytes.len())?;
        buffer.data.copy_from_slice(bytes);
        Ok(buffer)
    }

    /// Build a buffer from little-endian encoded values.
    pub fn from_values<T: NativeType>(values: &[T]) -> QuiverResult<Self> {
        let mut buffer = Self::allocate(values.len() * T::WIDTH)?;
        for (value, chunk) in values.iter().zip(buffer.data.chunks_exact_mut(T::WIDTH)) {
            value.write_le(chunk);
        }
        Ok(buffer)
    }

    /// Returns the number of bytes in use.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether no bytes are in use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of bytes allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the used bytes as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Returns the used bytes as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Set the used length of the buffer to `new_len`.
    ///
    /// Reallocates only when `new_len` exceeds the capacity. Bytes that become visible are zeroed,
    /// and shrinking leaves both the data and the capacity untouched.
    pub fn resize(&mut self, new_len: usize) -> QuiverResult<()> {
        if new_len > self.capacity() {
            self.grow(new_len)?;
        }
        if new_len > self.len {
            self.data[self.len..new_len].fill(0);
        }
        self.len = new_len;
        Ok(())
    }

    /// Ensure there is room for at least `additional` more bytes without reallocating.
    pub fn reserve(&mut self, additional: usize) -> QuiverResult<()> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or_else(|| quiver_err!(AllocationFailed: usize::MAX))?;
        if required > self.capacity() {
            self.grow(required)?;
        }
        Ok(())
    }

    /// Overwrite `data.len()` bytes starting at `offset`.
    ///
    /// Fails if the write would extend past the used length; the buffer is not grown.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> QuiverResult<()> {
        let end = self.checked_end(offset, data.len())?;
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Copy `data.len()` bytes starting at `offset` into `data`.
    ///
    /// Fails if the read would extend past the used length.
    pub fn read(&self, offset: usize, data: &mut [u8]) -> QuiverResult<()> {
        let end = self.checked_end(offset, data.len())?;
        data.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }

    /// Append bytes to the end of the buffer, growing it if required.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> QuiverResult<()> {
        let start = self.len;
        self.reserve(data.len())?;
        self.len += data.len();
        self.data[start..self.len].copy_from_slice(data);
        Ok(())
    }

    /// Append a single value in little-endian byte order.
    pub fn push<T: NativeType>(&mut self, value: T) -> QuiverResult<()> {
        let start = self.len;
        self.resize(start + T::WIDTH)?;
        value.write_le(&mut self.data[start..start + T::WIDTH]);
        Ok(())
    }

    /// Read the `index`-th little-endian value of type `T`, or `None` if it lies past the end.
    #[inline]
    pub fn value<T: NativeType>(&self, index: usize) -> Option<T> {
        let start = index.checked_mul(T::WIDTH)?;
        let end = start.checked_add(T::WIDTH)?;
        (end <= self.len).then(|| T::read_le(&self.data[start..end]))
    }

    /// Release all memory held by the buffer, leaving it empty.
    pub fn free(&mut self) {
        self.data = Vec::new();
        self.len = 0;
    }

    /// Convert into an immutable [`Bytes`] holding the used bytes.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.into_vec())
    }

    /// Convert into a `Vec<u8>` holding the used bytes.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }

    fn checked_end(&self, offset: usize, len: usize) -> QuiverResult<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(end),
            _ => quiver_bail!(
                InvalidArgument: "range {}..{}+{} exceeds buffer length {}",
                offset,
                offset,
                len,
                self.len
            ),
        }
    }

    fn grow(&mut self, required: usize) -> QuiverResult<()> {
        let new_capacity = required
            .max(self.capacity().saturating_mul(2))
            .max(MIN_CAPACITY);
        self.data
            .try_reserve_exact(new_capacity - self.data.len())
            .map_err(|_| quiver_err!(AllocationFailed: new_capacity))?;
        log::trace!(
            "growing buffer from {} to {} bytes",
            self.data.len(),
            new_capacity
        );
        self.data.resize(new_capacity, 0);
        Ok(())
    }
}

impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteBuffer {}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { data, len }
    }
}

impl Debug for ByteBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("data", &TruncatedDebug(self.as_slice()))
            .finish()
    }
}
