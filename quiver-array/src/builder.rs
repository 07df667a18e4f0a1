//! Builders that assemble [`Array`]s from Rust values.

use std::marker::PhantomData;

use quiver_buffer::{ByteBuffer, NativeType, bitmap_len, set_bit};
use quiver_error::{QuiverResult, quiver_err};

use crate::Array;

/// Validity bitmap that is only materialized once the first null is appended.
#[derive(Debug, Default)]
struct LazyValidityBuilder {
    bits: Option<Vec<u8>>,
    len: usize,
    null_count: usize,
}

impl LazyValidityBuilder {
    fn append(&mut self, valid: bool) {
        if !valid && self.bits.is_none() {
            let mut bits = vec![0u8; bitmap_len(self.len + 1)];
            for i in 0..self.len {
                set_bit(&mut bits, i, true);
            }
            self.bits = Some(bits);
        }
        if let Some(bits) = self.bits.as_mut() {
            bits.resize(bitmap_len(self.len + 1), 0);
            set_bit(bits, self.len, valid);
        }
        if !valid {
            self.null_count += 1;
        }
        self.len += 1;
    }

    fn finish(self, array: &mut Array) {
        array.set_null_count(self.null_count);
        if let Some(bits) = self.bits {
            array.set_buffer(0, ByteBuffer::from(bits));
        }
    }
}

/// Builder for fixed-width arrays of `T`.
#[derive(Debug, Default)]
pub struct PrimitiveBuilder<T> {
    values: Vec<T>,
    validity: LazyValidityBuilder,
}

impl<T: NativeType> PrimitiveBuilder<T> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty builder with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            validity: LazyValidityBuilder::default(),
        }
    }

    /// Append a value.
    pub fn append_value(&mut self, value: T) {
        self.values.push(value);
        self.validity.append(true);
    }

    /// Append a null. The value slot holds zero.
    pub fn append_null(&mut self) {
        self.values.push(T::default());
        self.validity.append(false);
    }

    /// Append a value or a null.
    pub fn append_option(&mut self, value: Option<T>) {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null(),
        }
    }

    /// Number of appended elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build the array. The validity buffer is only present if a null was appended.
    pub fn finish(self) -> QuiverResult<Array> {
        let mut array = Array::new(self.values.len());
        array.set_n_buffers(2);
        array.set_buffer(1, ByteBuffer::from_values(&self.values)?);
        self.validity.finish(&mut array);
        Ok(array)
    }
}

impl<T: NativeType> FromIterator<Option<T>> for PrimitiveBuilder<T> {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        let mut builder = Self::new();
        iter.into_iter().for_each(|v| builder.append_option(v));
        builder
    }
}

/// Builder for bit-packed boolean arrays.
#[derive(Debug, Default)]
pub struct BoolBuilder {
    bits: Vec<u8>,
    len: usize,
    validity: LazyValidityBuilder,
}

impl BoolBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value or a null.
    pub fn append_option(&mut self, value: Option<bool>) {
        self.bits.resize(bitmap_len(self.len + 1), 0);
        set_bit(&mut self.bits, self.len, value.unwrap_or(false));
        self.validity.append(value.is_some());
        self.len += 1;
    }

    /// Append a value.
    pub fn append_value(&mut self, value: bool) {
        self.append_option(Some(value));
    }

    /// Build the array.
    pub fn finish(self) -> QuiverResult<Array> {
        let mut array = Array::new(self.len);
        array.set_n_buffers(2);
        array.set_buffer(1, ByteBuffer::from(self.bits));
        self.validity.finish(&mut array);
        Ok(array)
    }
}

/// Marker for UTF-8 element types.
#[derive(Debug, Default)]
pub struct Utf8;

/// Marker for binary element types.
#[derive(Debug, Default)]
pub struct Binary;

/// Builder for variable-width arrays with 32-bit offsets.
#[derive(Debug)]
pub struct VarBinBuilder<K> {
    offsets: Vec<i32>,
    data: Vec<u8>,
    validity: LazyValidityBuilder,
    _kind: PhantomData<K>,
}

/// Builder for UTF-8 arrays.
pub type Utf8Builder = VarBinBuilder<Utf8>;

/// Builder for binary arrays.
pub type BinaryBuilder = VarBinBuilder<Binary>;

impl<K> Default for VarBinBuilder<K> {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            data: Vec::new(),
            validity: LazyValidityBuilder::default(),
            _kind: PhantomData,
        }
    }
}

impl<K> VarBinBuilder<K> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_bytes(&mut self, bytes: &[u8], valid: bool) -> QuiverResult<()> {
        let end = i32::try_from(self.data.len() + bytes.len()).map_err(|_| {
            quiver_err!(
                InvalidArgument: "variable-width data exceeds {} bytes",
                i32::MAX
            )
        })?;
        self.data.extend_from_slice(bytes);
        self.offsets.push(end);
        self.validity.append(valid);
        Ok(())
    }

    /// Append a null.
    pub fn append_null(&mut self) -> QuiverResult<()> {
        self.push_bytes(&[], false)
    }

    /// Number of appended elements.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the array.
    pub fn finish(self) -> QuiverResult<Array> {
        let mut array = Array::new(self.offsets.len() - 1);
        array.set_n_buffers(3);
        array.set_buffer(1, ByteBuffer::from_values(&self.offsets)?);
        array.set_buffer(2, ByteBuffer::from(self.data));
        self.validity.finish(&mut array);
        Ok(array)
    }
}

impl VarBinBuilder<Utf8> {
    /// Append a string.
    pub fn append_value(&mut self, value: impl AsRef<str>) -> QuiverResult<()> {
        self.push_bytes(value.as_ref().as_bytes(), true)
    }

    /// Append a string or a null.
    pub fn append_option(&mut self, value: Option<impl AsRef<str>>) -> QuiverResult<()> {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null(),
        }
    }
}

impl VarBinBuilder<Binary> {
    /// Append a byte string.
    pub fn append_value(&mut self, value: impl AsRef<[u8]>) -> QuiverResult<()> {
        self.push_bytes(value.as_ref(), true)
    }

    /// Append a byte string or a null.
    pub fn append_option(&mut self, value: Option<impl AsRef<[u8]>>) -> QuiverResult<()> {
        match value {
            Some(value) => self.append_value(value),
            None => self.append_null(),
        }
    }
}
