//! Typed value access over an [`Array`].
//!
//! Fixed-width getters return the type's zero value for null or out-of-range indices. Callers
//! that must tell a null apart from a stored zero use [`Array::null_state`].
//!
//! The validity bit of element `index` is read at `index` itself, while every data buffer is
//! read at `index + offset`. Sliced arrays with nulls therefore consult the validity bits of
//! the unsliced prefix.

use quiver_buffer::{NativeType, get_bit};

use crate::Array;

/// Null state of a single element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullState {
    /// The element is null.
    Null,
    /// The element holds a value.
    Valid,
    /// The index is out of range or the array has been released.
    Invalid,
}

impl NullState {
    /// The tri-state integer form: `1` null, `0` valid, `-1` invalid.
    pub fn as_i32(self) -> i32 {
        match self {
            NullState::Null => 1,
            NullState::Valid => 0,
            NullState::Invalid => -1,
        }
    }
}

macro_rules! typed_getter {
    ($($name:ident => $T:ty),* $(,)?) => {
        $(
            #[doc = concat!("Read element `index` as `", stringify!($T), "`, or zero if null or out of range.")]
            #[inline]
            pub fn $name(&self, index: usize) -> $T {
                self.value::<$T>(index)
            }
        )*
    };
}

impl Array {
    /// Null state of element `index`.
    pub fn null_state(&self, index: usize) -> NullState {
        if self.is_released() || index >= self.len() {
            return NullState::Invalid;
        }
        if self.null_count() == 0 {
            return NullState::Valid;
        }
        match self.buffer(0) {
            Some(validity) if !get_bit(validity, index) => NullState::Null,
            _ => NullState::Valid,
        }
    }

    /// Whether element `index` is null. Out-of-range indices are not null.
    pub fn is_null(&self, index: usize) -> bool {
        self.null_state(index) == NullState::Null
    }

    /// Read the fixed-width element `index` from buffer 1.
    pub fn value<T: NativeType>(&self, index: usize) -> T {
        if self.null_state(index) != NullState::Valid {
            return T::default();
        }
        self.buffer(1)
            .and_then(|values| values.value::<T>(index + self.offset()))
            .unwrap_or_default()
    }

    /// Read the bit-packed boolean element `index` from buffer 1.
    pub fn bool_value(&self, index: usize) -> bool {
        if self.null_state(index) != NullState::Valid {
            return false;
        }
        self.buffer(1)
            .is_some_and(|bits| get_bit(bits, index + self.offset()))
    }

    typed_getter!(
        i8_value => i8,
        u8_value => u8,
        i16_value => i16,
        u16_value => u16,
        i32_value => i32,
        u32_value => u32,
        i64_value => i64,
        u64_value => u64,
        f32_value => f32,
        f64_value => f64,
        date32_value => i32,
        date64_value => i64,
        time32_value => i32,
        time64_value => i64,
        timestamp_value => i64,
        duration_value => i64,
    );

    /// Borrow the bytes of the variable-width element `index`.
    ///
    /// Returns `None` for nulls, out-of-range indices and offsets that do not address the data
    /// buffer.
    pub fn binary_value(&self, index: usize) -> Option<&[u8]> {
        if self.null_state(index) != NullState::Valid {
            return None;
        }
        let offsets = self.buffer(1)?;
        let slot = index + self.offset();
        let start = usize::try_from(offsets.value::<i32>(slot)?).ok()?;
        let end = usize::try_from(offsets.value::<i32>(slot + 1)?).ok()?;
        if start > end {
            return None;
        }
        match self.buffer(2) {
            Some(data) => data.get(start..end),
            // An array whose elements are all empty may carry no data buffer.
            None if start == end => Some(&[]),
            None => None,
        }
    }

    /// Copy out the UTF-8 element `index`. Invalid UTF-8 is replaced lossily.
    pub fn utf8_value(&self, index: usize) -> Option<String> {
        self.binary_value(index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use quiver_buffer::ByteBuffer;

    use super::*;

    fn int32s(values: &[i32], validity: Option<u8>, null_count: usize) -> Array {
        let mut array = Array::new(values.len()).with_null_count(null_count);
        array.set_n_buffers(2);
        if let Some(bits) = validity {
            array.set_buffer(0, ByteBuffer::copy_from([bits]).unwrap());
        }
        array.set_buffer(1, ByteBuffer::from_values(values).unwrap());
        array
    }

    #[test]
    fn null_count_zero_ignores_validity() {
        let array = int32s(&[1, 2, 3], Some(0), 0);
        for i in 0..3 {
            assert_eq!(array.null_state(i), NullState::Valid);
        }
        assert_eq!(array.i32_value(2), 3);
    }

    #[test]
    fn nulls_follow_the_bitmap() {
        let array = int32s(&[1, 2, 3], Some(0b101), 1);
        assert!(!array.is_null(0));
        assert!(array.is_null(1));
        assert!(!array.is_null(2));
        assert_eq!(array.i32_value(1), 0);
        assert_eq!(array.i32_value(2), 3);
    }

    #[test]
    fn out_of_range_is_invalid() {
        let array = int32s(&[1], None, 0);
        assert_eq!(array.null_state(1).as_i32(), -1);
        assert_eq!(array.i32_value(1), 0);
        assert!(!array.is_null(1));
    }

    #[test]
    fn validity_is_read_without_offset() {
        // Element 1 of the view reads value slot 2 but validity bit 1.
        let array = int32s(&[10, 20, 30, 40], Some(0b1101), 1)
            .slice(1, 3)
            .unwrap();
        assert!(array.is_null(1));
        assert_eq!(array.i32_value(0), 20);
        assert_eq!(array.i32_value(1), 0);
        assert_eq!(array.i32_value(2), 40);
    }

    #[test]
    fn strings_and_binaries() {
        let mut array = Array::new(4).with_null_count(1);
        array.set_buffer(0, ByteBuffer::copy_from([0b1101u8]).unwrap());
        array.set_buffer(1, ByteBuffer::from_values(&[0i32, 2, 2, 2, 5]).unwrap());
        array.set_buffer(2, ByteBuffer::copy_from(b"abxyz").unwrap());

        assert_eq!(array.utf8_value(0).as_deref(), Some("ab"));
        assert_eq!(array.utf8_value(1), None);
        assert_eq!(array.utf8_value(2).as_deref(), Some(""));
        assert_eq!(array.binary_value(3), Some(b"xyz".as_slice()));
        assert_eq!(array.binary_value(4), None);
    }

    #[test]
    fn booleans_are_bit_packed() {
        let mut array = Array::new(10);
        array.set_buffer(1, ByteBuffer::copy_from([0b0000_0100u8, 0b10]).unwrap());
        assert!(array.bool_value(2));
        assert!(array.bool_value(9));
        assert!(!array.bool_value(3));
    }
}
