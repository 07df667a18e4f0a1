use std::fmt::Debug;

/// A fixed-width value that can be stored in a [`ByteBuffer`](crate::ByteBuffer) using
/// little-endian byte order.
pub trait NativeType: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// The width of one value in bytes.
    const WIDTH: usize;

    /// Decode a value from exactly [`Self::WIDTH`] bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode a value into exactly [`Self::WIDTH`] bytes.
    fn write_le(&self, out: &mut [u8]);
}

macro_rules! native_type {
    ($T:ty) => {
        impl NativeType for $T {
            const WIDTH: usize = size_of::<$T>();

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$T>()];
                raw.copy_from_slice(bytes);
                <$T>::from_le_bytes(raw)
            }

            #[inline]
            fn write_le(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

native_type!(u8);
native_type!(u16);
native_type!(u32);
native_type!(u64);
native_type!(i8);
native_type!(i16);
native_type!(i32);
native_type!(i64);
native_type!(f32);
native_type!(f64);
