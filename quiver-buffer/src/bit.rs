/// Number of bytes needed to hold `bits` bits.
#[inline]
pub const fn bitmap_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Returns whether bit `index` is set, LSB-first within each byte.
///
/// Bits past the end of `bytes` read as unset.
#[inline]
pub fn get_bit(bytes: &[u8], index: usize) -> bool {
    bytes
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

/// Set or clear bit `index`, LSB-first within each byte.
///
/// ## Panics
///
/// Panics if `index / 8` is out of range for `bytes`.
#[inline]
pub fn set_bit(bytes: &mut [u8], index: usize, value: bool) {
    let mask = 1u8 << (index % 8);
    if value {
        bytes[index / 8] |= mask;
    } else {
        bytes[index / 8] &= !mask;
    }
}
