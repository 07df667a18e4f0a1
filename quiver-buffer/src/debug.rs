use std::fmt::{Debug, Formatter};

/// Debug-formats a byte slice, showing at most the first [`TRUNC_SIZE`] bytes.
pub(crate) struct TruncatedDebug<'a>(pub(crate) &'a [u8]);

const TRUNC_SIZE: usize = 32;

impl Debug for TruncatedDebug<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, byte) in self.0.iter().take(TRUNC_SIZE).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > TRUNC_SIZE {
            write!(f, " ... {} more", self.0.len() - TRUNC_SIZE)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
#[allow(clippy::use_debug)]
mod test {
    use super::*;

    #[test]
    fn short_slices_are_printed_in_full() {
        assert_eq!(format!("{:?}", TruncatedDebug(&[0x01, 0xab])), "[01 ab]");
    }

    #[test]
    fn long_slices_are_truncated() {
        let bytes = [0u8; 40];
        let out = format!("{:?}", TruncatedDebug(&bytes));
        assert!(out.ends_with(" ... 8 more]"));
    }
}
