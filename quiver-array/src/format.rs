//! Interpretation of format codes into physical buffer layouts.
//!
//! Format codes follow the Arrow C data interface: a single character for most types, `+s` for
//! structs, `+l` for lists, and `t`-prefixed codes for temporal types that share the integer
//! layouts. This module is the one place that knows how many buffers a type uses and how many
//! bytes each buffer occupies. Unrecognised codes are treated as a validity buffer plus a data
//! buffer of unknown width so that newer producers can still be passed through.

use quiver_buffer::{ByteBuffer, bitmap_len};
use quiver_error::{QuiverResult, quiver_err};

/// Null type.
pub const NULL: &str = "n";
/// Bit-packed booleans.
pub const BOOL: &str = "b";
/// Signed 8-bit integer.
pub const INT8: &str = "c";
/// Unsigned 8-bit integer.
pub const UINT8: &str = "C";
/// Signed 16-bit integer.
pub const INT16: &str = "s";
/// Unsigned 16-bit integer.
pub const UINT16: &str = "S";
/// Signed 32-bit integer.
pub const INT32: &str = "i";
/// Unsigned 32-bit integer.
pub const UINT32: &str = "I";
/// Signed 64-bit integer.
pub const INT64: &str = "l";
/// Unsigned 64-bit integer.
pub const UINT64: &str = "L";
/// 16-bit float, stored as its raw bits.
pub const FLOAT16: &str = "e";
/// 32-bit float.
pub const FLOAT32: &str = "f";
/// 64-bit float.
pub const FLOAT64: &str = "g";
/// Variable-width binary with 32-bit offsets.
pub const BINARY: &str = "z";
/// Variable-width UTF-8 with 32-bit offsets.
pub const UTF8: &str = "u";
/// Struct of child columns.
pub const STRUCT: &str = "+s";
/// List with 32-bit offsets into a single child.
pub const LIST: &str = "+l";
/// Days since the epoch, as `i32`.
pub const DATE32: &str = "tdD";
/// Milliseconds since the epoch, as `i64`.
pub const DATE64: &str = "tdm";

/// Width of one logical element in the values buffer of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementWidth {
    /// The type carries no values buffer.
    None,
    /// One bit per element.
    Bits,
    /// A fixed number of bytes per element.
    Fixed(usize),
    /// Variable width, derived from an offsets buffer.
    Variable,
    /// The format code was not recognised.
    Unknown,
}

/// The role a physical buffer plays for a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// One validity bit per element.
    Validity,
    /// One value bit per element.
    Bits,
    /// Fixed-width values.
    Values(usize),
    /// `length + 1` 32-bit offsets.
    Offsets,
    /// Variable-width bytes addressed by the offsets buffer.
    Data,
    /// A buffer the layout does not account for.
    Unknown,
}

/// The physical layout implied by a format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    n_buffers: usize,
    width: ElementWidth,
    has_offsets: bool,
}

impl Layout {
    /// Interpret a format code.
    pub fn of(format: &str) -> Self {
        let (n_buffers, width, has_offsets) = match format {
            NULL => (0, ElementWidth::None, false),
            STRUCT => (1, ElementWidth::None, false),
            LIST => (2, ElementWidth::None, true),
            BOOL => (2, ElementWidth::Bits, false),
            UTF8 | BINARY => (3, ElementWidth::Variable, true),
            _ => match fixed_width(format) {
                Some(width) => (2, ElementWidth::Fixed(width), false),
                None => (2, ElementWidth::Unknown, false),
            },
        };
        Self {
            n_buffers,
            width,
            has_offsets,
        }
    }

    /// Number of physical buffers the type requires.
    pub fn n_buffers(&self) -> usize {
        self.n_buffers
    }

    /// Width of a single element of the values buffer.
    pub fn width(&self) -> ElementWidth {
        self.width
    }

    /// Whether the type uses variable-width values.
    pub fn is_variable(&self) -> bool {
        self.width == ElementWidth::Variable
    }

    /// The role of buffer `index`.
    pub fn buffer_kind(&self, index: usize) -> BufferKind {
        if index >= self.n_buffers {
            return BufferKind::Unknown;
        }
        match (index, self.width) {
            (0, _) => BufferKind::Validity,
            (1, _) if self.has_offsets => BufferKind::Offsets,
            (1, ElementWidth::Bits) => BufferKind::Bits,
            (1, ElementWidth::Fixed(width)) => BufferKind::Values(width),
            (2, ElementWidth::Variable) => BufferKind::Data,
            _ => BufferKind::Unknown,
        }
    }

    /// Number of bytes buffer `index` occupies for `len` physical elements.
    ///
    /// The size of a variable-width data buffer is read from the last entry of `offsets`; it is
    /// zero if the offsets buffer is missing or too short. Lengths whose buffers would not fit in
    /// the address space are rejected.
    pub fn buffer_len(
        &self,
        index: usize,
        len: usize,
        offsets: Option<&ByteBuffer>,
    ) -> QuiverResult<usize> {
        let bytes = match self.buffer_kind(index) {
            BufferKind::Validity | BufferKind::Bits => Some(bitmap_len(len)),
            BufferKind::Values(width) => len.checked_mul(width),
            BufferKind::Offsets => len
                .checked_add(1)
                .and_then(|n| n.checked_mul(size_of::<i32>())),
            BufferKind::Data => Some(
                offsets
                    .and_then(|offsets| offsets.value::<i32>(len))
                    .and_then(|end| usize::try_from(end).ok())
                    .unwrap_or(0),
            ),
            BufferKind::Unknown => Some(0),
        };
        bytes
            .filter(|&bytes| bytes <= isize::MAX.unsigned_abs())
            .ok_or_else(|| {
                quiver_err!(
                    InvalidArgument: "buffer {} of {} elements overflows the address space",
                    index,
                    len
                )
            })
    }
}

fn fixed_width(format: &str) -> Option<usize> {
    let width = match format {
        INT8 | UINT8 => 1,
        INT16 | UINT16 | FLOAT16 => 2,
        INT32 | UINT32 | FLOAT32 => 4,
        INT64 | UINT64 | FLOAT64 => 8,
        DATE32 => 4,
        DATE64 => 8,
        // time32 in seconds or milliseconds
        "tts" | "ttm" => 4,
        // time64 in microseconds or nanoseconds
        "ttu" | "ttn" => 8,
        // timestamps carry an optional timezone after the colon
        _ if format.starts_with("ts") && format.len() >= 3 => 8,
        // durations
        "tDs" | "tDm" | "tDu" | "tDn" => 8,
        _ => return None,
    };
    Some(width)
}

/// Number of buffers required by `format`.
pub fn n_buffers(format: &str) -> usize {
    Layout::of(format).n_buffers()
}

/// Element width of `format`.
pub fn element_width(format: &str) -> ElementWidth {
    Layout::of(format).width()
}

#[cfg(test)]
mod tests {
    use quiver_error::ErrorCode;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(NULL, 0, ElementWidth::None)]
    #[case(STRUCT, 1, ElementWidth::None)]
    #[case(LIST, 2, ElementWidth::None)]
    #[case(BOOL, 2, ElementWidth::Bits)]
    #[case(INT8, 2, ElementWidth::Fixed(1))]
    #[case(UINT16, 2, ElementWidth::Fixed(2))]
    #[case(INT32, 2, ElementWidth::Fixed(4))]
    #[case(FLOAT32, 2, ElementWidth::Fixed(4))]
    #[case(INT64, 2, ElementWidth::Fixed(8))]
    #[case(FLOAT64, 2, ElementWidth::Fixed(8))]
    #[case(DATE32, 2, ElementWidth::Fixed(4))]
    #[case(DATE64, 2, ElementWidth::Fixed(8))]
    #[case("tsu:UTC", 2, ElementWidth::Fixed(8))]
    #[case("tDn", 2, ElementWidth::Fixed(8))]
    #[case(UTF8, 3, ElementWidth::Variable)]
    #[case(BINARY, 3, ElementWidth::Variable)]
    #[case("?", 2, ElementWidth::Unknown)]
    #[case("w:16", 2, ElementWidth::Unknown)]
    fn layouts(#[case] format: &str, #[case] buffers: usize, #[case] width: ElementWidth) {
        assert_eq!(n_buffers(format), buffers);
        assert_eq!(element_width(format), width);
    }

    #[test]
    fn fixed_buffer_lengths() {
        let layout = Layout::of(INT64);
        assert_eq!(layout.buffer_len(0, 9, None).unwrap(), 2);
        assert_eq!(layout.buffer_len(1, 9, None).unwrap(), 72);
        assert_eq!(layout.buffer_len(2, 9, None).unwrap(), 0);
    }

    #[test]
    fn variable_buffer_lengths() {
        let offsets = ByteBuffer::from_values(&[0i32, 2, 2, 7]).unwrap();
        let layout = Layout::of(UTF8);
        assert_eq!(layout.buffer_kind(1), BufferKind::Offsets);
        assert_eq!(layout.buffer_len(1, 3, None).unwrap(), 16);
        assert_eq!(layout.buffer_len(2, 3, Some(&offsets)).unwrap(), 7);
        assert_eq!(layout.buffer_len(2, 3, None).unwrap(), 0);
    }

    #[test]
    fn list_offsets() {
        let layout = Layout::of(LIST);
        assert_eq!(layout.buffer_kind(1), BufferKind::Offsets);
        assert_eq!(layout.buffer_len(1, 2, None).unwrap(), 12);
    }

    #[test]
    fn bool_values_are_bitmaps() {
        let layout = Layout::of(BOOL);
        assert_eq!(layout.buffer_kind(1), BufferKind::Bits);
        assert_eq!(layout.buffer_len(1, 17, None).unwrap(), 3);
    }

    #[rstest]
    #[case(INT64, 1, 1 << 62)]
    #[case(INT32, 1, usize::MAX)]
    #[case(UTF8, 1, usize::MAX)]
    #[case(INT8, 1, usize::MAX)]
    fn oversized_lengths_are_rejected(
        #[case] format: &str,
        #[case] index: usize,
        #[case] len: usize,
    ) {
        let err = Layout::of(format).buffer_len(index, len, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
