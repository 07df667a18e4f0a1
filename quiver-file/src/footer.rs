//! On-disk footer and end-of-file marker.
//!
//! The footer is a protobuf message written after the last column chunk. It is followed by a
//! fixed-size end-of-file marker that records the footer length, so a reader can locate the
//! footer from the end of the file.

use quiver_error::{QuiverResult, quiver_bail};

use crate::compression::CompressionCodec;

/// Magic bytes at the start and the very end of every file.
pub const MAGIC: [u8; 4] = *b"QVF1";
/// Size of the end-of-file marker.
pub const EOF_SIZE: usize = 12;
/// The file format version written by this crate.
pub const FILE_VERSION: u16 = 1;

/// How the bytes of a column chunk are laid out before compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Encoding {
    /// Header-less wire-format array content.
    Plain = 0,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct FileFooter {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, tag = "2")]
    pub created_by: String,
    /// A standalone wire-format schema message.
    #[prost(bytes = "vec", tag = "3")]
    pub schema: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub row_groups: Vec<RowGroupFooter>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct RowGroupFooter {
    #[prost(uint64, tag = "1")]
    pub num_rows: u64,
    #[prost(message, repeated, tag = "2")]
    pub columns: Vec<ColumnChunkFooter>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ColumnChunkFooter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "CompressionCodec", tag = "2")]
    pub codec: i32,
    #[prost(enumeration = "Encoding", tag = "3")]
    pub encoding: i32,
    #[prost(uint64, tag = "4")]
    pub offset: u64,
    #[prost(uint64, tag = "5")]
    pub compressed_size: u64,
    #[prost(uint64, tag = "6")]
    pub uncompressed_size: u64,
    #[prost(uint64, tag = "7")]
    pub num_values: u64,
    #[prost(uint64, tag = "8")]
    pub null_count: u64,
}

/// The trailing `u16 version, u16 reserved, u32 footer length, magic` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EndOfFile {
    pub version: u16,
    pub footer_len: u32,
}

impl EndOfFile {
    pub fn to_bytes(self) -> [u8; EOF_SIZE] {
        let mut out = [0u8; EOF_SIZE];
        out[0..2].copy_from_slice(&self.version.to_le_bytes());
        out[4..8].copy_from_slice(&self.footer_len.to_le_bytes());
        out[8..12].copy_from_slice(&MAGIC);
        out
    }

    pub fn parse(bytes: &[u8; EOF_SIZE]) -> QuiverResult<Self> {
        if bytes[8..12] != MAGIC {
            quiver_bail!(
                FormatMismatch: "file does not end with magic \"{}\"",
                String::from_utf8_lossy(&MAGIC)
            );
        }
        let version = u16::from_le_bytes([bytes[0], bytes[1]]);
        if version != FILE_VERSION {
            quiver_bail!(
                UnsupportedVersion: "file version {}, expected {}",
                version,
                FILE_VERSION
            );
        }
        let footer_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            version,
            footer_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;
    use quiver_error::ErrorCode;

    use super::*;

    #[test]
    fn eof_bytes() {
        let eof = EndOfFile {
            version: FILE_VERSION,
            footer_len: 0x0102,
        };
        let bytes = eof.to_bytes();
        assert_eq!(bytes, [1, 0, 0, 0, 2, 1, 0, 0, b'Q', b'V', b'F', b'1']);
        assert_eq!(EndOfFile::parse(&bytes).unwrap(), eof);
    }

    #[test]
    fn eof_errors() {
        let mut bytes = EndOfFile {
            version: FILE_VERSION,
            footer_len: 0,
        }
        .to_bytes();
        bytes[0] = 9;
        assert_eq!(
            EndOfFile::parse(&bytes).unwrap_err().code(),
            ErrorCode::UnsupportedVersion
        );
        bytes[11] = b'0';
        assert_eq!(
            EndOfFile::parse(&bytes).unwrap_err().code(),
            ErrorCode::FormatMismatch
        );
    }

    #[test]
    fn column_codec_accessor() {
        let chunk = ColumnChunkFooter {
            codec: CompressionCodec::Zstd.into(),
            ..Default::default()
        };
        let decoded = ColumnChunkFooter::decode(chunk.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.codec(), CompressionCodec::Zstd);
        assert_eq!(decoded.encoding(), Encoding::Plain);
    }
}
