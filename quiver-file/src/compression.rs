//! Block compression of column chunks.
//!
//! Every column chunk is compressed as one block with the codec selected on the writer. The codec
//! identifier is persisted next to the chunk, together with its size before and after
//! compression.

use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::io::Read;

use quiver_error::{QuiverResult, quiver_bail, quiver_err};

/// Closed set of codecs a column chunk can be compressed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CompressionCodec {
    /// Stored as is.
    Uncompressed = 0,
    /// LZ4 block format with a 4-byte size prefix.
    Lz4 = 1,
    /// Zstandard frame at level 1.
    Zstd = 2,
}

impl Display for CompressionCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CompressionCodec::Uncompressed => "uncompressed",
            CompressionCodec::Lz4 => "lz4",
            CompressionCodec::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// A compression algorithm, identified by the codec it implements.
pub trait Compressor: Send + Sync + Debug {
    /// The codec this compressor implements.
    fn codec(&self) -> CompressionCodec;

    /// Compress `data`. May borrow the input when no work is needed.
    fn compress<'a>(&self, data: &'a [u8]) -> QuiverResult<Cow<'a, [u8]>>;

    /// Decompress `data`, which is known to expand to `uncompressed_len` bytes.
    fn decompress<'a>(
        &self,
        data: &'a [u8],
        uncompressed_len: usize,
    ) -> QuiverResult<Cow<'a, [u8]>>;
}

/// Pass-through compressor.
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Uncompressed
    }

    fn compress<'a>(&self, data: &'a [u8]) -> QuiverResult<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8], _: usize) -> QuiverResult<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

/// Upper bound on how far one byte of an LZ4 block can expand.
const LZ4_MAX_RATIO: usize = 256;

/// LZ4 compressor using `lz4_flex`.
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Lz4
    }

    fn compress<'a>(&self, data: &'a [u8]) -> QuiverResult<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(
        &self,
        data: &'a [u8],
        uncompressed_len: usize,
    ) -> QuiverResult<Cow<'a, [u8]>> {
        // Check the size prefix before lz4_flex allocates for it.
        let prefix = data
            .first_chunk::<4>()
            .map(|p| u32::from_le_bytes(*p) as usize)
            .ok_or_else(|| quiver_err!(Compression: "lz4 block is missing its size prefix"))?;
        if prefix != uncompressed_len {
            quiver_bail!(
                Compression: "lz4 block expands to {} bytes, expected {}",
                prefix,
                uncompressed_len
            );
        }
        if prefix > (data.len() - 4).saturating_mul(LZ4_MAX_RATIO).saturating_add(16) {
            quiver_bail!(
                Compression: "lz4 block of {} bytes cannot expand to {} bytes",
                data.len(),
                prefix
            );
        }
        lz4_flex::decompress_size_prepended(data)
            .map(Cow::Owned)
            .map_err(|e| quiver_err!(Compression: "lz4: {}", e))
    }
}

/// Zstandard compressor using the `zstd` bulk API.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Compressor at the given compression level.
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Compressor for ZstdCompressor {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Zstd
    }

    fn compress<'a>(&self, data: &'a [u8]) -> QuiverResult<Cow<'a, [u8]>> {
        zstd::bulk::compress(data, self.level)
            .map(Cow::Owned)
            .map_err(|e| quiver_err!(Compression: "zstd: {}", e))
    }

    fn decompress<'a>(
        &self,
        data: &'a [u8],
        uncompressed_len: usize,
    ) -> QuiverResult<Cow<'a, [u8]>> {
        // The frame header and the footer must agree before anything is allocated.
        match zstd::zstd_safe::get_frame_content_size(data) {
            Ok(Some(declared)) if declared != uncompressed_len as u64 => quiver_bail!(
                Compression: "zstd frame expands to {} bytes, expected {}",
                declared,
                uncompressed_len
            ),
            Ok(_) => {}
            Err(e) => quiver_bail!(Compression: "zstd: {}", e),
        }
        // Frames without a content size are read incrementally, so the output only grows as far
        // as the data really expands.
        let mut out = Vec::new();
        zstd::stream::read::Decoder::with_buffer(data)
            .map_err(|e| quiver_err!(Compression: "zstd: {}", e))?
            .take((uncompressed_len as u64).saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| quiver_err!(Compression: "zstd: {}", e))?;
        Ok(Cow::Owned(out))
    }
}

/// Maps codec identifiers to [`Compressor`] implementations.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// A registry holding every built-in codec.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(NoCompression));
        registry.register(Box::new(Lz4Compressor));
        registry.register(Box::new(ZstdCompressor::default()));
        registry
    }

    /// A registry with no codecs.
    pub fn empty() -> Self {
        Self {
            algorithms: Vec::new(),
        }
    }

    /// Register a compressor, replacing any previous one for the same codec.
    pub fn register(&mut self, compressor: Box<dyn Compressor>) {
        let id = slot(compressor.codec());
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        self.algorithms[id] = Some(compressor);
    }

    /// Look up the compressor for `codec`.
    pub fn get(&self, codec: CompressionCodec) -> QuiverResult<&dyn Compressor> {
        self.algorithms
            .get(slot(codec))
            .and_then(Option::as_deref)
            .ok_or_else(|| quiver_err!(Compression: "no compressor registered for {}", codec))
    }

    /// Compress `data` with `codec`.
    pub fn compress<'a>(
        &self,
        codec: CompressionCodec,
        data: &'a [u8],
    ) -> QuiverResult<Cow<'a, [u8]>> {
        self.get(codec)?.compress(data)
    }

    /// Decompress `data` with `codec`, checking that it expands to exactly `uncompressed_len`
    /// bytes.
    pub fn decompress<'a>(
        &self,
        codec: CompressionCodec,
        data: &'a [u8],
        uncompressed_len: usize,
    ) -> QuiverResult<Cow<'a, [u8]>> {
        let out = self.get(codec)?.decompress(data, uncompressed_len)?;
        if out.len() != uncompressed_len {
            quiver_bail!(
                Compression: "{} chunk expanded to {} bytes, expected {}",
                codec,
                out.len(),
                uncompressed_len
            );
        }
        Ok(out)
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn slot(codec: CompressionCodec) -> usize {
    usize::try_from(i32::from(codec)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use quiver_error::ErrorCode;
    use rstest::rstest;

    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 17).to_le_bytes()).collect()
    }

    #[rstest]
    #[case(CompressionCodec::Uncompressed)]
    #[case(CompressionCodec::Lz4)]
    #[case(CompressionCodec::Zstd)]
    fn codecs_restore_input(#[case] codec: CompressionCodec) {
        let registry = CompressorRegistry::new();
        let data = sample();
        let compressed = registry.compress(codec, &data).unwrap();
        if codec != CompressionCodec::Uncompressed {
            assert!(compressed.len() < data.len());
        }
        let restored = registry.decompress(codec, &compressed, data.len()).unwrap();
        assert_eq!(restored.as_ref(), data.as_slice());
    }

    #[rstest]
    #[case(CompressionCodec::Uncompressed)]
    #[case(CompressionCodec::Lz4)]
    #[case(CompressionCodec::Zstd)]
    fn wrong_length_is_a_compression_error(#[case] codec: CompressionCodec) {
        let registry = CompressorRegistry::new();
        let data = sample();
        let compressed = registry.compress(codec, &data).unwrap();
        let err = registry
            .decompress(codec, &compressed, data.len() - 1)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Compression);
    }

    #[test]
    fn missing_codec() {
        let registry = CompressorRegistry::empty();
        let err = registry.get(CompressionCodec::Zstd).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Compression);
    }

    #[test]
    fn zstd_footer_size_is_checked_before_allocating() {
        let compressed = ZstdCompressor::default().compress(b"hello hello").unwrap();
        let err = ZstdCompressor::default()
            .decompress(&compressed, 1 << 50)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Compression);
    }

    #[test]
    fn zstd_garbage_input() {
        let err = ZstdCompressor::default()
            .decompress(&[1, 2, 3, 4, 5], 1 << 50)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Compression);
    }

    #[test]
    fn lz4_prefix_beyond_expansion_bound() {
        let mut block = (u32::MAX).to_le_bytes().to_vec();
        block.extend_from_slice(&[0x10, b'a']);
        let err = Lz4Compressor
            .decompress(&block, u32::MAX as usize)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Compression);
    }

    #[test]
    fn garbage_lz4_input() {
        let err = Lz4Compressor.decompress(&[1, 2], 10).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Compression);
    }
}
