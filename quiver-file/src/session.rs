use crate::compression::{CompressionCodec, Compressor, CompressorRegistry};

/// Options applied to every file written through a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    compression: CompressionCodec,
    created_by: String,
    verify_row_counts: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::Lz4,
            created_by: format!("quiver {}", env!("CARGO_PKG_VERSION")),
            verify_row_counts: true,
        }
    }
}

impl WriteOptions {
    /// Set the codec column chunks are compressed with.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self
    }

    /// Set the writer identification stored in the footer.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Whether to reject struct batches whose columns disagree with the batch length.
    #[must_use]
    pub fn with_verify_row_counts(mut self, verify_row_counts: bool) -> Self {
        self.verify_row_counts = verify_row_counts;
        self
    }

    /// The codec column chunks are compressed with.
    pub fn compression(&self) -> CompressionCodec {
        self.compression
    }

    /// The writer identification stored in the footer.
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Whether struct batches are checked for consistent column lengths.
    pub fn verify_row_counts(&self) -> bool {
        self.verify_row_counts
    }
}

/// Process-wide state shared by file readers and writers.
///
/// Create one per process and share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct Session {
    compressors: CompressorRegistry,
    write_options: WriteOptions,
}

impl Session {
    /// A session with every built-in codec and default write options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default write options.
    #[must_use]
    pub fn with_write_options(mut self, write_options: WriteOptions) -> Self {
        self.write_options = write_options;
        self
    }

    /// Register an additional compressor, replacing the built-in one for its codec.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Box<dyn Compressor>) -> Self {
        self.compressors.register(compressor);
        self
    }

    /// The codec registry.
    pub fn compressors(&self) -> &CompressorRegistry {
        &self.compressors
    }

    /// The default write options.
    pub fn write_options(&self) -> &WriteOptions {
        &self.write_options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = WriteOptions::default();
        assert_eq!(options.compression(), CompressionCodec::Lz4);
        assert!(options.created_by().starts_with("quiver "));
        assert!(options.verify_row_counts());
    }

    #[test]
    fn session_carries_options() {
        let session = Session::new()
            .with_write_options(WriteOptions::default().with_compression(CompressionCodec::Zstd));
        assert_eq!(
            session.write_options().compression(),
            CompressionCodec::Zstd
        );
        assert!(session.compressors().get(CompressionCodec::Zstd).is_ok());
    }
}
