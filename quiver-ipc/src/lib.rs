//! The Quiver wire format.
//!
//! A compact, deterministic, little-endian encoding of [`Schema`](quiver_array::Schema) and
//! [`Array`](quiver_array::Array) values for transient storage and transport. Each standalone
//! message starts with a `u32` magic and a `u32` version:
//!
//! ```text
//! schema  := magic(QVSC) version schema-content
//! array   := magic(QVAR) version array-content
//! batch   := magic(QVBT) version schema-content array-content
//!
//! schema-content := u32 format_len, format, u32 name_len, name, i64 flags,
//!                   i64 n_children, schema-content*
//! array-content  := i64 length, i64 null_count, i64 offset, i64 n_buffers, i64 n_children,
//!                   (u64 size, bytes)*, array-content*
//! ```
//!
//! Buffer sizes are derived from the format code of the matching schema, so arrays are always
//! encoded against a schema. The [`MessageWriter`] and [`MessageReader`] frame messages with a
//! `u64` length prefix to carry many of them over a byte stream.

mod decoder;
mod encoder;
mod messages;
mod stream;

pub use decoder::*;
pub use encoder::*;
pub use messages::*;
pub use stream::*;

/// Magic number of a standalone schema message.
pub const SCHEMA_MAGIC: u32 = u32::from_le_bytes(*b"QVSC");
/// Magic number of a standalone array message.
pub const ARRAY_MAGIC: u32 = u32::from_le_bytes(*b"QVAR");
/// Magic number of a schema and array pair.
pub const BATCH_MAGIC: u32 = u32::from_le_bytes(*b"QVBT");
/// The version of the wire format written by this crate.
pub const VERSION: u32 = 1;
/// Nesting deeper than this is rejected when decoding.
pub const MAX_DEPTH: usize = 64;
