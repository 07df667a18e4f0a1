#![deny(missing_docs)]

//! A growable byte buffer implementation for Quiver.
//!
//! Quiver arrays hold their data in a set of [`ByteBuffer`]s, and the wire codec uses the same
//! type as its scratch space while serializing.
//!
//! # Sizing
//! A buffer tracks a used `len` and an allocated `capacity`, with `len <= capacity` at all times.
//! Growth is geometric: when a resize or append exceeds the capacity, the new capacity is the
//! largest of the requested size, twice the old capacity, and [`MIN_CAPACITY`]. Shrinking never
//! reallocates.

mod bit;
mod buffer;
mod debug;
mod native;

pub use bit::*;
pub use buffer::*;
pub use native::*;

/// The smallest capacity a buffer grows to once it has to reallocate.
pub const MIN_CAPACITY: usize = 256;
