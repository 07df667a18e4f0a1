#![deny(missing_docs)]

//! Schemas, arrays and streams following the Arrow C data model.
//!
//! A [`Schema`] describes the type of a column by its format code, and an [`Array`] holds the
//! physical buffers of that column. The [`format`] module maps format codes to buffer layouts,
//! and is consulted whenever the number or size of buffers has to be known.
//!
//! Both containers own their whole subtree. Releasing is recursive and idempotent.

mod accessor;
mod array;
pub mod builder;
pub mod format;
mod schema;
mod stream;

pub use accessor::*;
pub use array::*;
pub use schema::*;
pub use stream::*;
