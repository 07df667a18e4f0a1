use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::format::Layout;

/// Bit flags attached to a [`Schema`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SchemaFlags(i64);

impl SchemaFlags {
    /// For dictionary-encoded types, whether the dictionary is ordered.
    pub const DICTIONARY_ORDERED: SchemaFlags = SchemaFlags(1);
    /// Whether the field may contain nulls.
    pub const NULLABLE: SchemaFlags = SchemaFlags(2);
    /// For map types, whether the keys within each map value are sorted.
    pub const MAP_KEYS_SORTED: SchemaFlags = SchemaFlags(4);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap raw flag bits. Unknown bits are preserved.
    pub const fn from_bits(bits: i64) -> Self {
        Self(bits)
    }

    /// The raw flag bits.
    pub const fn bits(&self) -> i64 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(&self, other: SchemaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn union(self, other: SchemaFlags) -> Self {
        Self(self.0 | other.0)
    }
}

/// The type and structure of one column.
///
/// A schema exclusively owns its children and its dictionary schema. Releasing it releases the
/// whole subtree; releasing it again does nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    format: String,
    name: Option<String>,
    metadata: Option<Vec<u8>>,
    flags: SchemaFlags,
    children: Vec<Schema>,
    dictionary: Option<Box<Schema>>,
    released: bool,
}

impl Schema {
    /// Create a schema for the given format code with no name, metadata, flags or children.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Default::default()
        }
    }

    /// Create a struct schema (`+s`) with the given child columns.
    pub fn new_struct(children: impl IntoIterator<Item = Schema>) -> Self {
        let mut schema = Self::new(crate::format::STRUCT);
        schema.children = children.into_iter().collect();
        schema
    }

    /// Set the field name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the opaque metadata blob.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Set the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: SchemaFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark the field as nullable.
    #[must_use]
    pub fn nullable(self) -> Self {
        let flags = self.flags.union(SchemaFlags::NULLABLE);
        self.with_flags(flags)
    }

    /// The format code of the column.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The buffer layout implied by the format code.
    pub fn layout(&self) -> Layout {
        Layout::of(&self.format)
    }

    /// The field name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The opaque metadata blob, if any.
    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// The flags of the field.
    pub fn flags(&self) -> SchemaFlags {
        self.flags
    }

    /// Whether the field may contain nulls.
    pub fn is_nullable(&self) -> bool {
        self.flags.contains(SchemaFlags::NULLABLE)
    }

    /// Append a child schema.
    pub fn add_child(&mut self, child: Schema) {
        self.children.push(child);
    }

    /// Number of child schemas.
    pub fn n_children(&self) -> usize {
        self.children.len()
    }

    /// Borrow the child at `index`, or `None` if out of range.
    pub fn child(&self, index: usize) -> Option<&Schema> {
        self.children.get(index)
    }

    /// Borrow the child schemas.
    pub fn children(&self) -> &[Schema] {
        &self.children
    }

    /// Find the index of the child with the given name.
    pub fn child_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.name() == Some(name))
    }

    /// Install the dictionary value schema.
    pub fn set_dictionary(&mut self, dictionary: Schema) {
        self.dictionary = Some(Box::new(dictionary));
    }

    /// Borrow the dictionary value schema, if any.
    pub fn dictionary(&self) -> Option<&Schema> {
        self.dictionary.as_deref()
    }

    /// Take the children out of the schema, leaving it without children.
    pub fn take_children(&mut self) -> Vec<Schema> {
        std::mem::take(&mut self.children)
    }

    /// Take the dictionary out of the schema.
    pub fn take_dictionary(&mut self) -> Option<Schema> {
        self.dictionary.take().map(|d| *d)
    }

    /// Release the schema and its whole subtree. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for child in self.children.iter_mut() {
            child.release();
        }
        if let Some(dictionary) = self.dictionary.as_mut() {
            dictionary.release();
        }
        *self = Self {
            released: true,
            ..Default::default()
        };
    }

    /// Whether the schema has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{name}: ")?;
        }
        write!(f, "{}", self.format)?;
        if !self.children.is_empty() {
            write!(f, "<{}>", self.children.iter().format(", "))?;
        }
        if self.is_nullable() {
            write!(f, "?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{INT32, INT64, UTF8};

    fn sample() -> Schema {
        let mut schema = Schema::new_struct([
            Schema::new(INT64).with_name("id"),
            Schema::new(UTF8).with_name("label").nullable(),
        ]);
        schema.set_dictionary(Schema::new(INT32));
        schema
    }

    #[test]
    fn accessors() {
        let schema = sample();
        assert_eq!(schema.format(), "+s");
        assert_eq!(schema.n_children(), 2);
        assert_eq!(schema.child(1).and_then(|c| c.name()), Some("label"));
        assert!(schema.child(1).unwrap().is_nullable());
        assert!(schema.child(2).is_none());
        assert_eq!(schema.child_index("id"), Some(0));
        assert_eq!(schema.dictionary().map(|d| d.format()), Some(INT32));
        assert_eq!(schema.to_string(), "+s<id: l, label: u?>");
    }

    #[test]
    fn release_is_recursive_and_idempotent() {
        let mut schema = sample();
        schema.release();
        assert!(schema.is_released());
        assert_eq!(schema.n_children(), 0);
        assert!(schema.dictionary().is_none());
        assert_eq!(schema.format(), "");

        schema.release();
        assert!(schema.is_released());
    }

    #[test]
    fn flags_round_trip_unknown_bits() {
        let flags = SchemaFlags::from_bits(0b1010);
        assert!(flags.contains(SchemaFlags::NULLABLE));
        assert!(!flags.contains(SchemaFlags::DICTIONARY_ORDERED));
        assert_eq!(flags.bits(), 10);
    }
}
