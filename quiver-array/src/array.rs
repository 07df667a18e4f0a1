use quiver_buffer::ByteBuffer;
use quiver_error::{QuiverResult, quiver_bail};

/// The physical data of one column.
///
/// An array owns every buffer it lists, its children and its dictionary. All reads of data
/// buffers are applied at `index + offset`, which lets an array describe a window into larger
/// buffers without copying them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Array {
    length: usize,
    null_count: usize,
    offset: usize,
    buffers: Vec<Option<ByteBuffer>>,
    children: Vec<Array>,
    dictionary: Option<Box<Array>>,
    released: bool,
}

impl Array {
    /// Create an array of `length` elements with no buffers or children.
    pub fn new(length: usize) -> Self {
        Self {
            length,
            ..Default::default()
        }
    }

    /// Create a struct array over `children`, with a single absent validity buffer.
    pub fn new_struct(length: usize, children: impl IntoIterator<Item = Array>) -> Self {
        let mut array = Self::new(length);
        array.buffers = vec![None];
        array.children = children.into_iter().collect();
        array
    }

    /// Set the number of nulls.
    #[must_use]
    pub fn with_null_count(mut self, null_count: usize) -> Self {
        self.null_count = null_count;
        self
    }

    /// Set the physical offset.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Number of logical elements.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the array has no logical elements.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of null elements.
    pub fn null_count(&self) -> usize {
        self.null_count
    }

    /// Offset applied to every data-buffer read.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Set the number of logical elements.
    pub fn set_len(&mut self, length: usize) {
        self.length = length;
    }

    /// Set the number of nulls.
    pub fn set_null_count(&mut self, null_count: usize) {
        self.null_count = null_count;
    }

    /// Set the physical offset.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Number of declared buffer slots, including absent ones.
    pub fn n_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Declare `n` buffer slots. New slots are absent; surplus slots are dropped.
    pub fn set_n_buffers(&mut self, n: usize) {
        self.buffers.resize_with(n, || None);
    }

    /// Install `buffer` at `index`, growing the buffer table with absent slots as needed.
    ///
    /// Any buffer previously at `index` is released.
    pub fn set_buffer(&mut self, index: usize, buffer: ByteBuffer) {
        if index >= self.buffers.len() {
            self.buffers.resize_with(index + 1, || None);
        }
        self.buffers[index] = Some(buffer);
    }

    /// Borrow buffer `index`. Returns `None` for absent slots and indices past the table.
    pub fn buffer(&self, index: usize) -> Option<&ByteBuffer> {
        self.buffers.get(index).and_then(Option::as_ref)
    }

    /// Take buffer `index` out of the array, leaving the slot absent.
    pub fn take_buffer(&mut self, index: usize) -> Option<ByteBuffer> {
        self.buffers.get_mut(index).and_then(Option::take)
    }

    /// Iterate every buffer slot.
    pub fn buffers(&self) -> impl Iterator<Item = Option<&ByteBuffer>> + '_ {
        self.buffers.iter().map(Option::as_ref)
    }

    /// Append a child array.
    pub fn add_child(&mut self, child: Array) {
        self.children.push(child);
    }

    /// Number of child arrays.
    pub fn n_children(&self) -> usize {
        self.children.len()
    }

    /// Borrow child `index`, or `None` if out of range.
    pub fn child(&self, index: usize) -> Option<&Array> {
        self.children.get(index)
    }

    /// Borrow the child arrays.
    pub fn children(&self) -> &[Array] {
        &self.children
    }

    /// Take the children out of the array, leaving it without children.
    pub fn take_children(&mut self) -> Vec<Array> {
        std::mem::take(&mut self.children)
    }

    /// Install the dictionary values array.
    pub fn set_dictionary(&mut self, dictionary: Array) {
        self.dictionary = Some(Box::new(dictionary));
    }

    /// Borrow the dictionary values array, if any.
    pub fn dictionary(&self) -> Option<&Array> {
        self.dictionary.as_deref()
    }

    /// Take the dictionary out of the array.
    pub fn take_dictionary(&mut self) -> Option<Array> {
        self.dictionary.take().map(|d| *d)
    }

    /// Narrow the array to `length` elements starting `start` elements in, without copying.
    ///
    /// The null count is kept as is, since it cannot be recomputed without scanning.
    pub fn slice(mut self, start: usize, length: usize) -> QuiverResult<Self> {
        match start.checked_add(length) {
            Some(end) if end <= self.length => {}
            _ => quiver_bail!(OutOfBounds: start.saturating_add(length), 0, self.length),
        }
        self.offset += start;
        self.length = length;
        Ok(self)
    }

    /// Release all buffers, children and the dictionary. Releasing twice is a no-op.
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
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.free();
        }
        *self = Self {
            released: true,
            ..Default::default()
        };
    }

    /// Whether the array has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }
}
