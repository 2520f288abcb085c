//! Fixed-capacity, append-only item blocks.

/// A capacity-bounded, append-only run of items.
///
/// The capacity is set at creation and never changes. Items are appended only at the
/// tail and are immutable once written.
#[derive(Debug, Clone)]
pub struct Block<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Block<T> {
    /// Creates an empty block able to hold `capacity` items.
    pub fn with_capacity(capacity: usize) -> Block<T> {
        Block {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of items written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fixed item capacity of the block.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn has_free_capacity(&self) -> bool {
        self.items.len() < self.capacity
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.capacity - self.items.len()
    }

    /// Appends an item at the tail.
    ///
    /// # Panics
    ///
    /// Panics if the block is full.
    #[inline]
    pub fn push(&mut self, item: T) {
        assert!(self.has_free_capacity(), "block is full");
        self.items.push(item);
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Clone> Block<T> {
    /// Copies as many leading items of `items` as fit into the free capacity.
    ///
    /// Returns the number of items written.
    pub fn write(&mut self, items: &[T]) -> usize {
        let count = items.len().min(self.free_capacity());
        self.items.extend_from_slice(&items[..count]);
        count
    }
}
