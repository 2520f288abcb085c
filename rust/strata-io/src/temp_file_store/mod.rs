use crate::SharedIoBuffer;

pub mod null_temp_store;

/// The `TemporaryFileStore` trait provides temporary file-like objects
/// to consumers while managing the overall temporary storage budget.
pub trait TemporaryFileStore: Send + Sync + 'static {
    /// Allocates a temporary read/write buffer addressed by absolute byte offset.
    ///
    /// The allocated storage is released when the returned buffer is dropped.
    ///
    /// # Arguments
    ///
    /// * `size_hint` - An optional hint for the expected size of the buffer.
    fn allocate_shared_buffer(
        &self,
        size_hint: Option<usize>,
    ) -> std::io::Result<Box<dyn SharedIoBuffer>>;
}
