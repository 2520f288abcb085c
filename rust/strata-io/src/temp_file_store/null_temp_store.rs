use crate::{ReadAt, SharedIoBuffer, WriteAt};

use super::TemporaryFileStore;

/// A store whose buffers discard every write and always read back empty.
pub struct NullTempFileStore;

impl TemporaryFileStore for NullTempFileStore {
    fn allocate_shared_buffer(
        &self,
        _size_hint: Option<usize>,
    ) -> std::io::Result<Box<dyn SharedIoBuffer>> {
        Ok(Box::new(NullTempBuffer))
    }
}

struct NullTempBuffer;

impl ReadAt for NullTempBuffer {
    fn size(&self) -> std::io::Result<u64> {
        Ok(0)
    }

    fn read_at(&self, _range: std::ops::Range<u64>) -> std::io::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

impl WriteAt for NullTempBuffer {
    fn write_at(&self, _pos: u64, _buf: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedIoBuffer for NullTempBuffer {
    fn set_size(&self, _size: u64) -> std::io::Result<()> {
        Ok(())
    }
}
