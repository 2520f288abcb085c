use std::{io, ops::Range, sync::RwLock};

use strata_io::{
    ReadAt, SharedIoBuffer, WriteAt, temp_file_store::TemporaryFileStore, verify,
};

use crate::budget::{Allocation, Budget};

pub struct InMemoryTempFileStore {
    budget: Budget,
}

impl InMemoryTempFileStore {
    pub fn new(capacity: u64) -> InMemoryTempFileStore {
        InMemoryTempFileStore {
            budget: Budget::new(capacity),
        }
    }

    pub fn available_space(&self) -> u64 {
        self.budget.remaining()
    }

    fn create_temp_buffer(&self, size_hint: Option<usize>) -> io::Result<InMemoryTempBuffer> {
        let size_hint = size_hint.unwrap_or(0) as u64;
        let mut allocation = self.budget.allocate(0)?;
        allocation.reserve(size_hint)?;
        Ok(InMemoryTempBuffer {
            data: Vec::with_capacity(size_hint as usize),
            allocation,
        })
    }
}

impl TemporaryFileStore for InMemoryTempFileStore {
    fn allocate_shared_buffer(
        &self,
        size_hint: Option<usize>,
    ) -> io::Result<Box<dyn SharedIoBuffer>> {
        self.create_temp_buffer(size_hint)
            .map(|t| Box::new(Shared(RwLock::new(t))) as Box<dyn SharedIoBuffer>)
    }
}

struct InMemoryTempBuffer {
    data: Vec<u8>,
    allocation: Allocation,
}

impl InMemoryTempBuffer {
    fn ensure_allocation_for_size(&mut self, size: usize) -> io::Result<()> {
        assert_eq!(self.allocation.amount(), self.data.len() as u64);
        if size > self.data.len() {
            let grow = size - self.data.len();
            self.allocation.grow(grow as u64)?;
        }
        Ok(())
    }

    fn set_size_impl(&mut self, size: u64) -> io::Result<()> {
        if size < self.data.len() as u64 {
            self.data.truncate(size as usize);
            self.allocation.shrink_to(size);
        } else {
            self.ensure_allocation_for_size(size as usize)?;
            self.data.resize(size as usize, 0);
        }
        Ok(())
    }

    fn write_at_impl(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let end_pos = pos + buf.len() as u64;
        self.ensure_allocation_for_size(end_pos as usize)?;

        if pos == self.data.len() as u64 {
            self.data.extend_from_slice(buf);
        } else {
            if end_pos > self.data.len() as u64 {
                self.data.resize(end_pos as usize, 0);
            }
            self.data[pos as usize..end_pos as usize].copy_from_slice(buf);
        }
        Ok(())
    }

    fn read_at_impl(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        verify!(range.end >= range.start);
        let end = range.end.min(self.data.len() as u64);
        if end > range.start {
            Ok(self.data[range.start as usize..end as usize].to_vec())
        } else {
            Ok(Vec::new())
        }
    }
}

struct Shared(RwLock<InMemoryTempBuffer>);

impl Shared {
    fn read(&self) -> io::Result<std::sync::RwLockReadGuard<'_, InMemoryTempBuffer>> {
        self.0
            .read()
            .map_err(|_| io::Error::other("temp buffer lock poisoned"))
    }

    fn write(&self) -> io::Result<std::sync::RwLockWriteGuard<'_, InMemoryTempBuffer>> {
        self.0
            .write()
            .map_err(|_| io::Error::other("temp buffer lock poisoned"))
    }
}

impl ReadAt for Shared {
    fn size(&self) -> io::Result<u64> {
        Ok(self.read()?.data.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        self.read()?.read_at_impl(range)
    }
}

impl WriteAt for Shared {
    fn write_at(&self, pos: u64, buf: &[u8]) -> io::Result<()> {
        self.write()?.write_at_impl(pos, buf)
    }
}

impl SharedIoBuffer for Shared {
    fn set_size(&self, size: u64) -> io::Result<()> {
        self.write()?.set_size_impl(size)
    }
}
