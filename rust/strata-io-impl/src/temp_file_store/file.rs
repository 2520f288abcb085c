use std::{
    fs::File,
    io,
    ops::Range,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use strata_io::{
    ReadAt, SharedIoBuffer, WriteAt, temp_file_store::TemporaryFileStore, verify,
};

use crate::budget::{Allocation, Budget};

/// A temporary store placing every buffer into its own anonymous file inside
/// a store-owned temporary directory.
#[derive(Clone)]
pub struct LocalTempFileStore(Arc<LocalTempContainer>);

impl LocalTempFileStore {
    pub fn new(capacity: u64, parent_path: Option<&Path>) -> io::Result<LocalTempFileStore> {
        let container = if let Some(parent) = parent_path {
            tempfile::tempdir_in(parent)?
        } else {
            tempfile::tempdir()?
        };
        log::debug!(
            "created temp file store at {} (capacity {capacity})",
            container.path().display()
        );
        let budget = Budget::new(capacity);
        Ok(LocalTempFileStore(Arc::new(LocalTempContainer {
            budget,
            container,
        })))
    }

    pub fn path(&self) -> &Path {
        self.0.container.path()
    }

    pub fn available_space(&self) -> u64 {
        self.0.budget.remaining()
    }

    fn create_temp_file(&self, size_hint: Option<usize>) -> io::Result<LocalTempFile> {
        let mut allocation = self.0.budget.allocate(0)?;
        allocation.reserve(size_hint.unwrap_or(0) as u64)?;
        let file = tempfile::tempfile_in(self.path())?;
        Ok(LocalTempFile {
            _container: self.0.clone(),
            file,
            state: Mutex::new(FileState {
                allocation,
                size: 0,
            }),
        })
    }
}

struct LocalTempContainer {
    budget: Budget,
    container: tempfile::TempDir,
}

impl TemporaryFileStore for LocalTempFileStore {
    fn allocate_shared_buffer(
        &self,
        size_hint: Option<usize>,
    ) -> io::Result<Box<dyn SharedIoBuffer>> {
        self.create_temp_file(size_hint).map(|f| Box::new(f) as _)
    }
}

struct LocalTempFile {
    _container: Arc<LocalTempContainer>,
    file: File,
    state: Mutex<FileState>,
}

struct FileState {
    allocation: Allocation,
    size: u64,
}

impl LocalTempFile {
    fn state(&self) -> io::Result<MutexGuard<'_, FileState>> {
        self.state
            .lock()
            .map_err(|_| io::Error::other("temp file state lock poisoned"))
    }
}

impl ReadAt for LocalTempFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.state()?.size)
    }

    fn read_at(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        verify!(range.end >= range.start);
        let end = range.end.min(self.state()?.size);
        if end > range.start {
            let mut buf = vec![0u8; (end - range.start) as usize];
            strata_io::file::file_read_at_exact(&self.file, range.start, &mut buf)?;
            Ok(buf)
        } else {
            Ok(Vec::new())
        }
    }
}

impl WriteAt for LocalTempFile {
    fn write_at(&self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let end_pos = pos + buf.len() as u64;
        let mut state = self.state()?;
        if end_pos > state.size {
            let grow = end_pos - state.size;
            state.allocation.grow(grow)?;
        }
        match strata_io::file::file_write_at(&self.file, pos, buf) {
            Ok(()) => {
                state.size = state.size.max(end_pos);
                Ok(())
            }
            Err(e) => {
                let _ = self.file.set_len(state.size);
                let size = state.size;
                state.allocation.shrink_to(size);
                Err(e)
            }
        }
    }
}

impl SharedIoBuffer for LocalTempFile {
    fn set_size(&self, size: u64) -> io::Result<()> {
        let mut state = self.state()?;
        if size > state.size {
            let grow = size - state.size;
            state.allocation.grow(grow)?;
        }
        self.file.set_len(size)?;
        if size < state.size {
            state.allocation.shrink_to(size);
        }
        state.size = size;
        Ok(())
    }
}
