//! Construction parameters of a [`CompositeBuffer`](crate::CompositeBuffer).

use serde::{Deserialize, Serialize};
use strata_common::{Result, verify_arg};

/// Block-size schedule and caps of a composite buffer.
///
/// The options can be built in code with the `with_*` setters, or deserialized from
/// configuration (missing fields fall back to their defaults):
///
/// ```json
/// { "initial_block_size": 128, "max_block_size": 4096, "max_in_memory_blocks": 16 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeBufferOptions {
    /// Item capacity of the first allocated block.
    pub initial_block_size: usize,

    /// Hard cap on the item capacity of any single block. Must not be less than
    /// `initial_block_size`.
    pub max_block_size: usize,

    /// Maximum number of filled blocks kept in memory. Filled blocks beyond this
    /// count are spilled to temporary storage. `None` never spills.
    pub max_in_memory_blocks: Option<usize>,

    /// Maximum number of distinct items to track. Once exceeded, distinct tracking
    /// is disabled for the rest of the buffer's life. `None` does not track.
    pub max_distinct_items: Option<usize>,
}

impl CompositeBufferOptions {
    pub const DEFAULT_INITIAL_BLOCK_SIZE: usize = 256;
    pub const DEFAULT_MAX_BLOCK_SIZE: usize = 32 * 1024;

    pub fn with_initial_block_size(mut self, initial_block_size: usize) -> Self {
        self.initial_block_size = initial_block_size;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_max_in_memory_blocks(mut self, max_in_memory_blocks: Option<usize>) -> Self {
        self.max_in_memory_blocks = max_in_memory_blocks;
        self
    }

    pub fn with_max_distinct_items(mut self, max_distinct_items: Option<usize>) -> Self {
        self.max_distinct_items = max_distinct_items;
        self
    }

    /// Checks the block-size schedule. Inconsistent options are rejected, never corrected.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(initial_block_size, self.initial_block_size > 0);
        verify_arg!(max_block_size, self.max_block_size >= self.initial_block_size);
        Ok(())
    }

    /// Capacity of the block allocated after a block of `previous` capacity
    /// (`None` for the first block).
    pub fn next_block_size(&self, previous: Option<usize>) -> usize {
        match previous {
            None => self.initial_block_size,
            Some(previous) => previous.saturating_mul(2).min(self.max_block_size),
        }
    }
}

impl Default for CompositeBufferOptions {
    fn default() -> CompositeBufferOptions {
        CompositeBufferOptions {
            initial_block_size: Self::DEFAULT_INITIAL_BLOCK_SIZE,
            max_block_size: Self::DEFAULT_MAX_BLOCK_SIZE,
            max_in_memory_blocks: None,
            max_distinct_items: None,
        }
    }
}
