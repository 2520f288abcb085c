//! Lazily converted views over read-only buffers.

use std::{borrow::Cow, marker::PhantomData};

use strata_common::Result;

use crate::ReadOnlyBuffer;

/// A [`ReadOnlyBuffer`] whose items are those of an inner buffer mapped through a
/// function.
///
/// Nothing is converted up front: every block access fetches the inner block and maps
/// its items. The block structure of the inner buffer is preserved.
pub struct ConvertedBuffer<B, F, U> {
    inner: B,
    f: F,
    _p: PhantomData<fn() -> U>,
}

/// Wraps `inner` into a view converting each item with `f`.
pub fn convert<B, F, U>(inner: B, f: F) -> ConvertedBuffer<B, F, U>
where
    B: ReadOnlyBuffer,
    F: Fn(&B::Item) -> U,
    U: Clone,
{
    ConvertedBuffer {
        inner,
        f,
        _p: PhantomData,
    }
}

impl<B, F, U> ConvertedBuffer<B, F, U> {
    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B, F, U> ReadOnlyBuffer for ConvertedBuffer<B, F, U>
where
    B: ReadOnlyBuffer,
    F: Fn(&B::Item) -> U,
    U: Clone,
{
    type Item = U;

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn block_count(&self) -> usize {
        self.inner.block_count()
    }

    fn block_sizes(&self) -> Vec<usize> {
        self.inner.block_sizes()
    }

    fn get_block(&self, index: usize) -> Result<Cow<'_, [U]>> {
        let block = self.inner.get_block(index)?;
        Ok(Cow::Owned(block.iter().map(&self.f).collect()))
    }
}
