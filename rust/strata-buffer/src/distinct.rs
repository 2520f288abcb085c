//! Bounded distinct-value tracking.

use std::hash::Hash;

/// Counts distinct keys up to a limit.
///
/// Once the number of distinct keys exceeds the limit, tracking is abandoned for good:
/// the set is dropped and [`count()`](Self::count) reports `None` from then on.
#[derive(Debug)]
pub struct DistinctTracker<K> {
    set: Option<ahash::HashSet<K>>,
    limit: usize,
}

impl<K: Hash + Eq> DistinctTracker<K> {
    /// Creates a tracker for at most `limit` distinct keys, or a permanently
    /// disabled tracker if `limit` is `None`.
    pub fn new(limit: Option<usize>) -> DistinctTracker<K> {
        DistinctTracker {
            set: limit.map(|_| ahash::HashSet::default()),
            limit: limit.unwrap_or(0),
        }
    }

    /// Whether keys are still being collected.
    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.set.is_some()
    }

    /// Number of distinct keys observed, or `None` if tracking is off.
    pub fn count(&self) -> Option<usize> {
        self.set.as_ref().map(|set| set.len())
    }

    /// Records a key. No-op once tracking is off.
    pub fn observe(&mut self, key: K) {
        if let Some(set) = self.set.as_mut() {
            set.insert(key);
            if set.len() > self.limit {
                log::debug!(
                    "distinct item limit {} exceeded, tracking disabled",
                    self.limit
                );
                self.set = None;
            }
        }
    }
}
