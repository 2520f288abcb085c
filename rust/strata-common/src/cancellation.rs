use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation flag.
///
/// Clones share the same state: cancelling any clone is observed by all of them.
/// Long-running operations poll [`Cancellation::is_cancelled`] at well-defined
/// boundaries and stop early when it is set. Cancellation is one-way.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// Creates a token in the "not cancelled" state.
    pub fn new() -> Cancellation {
        Cancellation::default()
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Marks the token as cancelled.
    ///
    /// Returns `true` if this call performed the transition, `false` if the token
    /// was already cancelled.
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Cancellation;

    #[test]
    fn test_cancellation_shared_between_clones() {
        let token = Cancellation::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        assert!(token.cancel());
        assert!(observer.is_cancelled());
        assert!(!observer.cancel());
    }
}
