//! Storage budget accounting for temporary stores.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Represents a budget that can be allocated from.
#[derive(Clone)]
pub struct Budget(Arc<AtomicU64>);

impl Budget {
    /// Creates a new budget with the given amount.
    pub fn new(amount: u64) -> Budget {
        Budget(Arc::new(AtomicU64::new(amount)))
    }

    /// Returns the remaining amount in this budget.
    ///
    /// **Note**: This method is primarily intended for diagnostic purposes. The returned
    /// value may be outdated in a concurrent environment.
    pub fn remaining(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Attempts to allocate the specified amount from the budget.
    ///
    /// The allocated amount is automatically returned to the `Budget` when the
    /// `Allocation` is dropped.
    pub fn allocate(&self, amount: u64) -> Result<Allocation, AllocationError> {
        if self.withdraw(amount) {
            Ok(Allocation {
                budget: self.clone(),
                amount,
                reservation: 0,
            })
        } else {
            Err(AllocationError)
        }
    }

    fn withdraw(&self, amount: u64) -> bool {
        if amount == 0 {
            return true;
        }
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(amount)
            })
            .is_ok()
    }

    fn deposit(&self, amount: u64) {
        if amount != 0 {
            self.0.fetch_add(amount, Ordering::AcqRel);
        }
    }
}

/// Represents an allocation from a budget.
///
/// When the allocation is dropped, the allocated amount (including any reservation)
/// is returned to the budget.
pub struct Allocation {
    budget: Budget,
    amount: u64,
    reservation: u64,
}

impl Allocation {
    /// Currently allocated amount.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Currently reserved amount (on top of the allocated one).
    ///
    /// Calling `grow(n)` where `n <= reservation` always succeeds.
    pub fn reservation(&self) -> u64 {
        self.reservation
    }

    /// Amount taken from the budget by this allocation.
    pub fn capacity(&self) -> u64 {
        self.amount + self.reservation
    }

    /// Grows the allocation by the given amount.
    pub fn grow(&mut self, additional: u64) -> Result<(), AllocationError> {
        if additional > self.reservation {
            self.reserve(additional)?;
        }
        self.reservation -= additional;
        self.amount += additional;
        Ok(())
    }

    /// Shrinks the allocated amount, releasing the excess and any reservation.
    pub fn shrink_to(&mut self, amount: u64) {
        if amount <= self.amount {
            self.budget
                .deposit(self.amount - amount + self.reservation);
            self.amount = amount;
            self.reservation = 0;
        }
    }

    /// Reserves the specified amount for subsequent growth.
    pub fn reserve(&mut self, reservation: u64) -> Result<(), AllocationError> {
        if reservation <= self.reservation {
            return Ok(());
        }
        if self.budget.withdraw(reservation - self.reservation) {
            self.reservation = reservation;
            Ok(())
        } else {
            Err(AllocationError)
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.budget.deposit(self.capacity());
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation")
            .field("amount", &self.amount)
            .field("reservation", &self.reservation)
            .finish_non_exhaustive()
    }
}

/// An error that occurs when a budget allocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationError;

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Budget allocation error")
    }
}

impl std::error::Error for AllocationError {}

impl From<AllocationError> for std::io::Error {
    fn from(e: AllocationError) -> Self {
        std::io::Error::other(e)
    }
}
