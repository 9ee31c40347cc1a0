//! Process-wide execution counter.
//!
//! The counter numbers successive non-silent executions in one kernel session
//! (`In [N]` in a notebook).  It is the only shared mutable state on the
//! request path and is updated atomically, so shell and control handlers can
//! read it concurrently without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// A monotonically increasing execution counter.
///
/// # Examples
///
/// ```rust
/// use nbkernel_server::ExecutionCounter;
///
/// let counter = ExecutionCounter::new();
/// assert_eq!(counter.current(), 0);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.current(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ExecutionCounter {
    inner: AtomicU32,
}

impl ExecutionCounter {
    /// Creates a counter whose first execution will be numbered 1.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a counter that has already seen `count` executions.
    pub fn starting_at(count: u32) -> Self {
        Self {
            inner: AtomicU32::new(count),
        }
    }

    /// Advances the counter and returns the new value.
    ///
    /// Saturates at `u32::MAX` instead of wrapping so the sequence never goes
    /// backwards.
    pub fn next(&self) -> u32 {
        let previous = self
            .inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or_else(|n| n);
        previous.saturating_add(1)
    }

    /// The number of the most recent execution (0 before the first).
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_execution_is_numbered_one() {
        let counter = ExecutionCounter::new();
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_current_does_not_advance() {
        // Arrange
        let counter = ExecutionCounter::starting_at(41);

        // Act
        let current = counter.current();
        let next = counter.next();

        // Assert
        assert_eq!(current, 41);
        assert_eq!(next, 42);
    }

    #[test]
    fn test_saturates_instead_of_wrapping() {
        let counter = ExecutionCounter::starting_at(u32::MAX);

        assert_eq!(counter.next(), u32::MAX);
        assert_eq!(counter.current(), u32::MAX);
    }

    #[test]
    fn test_concurrent_increments_are_unique() {
        // Arrange
        let counter = Arc::new(ExecutionCounter::new());
        let thread_count = 8;
        let increments_per_thread = 500;

        // Act
        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    (0..increments_per_thread)
                        .map(|_| c.next())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), thread_count * increments_per_thread);
        assert_eq!(counter.current() as usize, thread_count * increments_per_thread);
    }
}
