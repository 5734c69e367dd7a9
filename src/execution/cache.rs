//! Compute-once caching for complex operations.
//!
//! A complex operation's setup (for example a whole-image statistics pass)
//! must run at most once per execution no matter how many tile workers
//! touch the operation first. [`ComputeOnce`] is the primitive that
//! guarantees this: a mutex-guarded slot written at most once, then read
//! as shared immutable data.

use parking_lot::Mutex;
use std::sync::Arc;

/// A synchronized lazy cell scoped to one operation instance and one
/// execution.
///
/// First access computes the value while holding the lock, so concurrent
/// first readers block for the one-time setup cost and then all share the
/// same `Arc`. This is deliberately check-compute-under-lock rather than a
/// lock-free double-checked scheme: the blocking window is bounded by the
/// setup cost, and every later access is an uncontended lock plus an `Arc`
/// clone.
pub struct ComputeOnce<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> ComputeOnce<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Get the cached value, computing it on first access.
    ///
    /// At most one caller ever runs `compute`; others wait and reuse the
    /// result. With an acyclic graph, nested computations only ever take
    /// locks of upstream operations, so lock order follows the DAG and
    /// cannot deadlock.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> T) -> Arc<T> {
        let mut slot = self.slot.lock();
        if let Some(value) = slot.as_ref() {
            return value.clone();
        }
        let value = Arc::new(compute());
        *slot = Some(value.clone());
        value
    }

    /// The cached value, if already computed.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.lock().clone()
    }

    /// Whether a value has been computed.
    pub fn is_computed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Release the cached value, returning it to the caller.
    ///
    /// Called from `deinit_execution`; idempotent. The payload is freed
    /// when the last `Arc` drops.
    pub fn clear(&self) -> Option<Arc<T>> {
        self.slot.lock().take()
    }
}

impl<T> Default for ComputeOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ComputeOnce<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeOnce")
            .field("computed", &self.is_computed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_computes_once() {
        let cell = ComputeOnce::new();
        let calls = AtomicUsize::new(0);

        let first = cell.get_or_compute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        });
        let second = cell.get_or_compute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            99
        });

        assert_eq!(*first, 42);
        assert_eq!(*second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_access_is_serialized() {
        let cell = Arc::new(ComputeOnce::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    *cell.get_or_compute(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        7u32
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let cell = ComputeOnce::new();
        cell.get_or_compute(|| 1);
        assert!(cell.is_computed());

        assert!(cell.clear().is_some());
        assert!(!cell.is_computed());
        assert!(cell.clear().is_none());
    }
}
