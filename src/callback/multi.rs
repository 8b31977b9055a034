//! Counting join over many completions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::callback::{Completion, OpResult};
use crate::store::StoreError;

pub(crate) struct JoinInner {
    remaining: AtomicUsize,
    first_error: Mutex<Option<StoreError>>,
    done: Mutex<Option<Completion>>,
}

impl JoinInner {
    /// Count one child resolution. The downstream completion fires exactly
    /// once, after the last child, with the first error seen (if any).
    pub(crate) fn complete_one(&self, result: OpResult) {
        if let Err(e) = result {
            let mut slot = self.first_error.lock().unwrap();
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "join counted more resolutions than children");
        if prev == 1 {
            let done = self.done.lock().unwrap().take();
            if let Some(done) = done {
                let first_error = self.first_error.lock().unwrap().take();
                match first_error {
                    Some(e) => done.resolve(Err(e)),
                    None => done.resolve(Ok(())),
                }
            }
        }
    }
}

/// Joins `count` child completions into one downstream completion.
///
/// Any-error policy: the downstream resolves after *all* children have
/// resolved, carrying the first error observed.
pub struct MultiCompletion {
    inner: Arc<JoinInner>,
    handed_out: AtomicUsize,
    count: usize,
}

impl MultiCompletion {
    /// A join of size zero resolves the downstream immediately.
    pub fn new(count: usize, done: Completion) -> Self {
        let done = if count == 0 {
            done.resolve(Ok(()));
            None
        } else {
            Some(done)
        };
        Self {
            inner: Arc::new(JoinInner {
                remaining: AtomicUsize::new(count),
                first_error: Mutex::new(None),
                done: Mutex::new(done),
            }),
            handed_out: AtomicUsize::new(0),
            count,
        }
    }

    /// Hand out the next child completion.
    ///
    /// Panics when asked for more children than the join was sized for; that
    /// is always a caller bug and would otherwise corrupt the count.
    pub fn child(&self) -> Completion {
        let n = self.handed_out.fetch_add(1, Ordering::SeqCst);
        assert!(
            n < self.count,
            "requested child {} of a join sized {}",
            n + 1,
            self.count
        );
        Completion::for_join(Arc::clone(&self.inner))
    }

    /// Children that have not yet resolved.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Completion;

    #[tokio::test]
    async fn test_join_waits_for_all_children() {
        let (done, handle) = Completion::new();
        let join = MultiCompletion::new(3, done);
        let a = join.child();
        let b = join.child();
        let c = join.child();

        a.resolve(Ok(()));
        b.resolve(Ok(()));
        assert_eq!(join.remaining(), 1);
        c.resolve(Ok(()));
        assert_eq!(handle.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_first_error_wins_but_all_are_awaited() {
        let (done, handle) = Completion::new();
        let join = MultiCompletion::new(3, done);
        let a = join.child();
        let b = join.child();
        let c = join.child();

        a.resolve(Err(StoreError::SessionExpired));
        b.resolve(Err(StoreError::ConnectionLoss));
        c.resolve(Ok(()));
        assert_eq!(handle.wait().await, Err(StoreError::SessionExpired));
    }

    #[tokio::test]
    async fn test_empty_join_resolves_immediately() {
        let (done, handle) = Completion::new();
        let _join = MultiCompletion::new(0, done);
        assert_eq!(handle.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_canceled_child_counts_as_resolution() {
        let (done, handle) = Completion::new();
        let join = MultiCompletion::new(2, done);
        join.child().cancel();
        join.child().resolve(Ok(()));
        assert_eq!(handle.wait().await, Err(StoreError::Canceled));
    }
}
