//! Exactly-once completion primitives.
//!
//! # Responsibilities
//! - Carry the terminal outcome of one async store operation to its caller
//! - Guarantee exactly one resolution per operation (success, error, or
//!   cancellation), even when the operation is superseded or dropped
//! - Aggregate many operations into a single counting join
//!
//! # Design Decisions
//! - `resolve` consumes the cell, so double-resolution does not typecheck
//! - A `Drop` backstop resolves abandoned cells with `StoreError::Closed`
//!   so callers never wait on a completion that can no longer arrive
//! - Cancellation is just a resolution with `StoreError::Canceled`, which
//!   keeps it observable and idempotent for free

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::store::StoreError;

pub mod multi;

pub use multi::MultiCompletion;

/// The terminal outcome of an announce-layer operation.
pub type OpResult = Result<(), StoreError>;

enum Sink {
    Oneshot(oneshot::Sender<OpResult>),
    Join(Arc<multi::JoinInner>),
    Discard,
}

impl Sink {
    fn deliver(self, result: OpResult) {
        match self {
            // The handle may have been dropped; delivery is best effort.
            Sink::Oneshot(tx) => {
                let _ = tx.send(result);
            }
            Sink::Join(join) => join.complete_one(result),
            Sink::Discard => {}
        }
    }
}

/// A once-settable completion cell.
///
/// Created in a pair with a [`CompletionHandle`]; the operation side resolves
/// the cell, the caller side awaits the handle.
pub struct Completion {
    sink: Option<Sink>,
}

impl Completion {
    /// Create a completion and its awaitable handle.
    pub fn new() -> (Self, CompletionHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sink: Some(Sink::Oneshot(tx)),
            },
            CompletionHandle { rx },
        )
    }

    /// A completion nobody is waiting on, for internal fire-and-forget ops.
    pub fn discard() -> Self {
        Self {
            sink: Some(Sink::Discard),
        }
    }

    pub(crate) fn for_join(join: Arc<multi::JoinInner>) -> Self {
        Self {
            sink: Some(Sink::Join(join)),
        }
    }

    /// Resolve with the operation's terminal outcome. Consumes the cell.
    pub fn resolve(mut self, result: OpResult) {
        if let Some(sink) = self.sink.take() {
            sink.deliver(result);
        }
    }

    /// Resolve with the distinct cancellation outcome.
    pub fn cancel(self) {
        self.resolve(Err(StoreError::Canceled));
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.deliver(Err(StoreError::Closed));
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.sink.is_none())
            .finish()
    }
}

/// The caller side of a [`Completion`].
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<OpResult>,
}

impl CompletionHandle {
    /// Wait for the operation to reach its terminal outcome.
    pub async fn wait(self) -> OpResult {
        self.rx.await.unwrap_or(Err(StoreError::Closed))
    }

    /// Non-blocking probe; `None` while the operation is still pending.
    pub fn try_wait(&mut self) -> Option<OpResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(StoreError::Closed)),
        }
    }
}
