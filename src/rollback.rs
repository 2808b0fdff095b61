//! Compensating actions for partially applied operations.
//!
//! Each forward step that commits a side effect pushes the action that undoes
//! it. On success the log is committed and nothing runs; on failure it is
//! unwound in strict reverse order.
//!
//! ```text
//!  push(release name) ─► push(delete id) ─► push(delete storage) ─► fail
//!                                                                   │
//!        delete storage ◄─ delete id ◄─ release name ◄──────────────┘
//! ```
//!
//! Actions must be idempotent and tolerate acting on state that was only
//! partly created. An action's own failure is logged and never replaces the
//! error that triggered the unwind.

use crate::error::Result;
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

type UndoFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type UndoFn = Box<dyn FnOnce() -> UndoFuture + Send>;

struct Action {
    description: String,
    undo: UndoFn,
}

/// Ordered stack of compensating actions owned by one operation.
pub struct RollbackLog {
    operation: String,
    actions: Vec<Action>,
}

impl RollbackLog {
    /// Creates an empty log for `operation` (used in log lines).
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            actions: Vec::new(),
        }
    }

    /// Records the action undoing a step that has just committed.
    pub fn push<F, Fut>(&mut self, description: impl Into<String>, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.actions.push(Action {
            description: description.into(),
            undo: Box::new(move || Box::pin(undo())),
        });
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Discards all actions; the operation succeeded.
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Runs all actions in reverse order of registration.
    pub async fn unwind(mut self) {
        while let Some(action) = self.actions.pop() {
            info!(operation = %self.operation, "Rollback: {}", action.description);
            if let Err(e) = (action.undo)().await {
                warn!(
                    operation = %self.operation,
                    error = %e,
                    "Rollback action failed: {}",
                    action.description
                );
            }
        }
    }
}

impl Drop for RollbackLog {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                operation = %self.operation,
                pending = self.actions.len(),
                "Rollback log dropped with pending actions"
            );
        }
    }
}

impl std::fmt::Debug for RollbackLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackLog")
            .field("operation", &self.operation)
            .field(
                "actions",
                &self.actions.iter().map(|a| &a.description).collect::<Vec<_>>(),
            )
            .finish()
    }
}
