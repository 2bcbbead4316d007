//! Per-participant state machine.
//!
//! Small `Debug, Clone` records owned by the scheduler, never cross-owned.

use std::collections::BTreeSet;

use crate::resource::ResourceId;

/// Identifies an operation. `0` is reserved for the implicit main
/// operation created by `attach`.
pub type OperationId = u64;

/// What an operation is currently blocked on: a named resource, or the
/// completion of another operation (the latter backs `join_operation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WaitTarget {
    Resource(ResourceId),
    Completion(OperationId),
}

/// Lifecycle state of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Registered via `create_operation`, not yet started.
    None,
    /// Runnable; a candidate for the next scheduling decision.
    Enabled,
    /// Blocked on one or more `waited_resources`.
    Waiting,
    /// Reached `complete_operation`; never scheduled again.
    Completed,
}

/// A single logical participant in the controlled execution, usually
/// backed by one host thread.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub status: OperationStatus,
    pub waited_resources: BTreeSet<WaitTarget>,
}

impl Operation {
    pub fn new(id: OperationId) -> Self {
        Operation {
            id,
            status: OperationStatus::None,
            waited_resources: BTreeSet::new(),
        }
    }

    /// `Waiting` iff `waited_resources` is non-empty.
    pub fn recompute_waiting_status(&mut self) {
        if self.status == OperationStatus::Waiting && self.waited_resources.is_empty() {
            self.status = OperationStatus::Enabled;
        }
    }
}
