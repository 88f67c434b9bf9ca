#![forbid(unsafe_code)]
//! Per-scope cache entry for a resolved (or resolving, or failed) executor.
//!
//! Mirrors the teacher's `ReactiveNode` / `ReactiveNodeState` split
//! (`leptos_reactive::node`), except the *identity* (`NodeId`) is global
//! (assigned once per executor definition, see `registry.rs`) while the
//! *cache entry* below is scope-local: the same `NodeId` can be `Pending` in
//! one scope and `Resolved` in another.

use crate::error::RuntimeError;
use std::{any::Any, cell::RefCell, fmt, rc::Rc};

slotmap::new_key_type! {
    /// Stable identity of an executor, assigned once at definition time and
    /// valid across every scope that resolves it.
    pub struct NodeId;
}

pub(crate) type CleanupFn = Box<dyn FnOnce() -> Result<(), RuntimeError>>;

/// A type-erased resolved value, as carried through the cache, dependency
/// slots, and the extension wrap chain (§4.7). Public because a custom
/// [`crate::extension::Extension`]'s `wrap` sees the operation's payload at
/// this erased level and must be able to name the type.
pub type AnyValue = Rc<RefCell<dyn Any>>;

/// The state of one executor's cache entry within a single scope.
#[derive(Clone)]
pub(crate) enum CacheState {
    Pending,
    Resolved(AnyValue),
    Failed(Rc<RuntimeError>),
}

impl fmt::Debug for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Pending => write!(f, "Pending"),
            CacheState::Resolved(_) => write!(f, "Resolved"),
            CacheState::Failed(e) => write!(f, "Failed({e})"),
        }
    }
}

/// A scope's bookkeeping for one executor: its cache state plus the cleanup
/// callbacks registered by its last successful factory run (LIFO order).
#[derive(Default)]
pub(crate) struct CacheEntry {
    pub(crate) state: Option<CacheState>,
    pub(crate) cleanups: Vec<CleanupFn>,
}

/// Downcasts a type-erased cache value back to `T`, for callers (e.g. the
/// flow engine) that don't have a `NodeId` to attach to the error message.
pub(crate) fn downcast_value<T: Clone + 'static>(value: &AnyValue) -> Result<T, RuntimeError> {
    value
        .borrow()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| RuntimeError::custom("value has the wrong type"))
}

impl CacheEntry {
    pub(crate) fn is_resolved(&self) -> bool {
        matches!(self.state, Some(CacheState::Resolved(_)))
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.state, Some(CacheState::Pending))
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(self.state, Some(CacheState::Failed(_)))
    }

    /// Runs cleanups in reverse (LIFO) order, collecting rather than
    /// aborting on the first failure.
    pub(crate) fn run_cleanups(&mut self, errors: &mut Vec<(NodeId, String)>, id: NodeId) {
        for cleanup in self.cleanups.drain(..).rev() {
            if let Err(err) = cleanup() {
                errors.push((id, err.to_string()));
            }
        }
    }
}
