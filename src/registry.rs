#![forbid(unsafe_code)]
//! The process-wide executor-definition registry (§5, "Executor-definition
//! storage").
//!
//! Executors are defined once (via [`crate::executor::provide`] /
//! [`crate::executor::derive`]) and may be resolved inside any number of
//! independent scopes: the definition (factory, dependency descriptors,
//! tags) is global, while resolution *state* lives per-scope in
//! `SecondaryMap<NodeId, CacheEntry>` (see `scope.rs`), mirroring the
//! teacher's split between `SlotMap<NodeId, ReactiveNode>` (identity) and
//! per-runtime bookkeeping, except here the identity map itself is the part
//! that is shared rather than runtime-local.

use crate::{
    error::RuntimeError,
    node::{AnyValue, NodeId},
    scope::Scope,
    tag::TaggedValue,
};
use futures::future::LocalBoxFuture;
use slotmap::SlotMap;
use std::{cell::RefCell, rc::Rc};

/// How a dependency's value reaches the depending factory (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Value,
    Reactive,
    Lazy,
    Static,
}

impl AccessMode {
    /// Reactive edges are only recorded for the `reactive` mode (§4.4).
    pub(crate) fn registers_reactive_edge(self) -> bool {
        matches!(self, AccessMode::Reactive)
    }

    /// `value`/`reactive` force resolution before the factory runs;
    /// `lazy`/`static` defer to an accessor (§3, §4.5 step 4).
    pub(crate) fn forces_resolution(self) -> bool {
        matches!(self, AccessMode::Value | AccessMode::Reactive)
    }
}

/// One resolved dependency slot, in descriptor order. `Deferred` carries no
/// payload: lazy/static leaves reconstruct an `Accessor` from the scope and
/// their own `NodeId` rather than from resolved state.
pub(crate) enum DepSlot {
    Value(AnyValue),
    Deferred,
}

/// Whether an executor was declared with `provide` (no dependencies) or
/// `derive` (depends on others) — kept for `registeredExecutors` reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Provide,
    Derive,
}

/// Type-erased invocation of a concrete, generically-typed factory. Each
/// `derive`/`provide` call constructs one of these (see
/// `executor::TypedInvokable`) and hands it to the registry so the
/// type-erased resolver in `scope.rs` can drive it without knowing `T`.
pub(crate) trait Invokable {
    fn call(
        &self,
        scope: Scope,
        node: NodeId,
        slots: Vec<DepSlot>,
        path: Vec<NodeId>,
    ) -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>>;
}

pub(crate) struct ExecutorEntry {
    pub(crate) kind: ExecutorKind,
    pub(crate) descriptors: Vec<(NodeId, AccessMode)>,
    pub(crate) tags: Vec<TaggedValue>,
    pub(crate) invokable: Rc<dyn Invokable>,
}

thread_local! {
    static EXECUTORS: RefCell<SlotMap<NodeId, ExecutorEntry>> = RefCell::new(SlotMap::with_key());
}

/// Registers a new executor definition, returning its stable `NodeId`.
pub(crate) fn register(
    descriptors: Vec<(NodeId, AccessMode)>,
    tags: Vec<TaggedValue>,
    invokable: Rc<dyn Invokable>,
    kind: ExecutorKind,
) -> NodeId {
    EXECUTORS.with(|executors| {
        executors.borrow_mut().insert(ExecutorEntry {
            kind,
            descriptors,
            tags,
            invokable,
        })
    })
}

/// Runs `f` with the entry for `id`, if it is still registered.
pub(crate) fn with_entry<R>(id: NodeId, f: impl FnOnce(&ExecutorEntry) -> R) -> Option<R> {
    EXECUTORS.with(|executors| executors.borrow().get(id).map(f))
}

pub(crate) fn descriptors_of(id: NodeId) -> Vec<(NodeId, AccessMode)> {
    with_entry(id, |entry| entry.descriptors.clone()).unwrap_or_default()
}

pub(crate) fn tags_of(id: NodeId) -> Vec<TaggedValue> {
    with_entry(id, |entry| entry.tags.clone()).unwrap_or_default()
}

pub(crate) fn kind_of(id: NodeId) -> Option<ExecutorKind> {
    with_entry(id, |entry| entry.kind)
}

/// Invokes the factory for `id` with already-materialized dependency slots.
/// `path` is the ancestor chain this resolution is running under (§4.5 step
/// 2), forwarded to the factory's `Controller`/`Accessor` handles so a
/// self-reference reached via `controller.accessor().resolve()` — not just
/// one reached through a declared dependency — is still caught as a cycle.
pub(crate) fn invoke(
    id: NodeId,
    scope: Scope,
    slots: Vec<DepSlot>,
    path: Vec<NodeId>,
) -> Option<LocalBoxFuture<'static, Result<AnyValue, RuntimeError>>> {
    with_entry(id, |entry| Rc::clone(&entry.invokable)).map(|invokable| invokable.call(scope, id, slots, path))
}

#[cfg(test)]
/// Test-only helper: the registry is process-wide and thread-local, so
/// tests that assert on fresh ids should not leak executors from other
/// tests in the same thread. Not part of the public API (§1 Non-goals:
/// no hot-reload of executor definitions — this is strictly additive
/// housekeeping for test isolation).
pub(crate) fn clear_for_tests() {
    EXECUTORS.with(|executors| executors.borrow_mut().clear());
}
