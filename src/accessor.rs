#![forbid(unsafe_code)]
//! The accessor handle (§3 `Accessor`): a typed view of one executor within
//! one scope.

use crate::{error::RuntimeError, node::NodeId, promised::Promised, scope::Scope};
use std::marker::PhantomData;

/// A handle for an executor within a given scope. Cheap to clone.
pub struct Accessor<T> {
    scope: Scope,
    node: NodeId,
    path: Vec<NodeId>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            node: self.node,
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Accessor<T> {
    /// `path` is the ancestor chain of the resolution this accessor was
    /// handed out from, if any (empty for accessors obtained directly from
    /// a `Scope`). Carrying it lets `resolve()` detect a self-reference
    /// reached through `controller.accessor().resolve()`, which bypasses
    /// the declared dependency descriptors a plain recursive resolve would
    /// see (§4.5 step 2).
    pub(crate) fn new(scope: Scope, node: NodeId, path: Vec<NodeId>) -> Self {
        Self {
            scope,
            node,
            path,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    /// `get()` (§3): synchronous read of the last cached value; fails if
    /// the executor has never been resolved in this scope.
    pub fn get(&self) -> Result<T, RuntimeError> {
        self.scope.cached_value::<T>(self.node)
    }

    /// `resolve()` (§3): force resolution, returning a `Promised`.
    pub fn resolve(&self) -> Promised<T> {
        self.scope.resolve_typed_on_path::<T>(self.node, self.path.clone())
    }

    /// `lookup()` (§3): probe resolution without forcing a fresh run —
    /// returns the cached value if present, `None` if the executor has not
    /// been resolved (and is not presetted) in this scope yet.
    pub fn lookup(&self) -> Option<T> {
        self.scope.lookup_typed::<T>(self.node)
    }

    /// `update(newValue)` (§3): writes through the scope, triggering
    /// reactive propagation to dependents. Returns a `Promised` since
    /// re-resolving dependents may itself suspend (§5).
    pub fn update(&self, new_value: T) -> Promised<()> {
        self.scope.update_typed::<T>(self.node, new_value)
    }

    /// `update(prev => newValue)` (§3): functional update variant.
    pub fn update_with(&self, f: impl FnOnce(&T) -> T) -> Promised<()> {
        match self.get() {
            Ok(current) => self.update(f(&current)),
            Err(e) => Promised::error(e),
        }
    }

    /// `subscribe(cb)` (§3, §4.5 Subscription): change notification;
    /// returns a cleanup that removes the subscription.
    pub fn subscribe(&self, callback: impl Fn(Accessor<T>) + 'static) -> Box<dyn FnOnce()> {
        let accessor = self.clone();
        self.scope.subscribe(self.node, move || callback(accessor.clone()))
    }
}
