#![forbid(unsafe_code)]
//! The scope engine (C5, §4.5): graph resolution, caching, reactivity,
//! subscriptions, preset overrides, cleanup, and disposal.
//!
//! Mirrors the teacher's `Runtime`/`Scope` split (`leptos_reactive::runtime`,
//! `leptos_reactive::scope`) in spirit — a `Rc<RefCell<_>>`-backed handle
//! over a single-threaded graph — but the *identity* registry lives in
//! `registry.rs` (global) while `ScopeInner` below only holds resolution
//! *state*, per §5's ambient design note.

use crate::{
    error::{DisposeReport, RuntimeError},
    executor::{Executor, Preset},
    extension::{self, Extension, Operation, ResolveOperation},
    flow::FlowContext,
    node::{AnyValue, CacheState, NodeId},
    promised::Promised,
    registry::{self, AccessMode, DepSlot},
    tag::TagMap,
};
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use slotmap::SecondaryMap;
use std::{cell::RefCell, rc::Rc};

type Subscriber = Rc<dyn Fn()>;

struct ScopeInner {
    cache: SecondaryMap<NodeId, crate::node::CacheEntry>,
    presets: FxHashMap<NodeId, AnyValue>,
    tags: TagMap,
    reactive_edges: FxHashMap<NodeId, Vec<NodeId>>,
    subscribers: FxHashMap<NodeId, Vec<Subscriber>>,
    extensions: Vec<Rc<dyn Extension>>,
    /// `extensions` reversed once at scope/pod construction (§4.7: "Reversed-
    /// extension arrays are cached per-scope to avoid repeated reversal on
    /// hot paths") rather than on every `run_wrapped` call.
    extensions_reversed: Vec<Rc<dyn Extension>>,
    in_flight: FxHashMap<NodeId, Promised<AnyValue>>,
    completion_order: Vec<NodeId>,
    disposed: bool,
    parent: Option<Scope>,
}

/// Options accepted by [`Scope::create`] (§4.5 Creation).
#[derive(Default)]
pub struct ScopeOptions {
    pub tags: TagMap,
    pub presets: Vec<Preset>,
    pub extensions: Vec<Rc<dyn Extension>>,
}

/// A graph instance: caching, reactivity, and cleanup lifecycle over the
/// process-wide executor registry (§3 `Scope`).
#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeInner>>);

fn downcast_any<T: Clone + 'static>(value: &AnyValue, node: NodeId) -> Result<T, RuntimeError> {
    value
        .borrow()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| RuntimeError::custom(format!("cached value for {node:?} has the wrong type")))
}

impl Scope {
    /// `createScope(options)` (§4.5 Creation).
    pub fn create(options: ScopeOptions) -> Self {
        let mut presets = FxHashMap::default();
        for preset in options.presets {
            presets.insert(preset.node, preset.value);
        }
        let extensions_reversed: Vec<Rc<dyn Extension>> = options.extensions.iter().rev().cloned().collect();
        let scope = Scope(Rc::new(RefCell::new(ScopeInner {
            cache: SecondaryMap::new(),
            presets,
            tags: options.tags,
            reactive_edges: FxHashMap::default(),
            subscribers: FxHashMap::default(),
            extensions: options.extensions,
            extensions_reversed,
            in_flight: FxHashMap::default(),
            completion_order: Vec::new(),
            disposed: false,
            parent: None,
        })));
        let extensions = scope.0.borrow().extensions.clone();
        for ext in &extensions {
            ext.init(&scope);
        }
        scope
    }

    /// `pod()` (§3 Flow, §4.6 step 2): a child scope whose cache is a
    /// copy-on-read view over this scope — reads that miss locally fall
    /// through to the parent without re-invoking its factory; writes
    /// (presets, updates) never leak upward.
    pub fn pod(&self, tags: TagMap, extra_extensions: Vec<Rc<dyn Extension>>) -> Scope {
        let mut extensions = self.0.borrow().extensions.clone();
        extensions.extend(extra_extensions);
        let extensions_reversed: Vec<Rc<dyn Extension>> = extensions.iter().rev().cloned().collect();
        Scope(Rc::new(RefCell::new(ScopeInner {
            cache: SecondaryMap::new(),
            presets: FxHashMap::default(),
            tags,
            reactive_edges: FxHashMap::default(),
            subscribers: FxHashMap::default(),
            extensions,
            extensions_reversed,
            in_flight: FxHashMap::default(),
            completion_order: Vec::new(),
            disposed: false,
            parent: Some(self.clone()),
        })))
    }

    /// Runs every registered extension's `init_pod(pod, ctx)` hook. Split
    /// out from [`Scope::pod`] because a `FlowContext` can only be built once
    /// the pod itself exists, so the flow engine constructs both and then
    /// calls this once `ctx` is ready.
    pub(crate) fn notify_pod_init(&self, ctx: &FlowContext) {
        let exts = self.0.borrow().extensions.clone();
        for ext in &exts {
            ext.init_pod(self, ctx);
        }
    }

    pub fn tags(&self) -> TagMap {
        self.0.borrow().tags.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.borrow().disposed
    }

    /// `resolve(executor)` (§4.5 Resolution algorithm).
    pub fn resolve<T: Clone + 'static>(&self, executor: &Executor<T>) -> Promised<T> {
        self.resolve_typed::<T>(executor.id())
    }

    pub(crate) fn resolve_typed<T: Clone + 'static>(&self, node: NodeId) -> Promised<T> {
        let scope = self.clone();
        Promised::from_future(async move {
            let any = resolve_any(scope, node).await?;
            downcast_any::<T>(&any, node)
        })
    }

    /// As [`Scope::resolve_typed`], but resolving on behalf of an accessor
    /// handed out mid-resolution (`controller.accessor()`): `path` carries
    /// that invocation's ancestor chain so a self-reference reached this way
    /// is still caught as a cycle instead of joining its own in-flight
    /// resolution and deadlocking.
    pub(crate) fn resolve_typed_on_path<T: Clone + 'static>(&self, node: NodeId, path: Vec<NodeId>) -> Promised<T> {
        let scope = self.clone();
        Promised::from_future(async move {
            let any = resolve_any_on_path(scope, node, path, ResolveOperation::Resolve, None).await?;
            downcast_any::<T>(&any, node)
        })
    }

    /// `accessor()` (§3, §6).
    pub fn accessor<T: Clone + 'static>(&self, executor: &Executor<T>) -> crate::accessor::Accessor<T> {
        crate::accessor::Accessor::new(self.clone(), executor.id(), Vec::new())
    }

    pub(crate) fn cached_value<T: Clone + 'static>(&self, node: NodeId) -> Result<T, RuntimeError> {
        if let Some(preset) = self.preset_value(node) {
            return downcast_any::<T>(&preset, node);
        }
        if let Some(state) = self.cached_state(node) {
            return match state {
                CacheState::Resolved(v) => downcast_any::<T>(&v, node),
                CacheState::Failed(e) => Err((*e).clone()),
                CacheState::Pending => Err(RuntimeError::NotResolved { executor: node }),
            };
        }
        let parent = self.0.borrow().parent.clone();
        if let Some(parent) = parent {
            return parent.cached_value::<T>(node);
        }
        Err(RuntimeError::NotResolved { executor: node })
    }

    pub(crate) fn lookup_typed<T: Clone + 'static>(&self, node: NodeId) -> Option<T> {
        self.cached_value::<T>(node).ok()
    }

    /// `update(executor, newValue)` (§4.5 Update). Returns a `Promised`
    /// because re-resolving dependents may itself suspend (§5: every
    /// `update` is a suspension point).
    pub fn update<T: Clone + 'static>(&self, executor: &Executor<T>, new_value: T) -> Promised<()> {
        self.update_typed::<T>(executor.id(), new_value)
    }

    pub(crate) fn update_typed<T: Clone + 'static>(&self, node: NodeId, new_value: T) -> Promised<()> {
        let scope = self.clone();
        Promised::from_future(async move {
            if scope.is_disposed() {
                return Err(RuntimeError::ScopeDisposed);
            }
            if !matches!(scope.cached_state(node), Some(CacheState::Resolved(_))) {
                return Err(RuntimeError::NotResolved { executor: node });
            }

            let dependents = scope.transitive_dependents(node);
            let mut order: Vec<NodeId> = vec![node];
            order.extend(scope.topological_order(&dependents));

            // Reverse finish order (§4.5 Update): clean up the furthest
            // dependent first, the source last — the opposite of `order`'s
            // source-then-dependents topological sequence.
            for &id in order.iter().rev() {
                scope.run_cleanups(id);
            }

            scope.set_resolved(node, Rc::new(RefCell::new(new_value)));

            for &id in &order {
                if id == node {
                    continue;
                }
                scope.clear_cache_entry(id);
                let _ = resolve_any_for_update(scope.clone(), id).await;
            }

            for &id in &order {
                scope.fire_subscribers(id);
            }

            Ok(())
        })
    }

    /// `onUpdate(executor, cb)` / `accessor.subscribe` (§4.5 Subscription).
    pub(crate) fn subscribe(&self, node: NodeId, callback: impl Fn() + 'static) -> Box<dyn FnOnce()> {
        let subscriber: Subscriber = Rc::new(callback);
        self.0
            .borrow_mut()
            .subscribers
            .entry(node)
            .or_default()
            .push(Rc::clone(&subscriber));

        let weak_scope = Rc::downgrade(&self.0);
        Box::new(move || {
            if let Some(inner) = weak_scope.upgrade() {
                if let Some(list) = inner.borrow_mut().subscribers.get_mut(&node) {
                    list.retain(|s| !Rc::ptr_eq(s, &subscriber));
                }
            }
        })
    }

    /// `release(executor)` (§4.5 Release).
    pub fn release<T: Clone + 'static>(&self, executor: &Executor<T>) -> Result<(), RuntimeError> {
        let node = executor.id();
        let dependents = self.transitive_dependents(node);
        let mut order: Vec<NodeId> = vec![node];
        order.extend(self.topological_order(&dependents));
        for &id in order.iter().rev() {
            self.run_cleanups(id);
            self.clear_cache_entry(id);
        }
        Ok(())
    }

    /// `dispose()` (§4.5 Dispose).
    pub fn dispose(&self) -> DisposeReport {
        let completion_order = self.0.borrow().completion_order.clone();
        let mut report = DisposeReport::default();
        for id in completion_order.into_iter().rev() {
            if let Some(entry) = self.0.borrow_mut().cache.get_mut(id) {
                entry.run_cleanups(&mut report.cleanup_errors, id);
            }
        }
        let extensions = self.0.borrow().extensions.clone();
        for ext in &extensions {
            ext.dispose(self);
        }
        self.0.borrow_mut().disposed = true;
        report
    }

    /// Matches [`Scope::dispose`] but for a pod (§4.6 step 8): only the
    /// pod's own cleanups and `disposePod` hooks run; the parent scope is
    /// untouched.
    pub fn dispose_pod(&self) -> DisposeReport {
        let report = self.dispose();
        let extensions = self.0.borrow().extensions.clone();
        for ext in &extensions {
            ext.dispose_pod(self);
        }
        report
    }

    /// `entries()` (§6): every executor resolved (or presetted) in this
    /// scope.
    pub fn entries(&self) -> Vec<NodeId> {
        let inner = self.0.borrow();
        let mut ids: Vec<NodeId> = inner.cache.keys().collect();
        for id in inner.presets.keys() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    /// `registeredExecutors()` (§6): same surface as `entries()` at the
    /// scope level — the crate's global executor identities already live
    /// in the process-wide registry (§5), so from a scope's point of view
    /// "registered" means "known to this scope's cache or presets".
    pub fn registered_executors(&self) -> Vec<NodeId> {
        self.entries()
    }

    pub(crate) fn register_cleanup(&self, node: NodeId, cleanup: crate::node::CleanupFn) {
        self.0
            .borrow_mut()
            .cache
            .entry(node)
            .unwrap()
            .or_default()
            .cleanups
            .push(cleanup);
    }

    pub(crate) fn extensions_snapshot(&self) -> Vec<Rc<dyn Extension>> {
        self.0.borrow().extensions.clone()
    }

    /// Registration order reversed, cached at construction time (§4.7) so
    /// `run_wrapped` never has to reverse the list itself.
    pub(crate) fn extensions_reversed_snapshot(&self) -> Vec<Rc<dyn Extension>> {
        self.0.borrow().extensions_reversed.clone()
    }

    fn preset_value(&self, node: NodeId) -> Option<AnyValue> {
        self.0.borrow().presets.get(&node).cloned()
    }

    fn cached_state(&self, node: NodeId) -> Option<CacheState> {
        self.0.borrow().cache.get(node).and_then(|e| e.state.clone())
    }

    fn set_pending(&self, node: NodeId) {
        let mut inner = self.0.borrow_mut();
        let entry = inner.cache.entry(node).unwrap().or_default();
        entry.state = Some(CacheState::Pending);
    }

    fn set_resolved(&self, node: NodeId, value: AnyValue) {
        let mut inner = self.0.borrow_mut();
        let entry = inner.cache.entry(node).unwrap().or_default();
        entry.state = Some(CacheState::Resolved(value));
    }

    fn mark_resolved(&self, node: NodeId, value: AnyValue) {
        self.set_resolved(node, value);
        self.0.borrow_mut().completion_order.push(node);
    }

    fn mark_failed(&self, node: NodeId, error: RuntimeError) {
        let mut inner = self.0.borrow_mut();
        let entry = inner.cache.entry(node).unwrap().or_default();
        entry.state = Some(CacheState::Failed(Rc::new(error)));
    }

    fn clear_cache_entry(&self, node: NodeId) {
        self.0.borrow_mut().cache.remove(node);
    }

    fn run_cleanups(&self, node: NodeId) {
        let mut errors = Vec::new();
        if let Some(entry) = self.0.borrow_mut().cache.get_mut(node) {
            entry.run_cleanups(&mut errors, node);
        }
        if !errors.is_empty() {
            let extensions = self.extensions_snapshot();
            for (id, message) in &errors {
                let error = RuntimeError::custom(format!("cleanup for {id:?} failed: {message}"));
                extension::notify_error(&extensions, &error, self, None);
                crate::log_cleanup_error(*id, message);
            }
        }
    }

    /// A resolution already under way for `node` in this scope, if any —
    /// joined by concurrent (non-ancestor) callers instead of re-running the
    /// factory or falsely reporting a cycle (§4.5 step 2).
    fn in_flight(&self, node: NodeId) -> Option<Promised<AnyValue>> {
        self.0.borrow().in_flight.get(&node).cloned()
    }

    fn set_in_flight(&self, node: NodeId, work: Promised<AnyValue>) {
        self.0.borrow_mut().in_flight.insert(node, work);
    }

    fn clear_in_flight(&self, node: NodeId) {
        self.0.borrow_mut().in_flight.remove(&node);
    }

    fn add_reactive_edge(&self, source: NodeId, dependent: NodeId) {
        let mut inner = self.0.borrow_mut();
        let list = inner.reactive_edges.entry(source).or_default();
        if !list.contains(&dependent) {
            list.push(dependent);
        }
    }

    fn fire_subscribers(&self, node: NodeId) {
        let subscribers = self.0.borrow().subscribers.get(&node).cloned().unwrap_or_default();
        for subscriber in subscribers {
            subscriber();
        }
    }

    /// BFS over reactive edges from `node`, collecting every transitively
    /// affected dependent (§4.5 Update).
    fn transitive_dependents(&self, node: NodeId) -> Vec<NodeId> {
        let inner = self.0.borrow();
        let mut seen = Vec::new();
        let mut queue = vec![node];
        while let Some(current) = queue.pop() {
            if let Some(direct) = inner.reactive_edges.get(&current) {
                for &next in direct {
                    if !seen.contains(&next) {
                        seen.push(next);
                        queue.push(next);
                    }
                }
            }
        }
        seen
    }

    /// Orders `nodes` so that, restricted to the reactive-edge subgraph, a
    /// source always precedes its dependents (Kahn's algorithm).
    fn topological_order(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let inner = self.0.borrow();
        let node_set: Vec<NodeId> = nodes.to_vec();
        let mut indegree: FxHashMap<NodeId, usize> = node_set.iter().map(|&n| (n, 0)).collect();
        for &n in &node_set {
            if let Some(direct) = inner.reactive_edges.get(&n) {
                for dep in direct {
                    if let Some(count) = indegree.get_mut(dep) {
                        *count += 1;
                    }
                }
            }
        }
        drop(inner);

        let mut ready: Vec<NodeId> = node_set
            .iter()
            .copied()
            .filter(|n| indegree.get(n).copied().unwrap_or(0) == 0)
            .collect();
        let mut order = Vec::with_capacity(node_set.len());
        while !ready.is_empty() {
            ready.sort_by_key(|n| node_set.iter().position(|x| x == n).unwrap_or(usize::MAX));
            let current = ready.remove(0);
            order.push(current);
            let inner = self.0.borrow();
            if let Some(direct) = inner.reactive_edges.get(&current) {
                for dep in direct {
                    if let Some(count) = indegree.get_mut(dep) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(*dep);
                        }
                    }
                }
            }
        }
        for n in node_set {
            if !order.contains(&n) {
                order.push(n);
            }
        }
        order
    }

    /// Probes this scope's own cache, then its ancestors, for a
    /// copy-on-read lookup from a child pod.
    fn try_cached_any(&self, node: NodeId) -> Option<AnyValue> {
        if let Some(value) = self.preset_value(node) {
            return Some(value);
        }
        match self.cached_state(node) {
            Some(CacheState::Resolved(v)) => Some(v),
            _ => {
                let parent = self.0.borrow().parent.clone();
                parent.and_then(|p| p.try_cached_any(node))
            }
        }
    }
}

/// Resolves a dependency descriptor list against `scope` without a `NodeId`
/// of its own — used by the flow engine (§4.6 step 5), which resolves
/// declared dependencies over the pod but is not itself a registered
/// executor.
pub(crate) fn resolve_descriptors(
    scope: Scope,
    descriptors: Vec<(NodeId, AccessMode)>,
    ctx: Option<FlowContext>,
) -> LocalBoxFuture<'static, Result<Vec<DepSlot>, RuntimeError>> {
    Box::pin(async move {
        let mut futs: Vec<LocalBoxFuture<'static, Result<DepSlot, RuntimeError>>> = Vec::with_capacity(descriptors.len());
        for (dep_id, mode) in descriptors {
            let scope2 = scope.clone();
            let ctx2 = ctx.clone();
            if mode.forces_resolution() {
                futs.push(Box::pin(async move {
                    let value = resolve_any_on_path(scope2, dep_id, Vec::new(), ResolveOperation::Resolve, ctx2).await?;
                    Ok(DepSlot::Value(value))
                }));
            } else {
                futs.push(Box::pin(async move { Ok(DepSlot::Deferred) }));
            }
        }
        futures::future::try_join_all(futs).await
    })
}

/// `resolve`/`Scope::resolve_typed` entry point: a fresh top-level
/// resolution, no ancestor path yet, outside of any flow invocation.
pub(crate) fn resolve_any(scope: Scope, node: NodeId) -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> {
    resolve_any_on_path(scope, node, Vec::new(), ResolveOperation::Resolve, None)
}

/// `update`'s re-resolution of a dependent (§4.5 Update): a fresh top-level
/// resolution tagged `operation: update` so extensions can distinguish it
/// from an ordinary first-time resolve.
pub(crate) fn resolve_any_for_update(scope: Scope, node: NodeId) -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> {
    resolve_any_on_path(scope, node, Vec::new(), ResolveOperation::Update, None)
}

/// The type-erased resolution algorithm (§4.5 Resolution algorithm). Lives
/// outside `impl Scope` because it recurses through `registry::invoke`,
/// which in turn calls back into dependency resolution.
///
/// `path` is the chain of executors currently being resolved *on this call's
/// own ancestor chain* — threaded per call, not stored scope-wide, so that a
/// legitimate diamond dependency (two branches concurrently depending on the
/// same non-ancestor node) joins the in-flight resolution via `in_flight`
/// instead of being mistaken for a cycle. Only `path.contains(&node)` is a
/// real cycle.
fn resolve_any_on_path(
    scope: Scope,
    node: NodeId,
    path: Vec<NodeId>,
    resolve_kind: ResolveOperation,
    ctx: Option<FlowContext>,
) -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> {
    Box::pin(async move {
        if scope.is_disposed() {
            return Err(RuntimeError::ScopeDisposed);
        }

        if let Some(preset) = scope.preset_value(node) {
            scope.mark_resolved(node, Rc::clone(&preset));
            return Ok(preset);
        }

        if path.contains(&node) {
            let mut chain = path;
            chain.push(node);
            return Err(RuntimeError::CircularDependency { chain });
        }

        if let Some(state) = scope.cached_state(node) {
            match state {
                CacheState::Resolved(v) => return Ok(v),
                CacheState::Failed(e) => return Err((*e).clone()),
                CacheState::Pending => {
                    // Not on our own ancestor chain (checked above) — a
                    // sibling branch is already resolving this node. Join it
                    // rather than re-running the factory or failing.
                    if let Some(in_flight) = scope.in_flight(node) {
                        return in_flight.await;
                    }
                }
            }
        }

        let parent = scope.0.borrow().parent.clone();
        if let Some(parent) = &parent {
            if let Some(value) = parent.try_cached_any(node) {
                return Ok(value);
            }
        }

        let mut child_path = path;
        child_path.push(node);

        let work_scope = scope.clone();
        let work_ctx = ctx.clone();
        let work_path = child_path.clone();
        let work = Promised::from_future(async move {
            work_scope.set_pending(node);

            let descriptors = registry::descriptors_of(node);
            let mut slot_futures: Vec<
                LocalBoxFuture<'static, Result<(NodeId, AccessMode, Option<AnyValue>), RuntimeError>>,
            > = Vec::with_capacity(descriptors.len());
            for (dep_id, mode) in descriptors.iter().copied() {
                let scope2 = work_scope.clone();
                let path2 = work_path.clone();
                let ctx2 = work_ctx.clone();
                if mode.forces_resolution() {
                    slot_futures.push(Box::pin(async move {
                        let value = resolve_any_on_path(scope2, dep_id, path2, ResolveOperation::Resolve, ctx2).await?;
                        Ok((dep_id, mode, Some(value)))
                    }));
                } else {
                    slot_futures.push(Box::pin(async move { Ok((dep_id, mode, None)) }));
                }
            }

            let resolved = match futures::future::try_join_all(slot_futures).await {
                Ok(r) => r,
                Err(e) => {
                    let wrapped = e.into_factory_failed(node, work_path.clone());
                    work_scope.mark_failed(node, wrapped.clone());
                    let extensions = work_scope.extensions_snapshot();
                    extension::notify_error(&extensions, &wrapped, &work_scope, work_ctx.as_ref());
                    return Err(wrapped);
                }
            };

            for (dep_id, mode, _) in &resolved {
                if mode.registers_reactive_edge() {
                    work_scope.add_reactive_edge(*dep_id, node);
                }
            }

            let slots: Vec<DepSlot> = resolved
                .into_iter()
                .map(|(_, _, value)| match value {
                    Some(v) => DepSlot::Value(v),
                    None => DepSlot::Deferred,
                })
                .collect();

            let extensions_reversed = work_scope.extensions_reversed_snapshot();
            let op = Operation::Resolve {
                executor: node,
                scope: work_scope.clone(),
                operation: resolve_kind,
            };
            let invoke_scope = work_scope.clone();
            let invoke_path = work_path.clone();
            let result = extension::run_wrapped(&extensions_reversed, work_ctx.clone(), op, move || {
                match registry::invoke(node, invoke_scope, slots, invoke_path) {
                    Some(fut) => fut,
                    None => Box::pin(async move { Err(RuntimeError::NotResolved { executor: node }) }),
                }
            })
            .await;

            match result {
                Ok(value) => {
                    work_scope.mark_resolved(node, Rc::clone(&value));
                    work_scope.fire_subscribers(node);
                    Ok(value)
                }
                Err(e) => {
                    let wrapped = match e {
                        RuntimeError::FactoryFailed { .. } => e,
                        other => other.into_factory_failed(node, work_path.clone()),
                    };
                    work_scope.mark_failed(node, wrapped.clone());
                    let extensions = work_scope.extensions_snapshot();
                    extension::notify_error(&extensions, &wrapped, &work_scope, work_ctx.as_ref());
                    Err(wrapped)
                }
            }
        });

        scope.set_in_flight(node, work.clone());
        let outcome = work.await;
        scope.clear_in_flight(node);
        outcome
    })
}
