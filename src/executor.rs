#![forbid(unsafe_code)]
//! The executor model (C4): declarative graph node definitions with
//! dependency descriptors and four access modes (§3, §4.4).
//!
//! §9's design note on nominally-typed hosts is taken literally here: the
//! spec's JS-shaped "single / ordered-list / string-keyed-mapping"
//! dependency shapes become, in Rust, an explicit [`DepSpec`] trait with
//! three families of implementor: a single [`Executor`] handle (or mode
//! projection), `Vec<D>` for homogeneous ordered lists, and tuples for
//! heterogeneous mappings — positional rather than string-keyed, which is
//! the idiomatic equivalent for a statically-typed dependency record.

use crate::{
    accessor::Accessor,
    error::RuntimeError,
    node::{AnyValue, CleanupFn, NodeId},
    promised::{IntoPromised, Promised},
    registry::{self, AccessMode, DepSlot, ExecutorKind, Invokable},
    scope::Scope,
    tag::TaggedValue,
};
use std::{cell::RefCell, marker::PhantomData, rc::Rc};

/// A declarative graph node definition (§3 `Executor`). Cheap to clone: it
/// is only a stable id plus a phantom type tag.
pub struct Executor<T> {
    pub(crate) id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            _marker: PhantomData,
        }
    }
}
impl<T> Copy for Executor<T> {}

impl<T: Clone + 'static> Executor<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Projects this executor as a `reactive` dependency (§3).
    pub fn reactive(&self) -> ValueDep<T> {
        ValueDep::new(self.id, AccessMode::Reactive)
    }

    /// Projects this executor as a `lazy` dependency (§3).
    pub fn lazy(&self) -> AccessorDep<T> {
        AccessorDep::new(self.id, AccessMode::Lazy)
    }

    /// Projects this executor as a `static` dependency (§3).
    pub fn r#static(&self) -> AccessorDep<T> {
        AccessorDep::new(self.id, AccessMode::Static)
    }

    pub fn tags(&self) -> Vec<TaggedValue> {
        registry::tags_of(self.id)
    }

    pub fn kind(&self) -> Option<ExecutorKind> {
        registry::kind_of(self.id)
    }
}

/// An executor dependency taken by value (default mode) or `reactive`.
pub struct ValueDep<T> {
    node: NodeId,
    mode: AccessMode,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ValueDep<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            mode: self.mode,
            _marker: PhantomData,
        }
    }
}

impl<T> ValueDep<T> {
    fn new(node: NodeId, mode: AccessMode) -> Self {
        Self {
            node,
            mode,
            _marker: PhantomData,
        }
    }
}

/// An executor dependency taken as a deferred `Accessor` (`lazy`/`static`).
pub struct AccessorDep<T> {
    node: NodeId,
    mode: AccessMode,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AccessorDep<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            mode: self.mode,
            _marker: PhantomData,
        }
    }
}

impl<T> AccessorDep<T> {
    fn new(node: NodeId, mode: AccessMode) -> Self {
        Self {
            node,
            mode,
            _marker: PhantomData,
        }
    }
}

/// A dependency descriptor: names which executors a factory needs and how
/// their values should reach it. Implemented for a bare [`Executor`] (value
/// mode), mode projections, `()` (no dependencies), `Vec<D>` (ordered
/// lists), and tuples up to arity 8 (heterogeneous mappings, §3/§9).
pub trait DepSpec: Clone + 'static {
    type Materialized;

    fn descriptors(&self) -> Vec<(NodeId, AccessMode)>;

    fn materialize(
        &self,
        scope: &Scope,
        path: &[NodeId],
        slots: &mut std::vec::IntoIter<DepSlot>,
    ) -> Self::Materialized;
}

impl DepSpec for () {
    type Materialized = ();

    fn descriptors(&self) -> Vec<(NodeId, AccessMode)> {
        Vec::new()
    }

    fn materialize(&self, _scope: &Scope, _path: &[NodeId], _slots: &mut std::vec::IntoIter<DepSlot>) {}
}

impl<T: Clone + 'static> DepSpec for Executor<T> {
    type Materialized = T;

    fn descriptors(&self) -> Vec<(NodeId, AccessMode)> {
        vec![(self.id, AccessMode::Value)]
    }

    fn materialize(&self, _scope: &Scope, _path: &[NodeId], slots: &mut std::vec::IntoIter<DepSlot>) -> T {
        take_value::<T>(slots, self.id)
    }
}

impl<T: Clone + 'static> DepSpec for ValueDep<T> {
    type Materialized = T;

    fn descriptors(&self) -> Vec<(NodeId, AccessMode)> {
        vec![(self.node, self.mode)]
    }

    fn materialize(&self, _scope: &Scope, _path: &[NodeId], slots: &mut std::vec::IntoIter<DepSlot>) -> T {
        take_value::<T>(slots, self.node)
    }
}

impl<T: Clone + 'static> DepSpec for AccessorDep<T> {
    type Materialized = Accessor<T>;

    fn descriptors(&self) -> Vec<(NodeId, AccessMode)> {
        vec![(self.node, self.mode)]
    }

    fn materialize(&self, scope: &Scope, path: &[NodeId], slots: &mut std::vec::IntoIter<DepSlot>) -> Accessor<T> {
        let _ = slots.next();
        Accessor::new(scope.clone(), self.node, path.to_vec())
    }
}

impl<D: DepSpec> DepSpec for Vec<D> {
    type Materialized = Vec<D::Materialized>;

    fn descriptors(&self) -> Vec<(NodeId, AccessMode)> {
        self.iter().flat_map(|d| d.descriptors()).collect()
    }

    fn materialize(
        &self,
        scope: &Scope,
        path: &[NodeId],
        slots: &mut std::vec::IntoIter<DepSlot>,
    ) -> Vec<D::Materialized> {
        self.iter().map(|d| d.materialize(scope, path, slots)).collect()
    }
}

fn take_value<T: Clone + 'static>(slots: &mut std::vec::IntoIter<DepSlot>, node: NodeId) -> T {
    match slots.next() {
        Some(DepSlot::Value(any)) => any
            .borrow()
            .downcast_ref::<T>()
            .cloned()
            .unwrap_or_else(|| panic!("dependency {node:?} resolved to the wrong type")),
        _ => panic!("dependency {node:?} slot missing or not a value"),
    }
}

macro_rules! impl_dep_spec_tuple {
    ($($T:ident $idx:tt),+) => {
        impl<$($T: DepSpec),+> DepSpec for ($($T,)+) {
            type Materialized = ($($T::Materialized,)+);

            fn descriptors(&self) -> Vec<(NodeId, AccessMode)> {
                let mut out = Vec::new();
                $(out.extend(self.$idx.descriptors());)+
                out
            }

            fn materialize(
                &self,
                scope: &Scope,
                path: &[NodeId],
                slots: &mut std::vec::IntoIter<DepSlot>,
            ) -> Self::Materialized {
                ($(self.$idx.materialize(scope, path, slots),)+)
            }
        }
    };
}

impl_dep_spec_tuple!(A 0);
impl_dep_spec_tuple!(A 0, B 1);
impl_dep_spec_tuple!(A 0, B 1, C 2);
impl_dep_spec_tuple!(A 0, B 1, C 2, D 3);
impl_dep_spec_tuple!(A 0, B 1, C 2, D 3, E 4);
impl_dep_spec_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_dep_spec_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_dep_spec_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Passed to every factory invocation (§4.4): exposes the scope (to read
/// tags/other accessors), LIFO cleanup registration, and a handle to the
/// executor's own accessor (for the `controller.static` self-reference
/// pattern named in §4.4's example).
pub struct Controller<T> {
    scope: Scope,
    node: NodeId,
    path: Vec<NodeId>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Controller<T> {
    pub(crate) fn new(scope: Scope, node: NodeId, path: Vec<NodeId>) -> Self {
        Self {
            scope,
            node,
            path,
            _marker: PhantomData,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope.clone()
    }

    /// Registers a cleanup callback, run in LIFO order on release/dispose
    /// (§3 invariants, §4.5 Release/Dispose).
    pub fn cleanup(&self, f: impl FnOnce() -> Result<(), RuntimeError> + 'static) {
        let boxed: CleanupFn = Box::new(f);
        self.scope.register_cleanup(self.node, boxed);
    }

    /// This executor's own accessor, for factories that need to read or
    /// rewrite their own cached value (the `controller.static` dependency
    /// pattern in §4.4's example becomes an explicit accessor here). Carries
    /// this invocation's ancestor path, so resolving through it still
    /// detects a self-reference even though it bypasses the declared
    /// dependency descriptors (§4.5 step 2).
    pub fn accessor(&self) -> Accessor<T> {
        Accessor::new(self.scope.clone(), self.node, self.path.clone())
    }
}

struct TypedInvokable<D: DepSpec, T, F> {
    dep_spec: D,
    factory: Rc<F>,
    _t: PhantomData<fn() -> T>,
}

impl<D, T, F, R> Invokable for TypedInvokable<D, T, F>
where
    D: DepSpec,
    T: Clone + 'static,
    F: Fn(D::Materialized, Controller<T>) -> R + 'static,
    R: IntoPromised<T>,
{
    fn call(
        &self,
        scope: Scope,
        node: NodeId,
        slots: Vec<DepSlot>,
        path: Vec<NodeId>,
    ) -> futures::future::LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> {
        let dep_spec = self.dep_spec.clone();
        let factory = Rc::clone(&self.factory);
        Box::pin(async move {
            let mut iter = slots.into_iter();
            let materialized = dep_spec.materialize(&scope, &path, &mut iter);
            let controller = Controller::new(scope.clone(), node, path.clone());
            let promised: Promised<T> = factory(materialized, controller).into_promised();
            let value = promised.await?;
            Ok(Rc::new(RefCell::new(value)) as AnyValue)
        })
    }
}

/// `derive(deps, factory, tags?)` (§6): declares an executor whose factory
/// depends on other executors.
pub fn derive<D, T, F, R>(deps: D, factory: F, tags: Vec<TaggedValue>) -> Executor<T>
where
    D: DepSpec,
    T: Clone + 'static,
    F: Fn(D::Materialized, Controller<T>) -> R + 'static,
    R: IntoPromised<T>,
{
    let descriptors = deps.descriptors();
    let invokable = Rc::new(TypedInvokable {
        dep_spec: deps,
        factory: Rc::new(factory),
        _t: PhantomData,
    });
    let id = registry::register(descriptors, tags, invokable, ExecutorKind::Derive);
    Executor {
        id,
        _marker: PhantomData,
    }
}

/// `provide(factory, tags?)` (§6): declares a dependency-free executor.
pub fn provide<T, F, R>(factory: F, tags: Vec<TaggedValue>) -> Executor<T>
where
    T: Clone + 'static,
    F: Fn(Controller<T>) -> R + 'static,
    R: IntoPromised<T>,
{
    derive((), move |(), controller| factory(controller), tags)
}

/// A preset override for a scope (§3 `Scope`, §4.5 Creation): forces
/// `executor` to resolve to `value` without ever invoking its factory.
pub struct Preset {
    pub(crate) node: NodeId,
    pub(crate) value: AnyValue,
}

/// `preset(executor, value)` (§6).
pub fn preset<T: Clone + 'static>(executor: Executor<T>, value: T) -> Preset {
    Preset {
        node: executor.id,
        value: Rc::new(RefCell::new(value)),
    }
}
