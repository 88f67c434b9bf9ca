#![forbid(unsafe_code)]
//! The extension runtime (C7, §4.7): pipeline composition of cross-cutting
//! wrappers around every resolve/update/execute/journal/subflow/parallel
//! operation.
//!
//! Every operation's result is carried as a type-erased [`AnyValue`] through
//! the wrap chain — the same carrier the scope cache already uses for
//! resolved values — so one `Extension` trait covers every operation kind
//! without a family of associated types per operation.

use crate::{error::RuntimeError, flow::FlowContext, flow::FlowDefinitionInfo, node::AnyValue, scope::Scope};
use futures::future::LocalBoxFuture;
use std::{fmt, rc::Rc};

/// Discriminates which core operation is being wrapped (§4.7). `AnyValue`
/// payloads (`input`/`params`/`output`) are type-erased and don't implement
/// `Debug`, so this carries a manual impl rather than a derive (see
/// `fmt::Debug` below).
#[derive(Clone)]
pub enum Operation {
    Resolve {
        executor: crate::node::NodeId,
        scope: Scope,
        operation: ResolveOperation,
    },
    Execute {
        definition: FlowDefinitionInfo,
        input: AnyValue,
        depth: u32,
    },
    Subflow {
        definition: FlowDefinitionInfo,
        input: AnyValue,
        depth: u32,
        journal_key: Option<String>,
    },
    Journal {
        key: String,
        params: Option<AnyValue>,
        is_replay: bool,
        output: Option<AnyValue>,
    },
    Parallel {
        mode: ParallelMode,
        promise_count: usize,
    },
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Resolve { executor, operation, .. } => {
                f.debug_struct("Resolve").field("executor", executor).field("operation", operation).finish()
            }
            Operation::Execute { definition, depth, .. } => {
                f.debug_struct("Execute").field("definition", definition).field("depth", depth).finish()
            }
            Operation::Subflow { definition, depth, journal_key, .. } => f
                .debug_struct("Subflow")
                .field("definition", definition)
                .field("depth", depth)
                .field("journal_key", journal_key)
                .finish(),
            Operation::Journal { key, is_replay, .. } => {
                f.debug_struct("Journal").field("key", key).field("is_replay", is_replay).finish()
            }
            Operation::Parallel { mode, promise_count } => {
                f.debug_struct("Parallel").field("mode", mode).field("promise_count", promise_count).finish()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOperation {
    Resolve,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelMode {
    Parallel,
    Settled,
}

/// The remainder of the wrap chain (inner extensions plus the real
/// operation). Each `wrap` implementation must call this at most once;
/// not calling it short-circuits the operation with whatever `wrap`
/// returns instead (§4.7).
pub type Next = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>>>;

/// A cross-cutting hook registered on a scope or flow invocation (§4.7).
/// Every method has a pass-through default so implementors only override
/// the hooks they need. `ctx` is `None` for operations that happen outside
/// any flow invocation (a bare `Scope::resolve`/`update`); flow-scoped
/// operations (execute, subflow, journal, parallel) always carry one.
pub trait Extension {
    fn init(&self, _scope: &Scope) {}
    fn dispose(&self, _scope: &Scope) {}
    fn init_pod(&self, _pod: &Scope, _ctx: &FlowContext) {}
    fn dispose_pod(&self, _pod: &Scope) {}

    fn wrap(
        &self,
        _ctx: Option<&FlowContext>,
        next: Next,
        _operation: &Operation,
    ) -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> {
        next()
    }

    /// Best-effort fan-out (§4.7, §7): errors from one extension's hook do
    /// not prevent others from observing `on_error`.
    fn on_error(&self, _error: &RuntimeError, _scope: &Scope, _ctx: Option<&FlowContext>) {}
}

/// Runs `operation` through every registered extension's `wrap`, composed
/// outer-to-inner in registration order, innermost calling `inner`.
///
/// `extensions` must already be in reverse-registration order (see
/// `Scope::extensions_reversed_snapshot`) — building the chain back-to-front
/// from that order puts the first-registered extension outermost.
pub(crate) fn run_wrapped(
    extensions: &[Rc<dyn Extension>],
    ctx: Option<FlowContext>,
    operation: Operation,
    inner: impl FnOnce() -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> + 'static,
) -> LocalBoxFuture<'static, Result<AnyValue, RuntimeError>> {
    let mut next: Next = Box::new(inner);
    for ext in extensions {
        let ext = Rc::clone(ext);
        let op = operation.clone();
        let ctx = ctx.clone();
        let prev = next;
        next = Box::new(move || ext.wrap(ctx.as_ref(), prev, &op));
    }
    next()
}

/// Best-effort fan-out of `on_error` to every registered extension (§4.7).
pub(crate) fn notify_error(extensions: &[Rc<dyn Extension>], error: &RuntimeError, scope: &Scope, ctx: Option<&FlowContext>) {
    for ext in extensions {
        ext.on_error(error, scope, ctx);
    }
}
