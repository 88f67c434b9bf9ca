#![forbid(unsafe_code)]

//! A reactive dependency-graph runtime.
//!
//! The crate is built around four ideas, each owned by its own module:
//!
//! - **Executors** ([`executor`]): declarative graph nodes created with
//!   [`provide`]/[`derive`], resolved lazily and cached per [`Scope`].
//! - **Scopes** ([`scope`]): the graph instance — caching, reactive
//!   propagation, cleanup, and disposal.
//! - **Flows** ([`flow`]): journaled, context-carrying sub-executions over a
//!   child "pod" scope, with subflow composition and parallel execution.
//! - **Tags** ([`tag`]): symbol-keyed, schema-validated metadata attachable
//!   to executors and readable from scopes and flow contexts.
//!
//! [`promised`] supplies the cold, memoized async value ([`Promised`]) every
//! suspension point in the crate returns; [`schema`] is the crate's
//! validation seam (bring your own validator); [`extension`] lets a host
//! wrap every resolve/update/execute/journal/subflow/parallel operation with
//! cross-cutting behavior (logging, metrics, retries); [`error`] is the
//! shared failure taxonomy.

mod accessor;
mod error;
mod executor;
mod extension;
mod flow;
mod node;
mod promised;
mod registry;
mod schema;
mod scope;
mod tag;

pub use accessor::Accessor;
pub use error::{DisposeReport, RuntimeError, ValidationIssue};
pub use executor::{derive, preset, provide, AccessorDep, Controller, DepSpec, Executor, Preset, ValueDep};
pub use extension::{Extension, Next, Operation, ParallelMode, ResolveOperation};
pub use flow::{flow, ExecuteOptions, Flow, FlowContext, FlowDefinition, FlowDefinitionInfo, FlowOutcome, ParallelOutcome, ParallelStats};
pub use node::{AnyValue, NodeId};
pub use promised::{IntoPromised, ParallelSettled, Promised};
pub use registry::{AccessMode, ExecutorKind};
pub use schema::{custom, validate, validate_async, CustomSchema, Schema};
pub use scope::{Scope, ScopeOptions};
pub use tag::{tag, HasTags, Tag, TagKey, TagMap, TagOptions, TagSource, TaggedValue};

/// Downgrades to `tracing::warn!` when the `tracing` feature is on, and is a
/// no-op otherwise. For recoverable misuse the core surfaces as a `Result`
/// rather than panics, but still wants a breadcrumb in logs.
#[doc(hidden)]
#[macro_export]
macro_rules! debug_warn {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "tracing")]
            {
                tracing::warn!($($x)*)
            }
            #[cfg(not(feature = "tracing"))]
            { }
        }
    }
}

/// Best-effort surfacing of a cleanup callback's failure (§7): the core
/// never lets a cleanup error abort `dispose`/`release`, but it must not be
/// silently dropped either.
pub(crate) fn log_cleanup_error(id: NodeId, message: &str) {
    cfg_if::cfg_if! {
        if #[cfg(feature = "tracing")] {
            tracing::error!(executor = ?id, "cleanup failed: {message}");
        } else {
            let _ = (id, message);
        }
    }
}
