#![forbid(unsafe_code)]
//! Typed failure kinds for the executor graph (§4.8 / C8).
//!
//! Every fallible core operation returns `Result<T, RuntimeError>`. The core
//! never swallows an error: cleanup failures are aggregated (see
//! [`DisposeReport`]), everything else is surfaced verbatim to the caller.

use crate::node::NodeId;
use std::{fmt, rc::Rc};

/// A single validation issue surfaced by an external schema validator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationIssue {
    pub message: String,
    pub path: Option<String>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The taxonomy of failures the runtime can produce.
///
/// Every kind carries the fields the spec assigns it; `cause` (when present)
/// preserves the underlying error so extensions and callers can inspect the
/// full chain rather than a flattened message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("circular dependency: {}", chain_display(chain))]
    CircularDependency { chain: Vec<NodeId> },

    #[error("executor {executor:?} is not resolved")]
    NotResolved { executor: NodeId },

    #[error("scope has been disposed")]
    ScopeDisposed,

    #[error("factory for {executor:?} failed")]
    FactoryFailed {
        executor: NodeId,
        dependency_chain: Vec<NodeId>,
        #[source]
        cause: Box<RuntimeError>,
    },

    #[error("validation failed with {} issue(s)", issues.len())]
    ValidationFailure { issues: Vec<ValidationIssue> },

    #[error("tag {key} has no value and no default")]
    MissingValue { key: &'static str },

    #[error("tag {key} not found in source")]
    NotFound { key: &'static str },

    #[error("cycle in flow: {}", path.join(" -> "))]
    CycleInFlow { path: Vec<String> },

    #[error("operation cancelled")]
    OperationCancelled,

    #[error("tag {key} requires synchronous validation but the validator is async")]
    SynchronousRequired { key: &'static str },

    /// A handler or factory panicked / returned an opaque failure. Wraps the
    /// caller-supplied error so it is never silently dropped. `Rc` rather
    /// than `Box` so the whole enum can stay `Clone` (needed to hand the
    /// same cached failure back from repeated reads without re-running the
    /// factory, §7).
    #[error("operation failed: {message}")]
    Custom {
        message: String,
        cause: Option<Rc<dyn std::error::Error>>,
    },
}

fn chain_display(chain: &[NodeId]) -> String {
    chain
        .iter()
        .map(|id| format!("{id:?}"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl RuntimeError {
    pub fn custom(message: impl Into<String>) -> Self {
        RuntimeError::Custom {
            message: message.into(),
            cause: None,
        }
    }

    pub fn custom_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + 'static,
    ) -> Self {
        RuntimeError::Custom {
            message: message.into(),
            cause: Some(Rc::new(cause)),
        }
    }

    /// Wraps this error as the cause of a `factory-failed` error for `executor`,
    /// extending the dependency chain that led to it.
    pub fn into_factory_failed(
        self,
        executor: NodeId,
        mut dependency_chain: Vec<NodeId>,
    ) -> Self {
        dependency_chain.push(executor);
        RuntimeError::FactoryFailed {
            executor,
            dependency_chain,
            cause: Box::new(self),
        }
    }
}

/// Best-effort report produced by [`Scope::dispose`](crate::Scope::dispose) /
/// [`Scope::release`](crate::Scope::release): cleanup callbacks never abort
/// the traversal, but their failures are not silently discarded either.
#[derive(Debug, Default)]
pub struct DisposeReport {
    pub cleanup_errors: Vec<(NodeId, String)>,
}

impl DisposeReport {
    pub fn is_clean(&self) -> bool {
        self.cleanup_errors.is_empty()
    }
}
