#![forbid(unsafe_code)]
//! The schema adapter (C1): the core's interface to an externally defined
//! validation protocol (§6). The core never constructs schemas itself; it
//! only calls [`Schema::validate`] / [`Schema::validate_async`] and wraps
//! whatever issues come back into a [`RuntimeError::ValidationFailure`].

use crate::error::{RuntimeError, ValidationIssue};
use futures::future::LocalBoxFuture;

/// The external validation contract. Implement this for whatever validation
/// library a host application wants to use (the core is agnostic).
pub trait Schema<T> {
    /// Synchronous validation. Implementors whose validator is inherently
    /// asynchronous should return `Err(RuntimeError::SynchronousRequired)`
    /// here (§4.1) rather than blocking.
    fn validate(&self, input: T) -> Result<T, Vec<ValidationIssue>>;

    /// Asynchronous validation. The default forwards to [`Schema::validate`];
    /// override when the underlying validator is genuinely async.
    fn validate_async<'a>(&'a self, input: T) -> LocalBoxFuture<'a, Result<T, Vec<ValidationIssue>>>
    where
        T: 'a,
    {
        Box::pin(async move { self.validate(input) })
    }
}

/// Runs [`Schema::validate`], translating issues into a typed
/// [`RuntimeError`].
pub fn validate<T, S: Schema<T> + ?Sized>(schema: &S, input: T) -> Result<T, RuntimeError> {
    schema
        .validate(input)
        .map_err(|issues| RuntimeError::ValidationFailure { issues })
}

/// Runs [`Schema::validate_async`], translating issues into a typed
/// [`RuntimeError`].
pub async fn validate_async<T, S>(schema: &S, input: T) -> Result<T, RuntimeError>
where
    S: Schema<T> + ?Sized,
{
    schema
        .validate_async(input)
        .await
        .map_err(|issues| RuntimeError::ValidationFailure { issues })
}

/// A pass-through schema for type-only tagging: the validator returns the
/// input unchanged, never failing. Mirrors the core's `custom<T>()` escape
/// hatch for callers who want a tag/flow boundary without real validation.
pub struct CustomSchema<T>(std::marker::PhantomData<fn(T) -> T>);

impl<T> Default for CustomSchema<T> {
    fn default() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<T> Schema<T> for CustomSchema<T> {
    fn validate(&self, input: T) -> Result<T, Vec<ValidationIssue>> {
        Ok(input)
    }
}

/// Constructs the pass-through schema described in §6.
pub fn custom<T>() -> CustomSchema<T> {
    CustomSchema::default()
}
