#![forbid(unsafe_code)]
//! `Promised<T>` (C3): the library's cold, chainable, once-evaluated async
//! value.
//!
//! Grounded on `futures::future::Shared`: a `Shared` future is itself cold
//! (nothing runs until the first `.await`/`poll`) and memoizes its output
//! across every clone of the handle, which is exactly the "cold" + "once"
//! contract the spec asks for. `Promised<T>` is a thin, domain-named wrapper
//! around `Shared<LocalBoxFuture<Result<T, RuntimeError>>>` rather than a
//! hand-rolled state machine, the same way the teacher reaches for
//! `futures::stream::FuturesUnordered` instead of writing its own scheduler
//! (see `runtime.rs::serialization_resolvers`).

use crate::error::RuntimeError;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// A cold, chainable, memoized asynchronous value.
///
/// Cloning a `Promised` is cheap (it shares the underlying work); awaiting
/// any clone drives the same computation exactly once and every awaiter sees
/// the same outcome.
pub struct Promised<T: Clone + 'static> {
    inner: Shared<LocalBoxFuture<'static, Result<T, RuntimeError>>>,
}

impl<T: Clone + 'static> Clone for Promised<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Future for Promised<T> {
    type Output = Result<T, RuntimeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T: Clone + 'static> Promised<T> {
    /// Wraps an already-known value; resolves immediately on first await.
    pub fn value(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    /// Wraps an already-known failure.
    pub fn error(error: RuntimeError) -> Self {
        Self::from_result(Err(error))
    }

    fn from_result(result: Result<T, RuntimeError>) -> Self {
        Self::from_future(async move { result })
    }

    /// Wraps a thunk. The thunk does not run until the first await of this
    /// `Promised` (or one of its clones).
    pub fn from_future(fut: impl Future<Output = Result<T, RuntimeError>> + 'static) -> Self {
        Self {
            inner: fut.boxed_local().shared(),
        }
    }

    /// Transforms the resolved value. Does not run the transform if the
    /// source fails.
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> Promised<U> {
        let this = self.clone();
        Promised::from_future(async move { this.await.map(f) })
    }

    /// Transforms the resolved value into a new `Promised`, flattening the
    /// result. Does not run if the source fails.
    pub fn flat_map<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> Promised<U> + 'static,
    ) -> Promised<U> {
        let this = self.clone();
        Promised::from_future(async move {
            match this.await {
                Ok(value) => f(value).await,
                Err(e) => Err(e),
            }
        })
    }

    /// Transforms a failure, optionally recovering into a value (or a new
    /// failure) via another `Promised`. Does not run if the source succeeds.
    pub fn catch(&self, f: impl FnOnce(RuntimeError) -> Promised<T> + 'static) -> Promised<T> {
        let this = self.clone();
        Promised::from_future(async move {
            match this.await {
                Ok(value) => Ok(value),
                Err(e) => f(e).await,
            }
        })
    }

    /// Runs `f` after the source settles, regardless of outcome, without
    /// altering that outcome.
    pub fn finally(&self, f: impl FnOnce() + 'static) -> Promised<T> {
        let this = self.clone();
        Promised::from_future(async move {
            let result = this.await;
            f();
            result
        })
    }

    /// Resolves all `Promised`s concurrently, rejecting as soon as any one
    /// fails (its siblings are dropped, not cancelled cooperatively — see
    /// §5's open question on parallel cancellation). On success, `result[i]`
    /// corresponds to `items[i]` regardless of completion order.
    pub fn all(items: Vec<Promised<T>>) -> Promised<Vec<T>> {
        Promised::from_future(async move { futures::future::try_join_all(items).await })
    }

    /// Resolves all `Promised`s concurrently and always fulfills, with each
    /// slot holding either the value or the error. `result[i]` corresponds
    /// to `items[i]` regardless of completion order.
    pub fn all_settled(items: Vec<Promised<T>>) -> Promised<ParallelSettled<T>> {
        Promised::from_future(async move {
            let results = futures::future::join_all(items).await;
            Ok(ParallelSettled { results })
        })
    }
}

/// Lets a factory or flow handler return either a plain value or a
/// `Promised<T>` (§3, §4.4: `factory(...) → value | Promised<value>`).
/// `T` and `Promised<T>` never overlap as implementors for a fixed `T`, so
/// both blanket impls coexist without a coherence conflict.
pub trait IntoPromised<T: Clone + 'static> {
    fn into_promised(self) -> Promised<T>;
}

impl<T: Clone + 'static> IntoPromised<T> for T {
    fn into_promised(self) -> Promised<T> {
        Promised::value(self)
    }
}

impl<T: Clone + 'static> IntoPromised<T> for Promised<T> {
    fn into_promised(self) -> Promised<T> {
        self
    }
}

/// The outcome of [`Promised::all_settled`]: one slot per input, in input
/// order, each either fulfilled or rejected.
pub struct ParallelSettled<T> {
    pub results: Vec<Result<T, RuntimeError>>,
}

impl<T: Clone> Clone for ParallelSettled<T> {
    fn clone(&self) -> Self {
        Self {
            results: self.results.clone(),
        }
    }
}

impl<T: Clone> ParallelSettled<T> {
    pub fn fulfilled(&self) -> Vec<T> {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect()
    }

    pub fn rejected(&self) -> Vec<&RuntimeError> {
        self.results.iter().filter_map(|r| r.as_ref().err()).collect()
    }

    pub fn partition(&self) -> (Vec<T>, Vec<&RuntimeError>) {
        (self.fulfilled(), self.rejected())
    }

    pub fn first_fulfilled(&self) -> Option<T> {
        self.results.iter().find_map(|r| r.as_ref().ok().cloned())
    }

    pub fn first_rejected(&self) -> Option<&RuntimeError> {
        self.results.iter().find_map(|r| r.as_ref().err())
    }

    pub fn find_fulfilled(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .find(|v| pred(v))
            .cloned()
    }

    pub fn map_fulfilled<U>(&self, f: impl Fn(&T) -> U) -> Vec<U> {
        self.results.iter().filter_map(|r| r.as_ref().ok()).map(f).collect()
    }

    /// Returns every fulfilled value, or the first rejection unchanged,
    /// turning a settled result back into an all-or-nothing one.
    pub fn assert_all_fulfilled(&self) -> Result<Vec<T>, RuntimeError> {
        self.assert_all_fulfilled_with(|e| e.clone())
    }

    /// As [`Self::assert_all_fulfilled`], but passing the first rejection
    /// through `err_map` before returning it (`assertAllFulfilled(errMap?)`).
    pub fn assert_all_fulfilled_with(&self, err_map: impl Fn(&RuntimeError) -> RuntimeError) -> Result<Vec<T>, RuntimeError> {
        let mut out = Vec::with_capacity(self.results.len());
        for r in &self.results {
            match r {
                Ok(v) => out.push(v.clone()),
                Err(e) => return Err(err_map(e)),
            }
        }
        Ok(out)
    }
}
