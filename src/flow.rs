#![forbid(unsafe_code)]
//! The flow engine (C6, §4.6): nested and parallel sub-operation execution
//! over a child "pod" scope, per-invocation journal enabling replay,
//! extension wrapping of every operation.

use crate::{
    error::RuntimeError,
    extension::{self, Extension, Operation, ParallelMode},
    executor::DepSpec,
    node::{downcast_value, AnyValue},
    promised::{IntoPromised, ParallelSettled, Promised},
    schema::Schema,
    scope::{Scope, ScopeOptions},
    tag::{Tag, TagMap, TaggedValue},
};
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use std::{cell::RefCell, rc::Rc};

/// `{ name, input, output, tags? }` (§3 Flow, §4.6 Definition).
pub struct FlowDefinition<I, O> {
    pub name: String,
    pub input_schema: Rc<dyn Schema<I>>,
    pub output_schema: Rc<dyn Schema<O>>,
    pub tags: Vec<TaggedValue>,
}

/// A non-generic summary of a [`FlowDefinition`] (name and tags), carried on
/// [`Operation::Execute`]/[`Operation::Subflow`] so extensions can inspect
/// which flow is running without `Operation` itself needing to be generic
/// over every flow's `I`/`O` schema types.
#[derive(Debug, Clone)]
pub struct FlowDefinitionInfo {
    pub name: String,
    pub tags: Vec<TaggedValue>,
}

impl<I, O> FlowDefinition<I, O> {
    pub fn new(name: impl Into<String>, input_schema: impl Schema<I> + 'static, output_schema: impl Schema<O> + 'static) -> Self {
        Self {
            name: name.into(),
            input_schema: Rc::new(input_schema),
            output_schema: Rc::new(output_schema),
            tags: Vec::new(),
        }
    }
}

trait FlowInvoker<I, O> {
    fn run(&self, pod: Scope, ctx: FlowContext, input: I) -> LocalBoxFuture<'static, Result<O, RuntimeError>>;
}

struct TypedFlow<D, F> {
    deps: D,
    handler: Rc<F>,
}

impl<D, I, O, F, R> FlowInvoker<I, O> for TypedFlow<D, F>
where
    D: DepSpec,
    I: Clone + 'static,
    O: Clone + 'static,
    F: Fn(D::Materialized, FlowContext, I) -> R + 'static,
    R: IntoPromised<O>,
{
    fn run(&self, pod: Scope, ctx: FlowContext, input: I) -> LocalBoxFuture<'static, Result<O, RuntimeError>> {
        let deps = self.deps.clone();
        let handler = Rc::clone(&self.handler);
        Box::pin(async move {
            let descriptors = deps.descriptors();
            let slots = crate::scope::resolve_descriptors(pod.clone(), descriptors, Some(ctx.clone())).await?;
            let mut slots = slots.into_iter();
            let materialized = deps.materialize(&pod, &[], &mut slots);
            handler(materialized, ctx, input).into_promised().await
        })
    }
}

/// A declared flow (§3 Flow, §4.6): `name`, schemas, dependencies, handler.
/// Cheap to clone — a handle over `Rc`-shared definition state.
pub struct Flow<I, O> {
    pub(crate) name: String,
    pub(crate) tags: Vec<TaggedValue>,
    input_schema: Rc<dyn Schema<I>>,
    output_schema: Rc<dyn Schema<O>>,
    invoker: Rc<dyn FlowInvoker<I, O>>,
}

impl<I, O> Clone for Flow<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tags: self.tags.clone(),
            input_schema: Rc::clone(&self.input_schema),
            output_schema: Rc::clone(&self.output_schema),
            invoker: Rc::clone(&self.invoker),
        }
    }
}

/// `flow(deps, definition, handler)` (§6, §4.6 Definition).
pub fn flow<D, I, O, F, R>(definition: FlowDefinition<I, O>, deps: D, handler: F) -> Flow<I, O>
where
    D: DepSpec,
    I: Clone + 'static,
    O: Clone + 'static,
    F: Fn(D::Materialized, FlowContext, I) -> R + 'static,
    R: IntoPromised<O>,
{
    Flow {
        name: definition.name,
        tags: definition.tags,
        input_schema: definition.input_schema,
        output_schema: definition.output_schema,
        invoker: Rc::new(TypedFlow {
            deps,
            handler: Rc::new(handler),
        }),
    }
}

/// Options accepted by [`Flow::execute`] (§4.6 Execution).
#[derive(Default)]
pub struct ExecuteOptions {
    pub scope: Option<Scope>,
    pub tags: TagMap,
    pub extensions: Vec<Rc<dyn Extension>>,
}

/// The `{ success, result|error, ctx }` envelope returned when
/// `details: true` is requested (§4.6 Execution options).
pub struct FlowOutcome<O> {
    pub success: bool,
    pub result: Option<O>,
    pub error: Option<RuntimeError>,
    pub ctx: FlowContext,
}

impl<I: Clone + 'static, O: Clone + 'static> Flow<I, O> {
    /// `flow.execute(input, options?)` (§4.6 Execution): the common path,
    /// rejecting on handler/validation failure.
    pub fn execute(&self, input: I, options: ExecuteOptions) -> Promised<O> {
        let flow = self.clone();
        Promised::from_future(async move {
            let outcome = flow.execute_details(input, options).await;
            match outcome {
                Ok(o) if o.success => Ok(o.result.expect("success outcome always carries a result")),
                Ok(o) => Err(o.error.expect("failed outcome always carries an error")),
                Err(e) => Err(e),
            }
        })
    }

    /// `flow.execute(input, { details: true })` (§4.6 Execution options):
    /// never rejects — failures become `{ success: false, error, ctx }`.
    pub async fn execute_details(&self, input: I, options: ExecuteOptions) -> Result<FlowOutcome<O>, RuntimeError> {
        let owns_scope = options.scope.is_none();
        let parent = options.scope.unwrap_or_else(|| Scope::create(ScopeOptions::default()));
        let pod = parent.pod(options.tags.clone(), options.extensions);
        let ctx = FlowContext::root(pod.clone(), options.tags, self.name.clone());
        pod.notify_pod_init(&ctx);

        let flow = self.clone();
        let input_any: AnyValue = Rc::new(RefCell::new(input.clone()));
        let op = Operation::Execute {
            definition: FlowDefinitionInfo {
                name: self.name.clone(),
                tags: self.tags.clone(),
            },
            input: input_any,
            depth: 0,
        };
        let result = run_flow_body(&flow, pod.clone(), ctx.clone(), input, op).await;

        pod.dispose_pod();
        if owns_scope {
            parent.dispose();
        }

        if let Err(e) = &result {
            extension::notify_error(&pod.extensions_snapshot(), e, &pod, Some(&ctx));
        }

        Ok(FlowOutcome {
            success: result.is_ok(),
            result: result.as_ref().ok().cloned(),
            error: result.as_ref().err().cloned(),
            ctx,
        })
    }
}

/// Validates input, invokes the flow body under the extension pipeline,
/// validates output (§4.6 steps 4-7). Shared by top-level `execute` and
/// `FlowContext::exec` (subflows run the exact same body, just with a
/// nested pod and a `Subflow` operation instead of `Execute`).
async fn run_flow_body<I: Clone + 'static, O: Clone + 'static>(
    flow: &Flow<I, O>,
    pod: Scope,
    ctx: FlowContext,
    input: I,
    op: Operation,
) -> Result<O, RuntimeError> {
    let input = crate::schema::validate(flow.input_schema.as_ref(), input)?;
    let extensions = pod.extensions_reversed_snapshot();
    let flow_for_invoke = flow.clone();
    let pod_for_invoke = pod.clone();
    let ctx_for_invoke = ctx.clone();
    let value_any: AnyValue = extension::run_wrapped(&extensions, Some(ctx.clone()), op, move || {
        Box::pin(async move {
            let output = flow_for_invoke.invoker.run(pod_for_invoke, ctx_for_invoke, input).await?;
            Ok(Rc::new(RefCell::new(output)) as AnyValue)
        })
    })
    .await?;
    let output = downcast_value::<O>(&value_any)?;
    crate::schema::validate(flow.output_schema.as_ref(), output)
}

struct FlowContextInner {
    pod: Scope,
    tags: TagMap,
    raw: FxHashMap<String, AnyValue>,
    journal: FxHashMap<String, AnyValue>,
    depth: u32,
    parent_name: Option<String>,
    name: String,
    is_parallel: bool,
}

/// Per-invocation execution context (§3 Flow, §4.6 step 3/6): a
/// tag-addressable key-value store, a journal, and execution metadata.
/// Cheap to clone — the handle shares state the same way `Scope` does.
#[derive(Clone)]
pub struct FlowContext(Rc<RefCell<FlowContextInner>>);

impl FlowContext {
    fn root(pod: Scope, tags: TagMap, name: String) -> Self {
        Self(Rc::new(RefCell::new(FlowContextInner {
            pod,
            tags,
            raw: FxHashMap::default(),
            journal: FxHashMap::default(),
            depth: 0,
            parent_name: None,
            name,
            is_parallel: false,
        })))
    }

    pub(crate) fn pod(&self) -> Scope {
        self.0.borrow().pod.clone()
    }

    pub fn depth(&self) -> u32 {
        self.0.borrow().depth
    }

    pub fn parent_name(&self) -> Option<String> {
        self.0.borrow().parent_name.clone()
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn is_parallel(&self) -> bool {
        self.0.borrow().is_parallel
    }

    /// `ctx.get(tag)` (§4.6 step 6).
    pub fn get_tag<T: Clone + 'static>(&self, tag: &Tag<T>) -> Option<T> {
        tag.find(&self.0.borrow().tags)
    }

    /// `ctx.set(tag, value)` (§4.6 step 6).
    pub fn set_tag<T: Clone + 'static>(&self, tag: &Tag<T>, value: T) -> Result<(), RuntimeError> {
        tag.set_in(&mut self.0.borrow_mut().tags, value)
    }

    /// `ctx.get(key)` (§4.6 step 6): raw string-keyed access.
    pub fn get_key<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let inner = self.0.borrow();
        inner.raw.get(key).and_then(|v| downcast_value::<T>(v).ok())
    }

    /// `ctx.set(key, value)` (§4.6 step 6): raw string-keyed access.
    pub fn set_key<T: Clone + 'static>(&self, key: &str, value: T) {
        self.0
            .borrow_mut()
            .raw
            .insert(key.to_string(), Rc::new(RefCell::new(value)));
    }

    fn journal_get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let inner = self.0.borrow();
        inner.journal.get(key).and_then(|v| downcast_value::<T>(v).ok())
    }

    /// As [`FlowContext::journal_get`] but without downcasting, so a replay
    /// hit can still hand the type-erased value to `Operation::Journal`'s
    /// `output` field for extensions that want to inspect it.
    fn journal_get_raw(&self, key: &str) -> Option<AnyValue> {
        self.0.borrow().journal.get(key).cloned()
    }

    fn journal_set(&self, key: String, value: AnyValue) {
        self.0.borrow_mut().journal.insert(key, value);
    }

    /// `ctx.run(key, fn, ...args?)` (§4.6 step 6): journal memoization —
    /// a hit returns the recorded result and marks replay; a miss runs
    /// `f`, records the result, and returns it.
    pub fn run<T: Clone + 'static, R: IntoPromised<T>>(
        &self,
        key: &str,
        f: impl FnOnce() -> R + 'static,
    ) -> Promised<T> {
        let ctx = self.clone();
        let key = key.to_string();
        Promised::from_future(async move {
            if let Some(raw) = ctx.journal_get_raw(&key) {
                let extensions = ctx.pod().extensions_reversed_snapshot();
                let op = Operation::Journal {
                    key: key.clone(),
                    params: None,
                    is_replay: true,
                    output: Some(Rc::clone(&raw)),
                };
                extension::run_wrapped(&extensions, Some(ctx.clone()), op, move || {
                    Box::pin(async move { Ok(Rc::new(RefCell::new(())) as AnyValue) })
                })
                .await?;
                return downcast_value::<T>(&raw);
            }

            let extensions = ctx.pod().extensions_reversed_snapshot();
            let op = Operation::Journal {
                key: key.clone(),
                params: None,
                is_replay: false,
                output: None,
            };
            let value_any = extension::run_wrapped(&extensions, Some(ctx.clone()), op, move || {
                Box::pin(async move {
                    let value = f().into_promised().await?;
                    Ok(Rc::new(RefCell::new(value)) as AnyValue)
                })
            })
            .await?;
            ctx.journal_set(key, Rc::clone(&value_any));
            downcast_value::<T>(&value_any)
        })
    }

    /// `ctx.exec(subflow, subInput, subOptions?)` (§4.6 step 6): runs a
    /// subflow in a child context forked from this one, over a nested pod.
    /// An optional `journal_key` memoizes the subflow invocation itself.
    pub fn exec<I2: Clone + 'static, O2: Clone + 'static>(
        &self,
        subflow: &Flow<I2, O2>,
        input: I2,
        journal_key: Option<&str>,
    ) -> Promised<O2> {
        if let Some(key) = journal_key {
            if let Some(cached) = self.journal_get::<O2>(key) {
                return Promised::value(cached);
            }
        }

        let child_pod = self.pod().pod(TagMap::new(), Vec::new());
        let child_ctx = self.fork(child_pod.clone(), subflow.name.clone(), false);
        child_pod.notify_pod_init(&child_ctx);
        let subflow = subflow.clone();
        let input_any: AnyValue = Rc::new(RefCell::new(input.clone()));
        let op = Operation::Subflow {
            definition: FlowDefinitionInfo {
                name: subflow.name.clone(),
                tags: subflow.tags.clone(),
            },
            input: input_any,
            depth: child_ctx.depth(),
            journal_key: journal_key.map(|s| s.to_string()),
        };
        let ctx_for_journal = self.clone();
        let key_owned = journal_key.map(|s| s.to_string());
        Promised::from_future(async move {
            let result = run_flow_body(&subflow, child_pod.clone(), child_ctx, input, op).await;
            child_pod.dispose_pod();
            let output = result?;
            if let Some(key) = key_owned {
                ctx_for_journal.journal_set(key, Rc::new(RefCell::new(output.clone())));
            }
            Ok(output)
        })
    }

    /// `ctx.parallel([promised…])` (§4.6 step 6): fail-fast concurrent
    /// execution.
    pub fn parallel<T: Clone + 'static>(&self, items: Vec<Promised<T>>) -> Promised<ParallelOutcome<T>> {
        let extensions = self.pod().extensions_reversed_snapshot();
        let ctx = self.clone();
        let total = items.len();
        let op = Operation::Parallel {
            mode: ParallelMode::Parallel,
            promise_count: total,
        };
        Promised::from_future(async move {
            let value_any = extension::run_wrapped(&extensions, Some(ctx), op, move || {
                Box::pin(async move {
                    let results = Promised::all(items).await?;
                    Ok(Rc::new(RefCell::new(results)) as AnyValue)
                })
            })
            .await?;
            let results = downcast_value::<Vec<T>>(&value_any)?;
            Ok(ParallelOutcome {
                stats: ParallelStats {
                    total,
                    succeeded: results.len(),
                    failed: 0,
                },
                results,
            })
        })
    }

    /// `ctx.parallelSettled([promised…])` (§4.6 step 6): never fails.
    pub fn parallel_settled<T: Clone + 'static>(&self, items: Vec<Promised<T>>) -> Promised<ParallelSettled<T>> {
        let extensions = self.pod().extensions_reversed_snapshot();
        let ctx = self.clone();
        let total = items.len();
        let op = Operation::Parallel {
            mode: ParallelMode::Settled,
            promise_count: total,
        };
        Promised::from_future(async move {
            let value_any = extension::run_wrapped(&extensions, Some(ctx), op, move || {
                Box::pin(async move {
                    let settled = Promised::all_settled(items).await?;
                    Ok(Rc::new(RefCell::new(settled)) as AnyValue)
                })
            })
            .await?;
            downcast_value::<ParallelSettled<T>>(&value_any)
        })
    }

    fn fork(&self, pod: Scope, name: String, is_parallel: bool) -> FlowContext {
        let inner = self.0.borrow();
        FlowContext(Rc::new(RefCell::new(FlowContextInner {
            pod,
            tags: inner.tags.clone(),
            raw: inner.raw.clone(),
            journal: FxHashMap::default(),
            depth: inner.depth + 1,
            parent_name: Some(inner.name.clone()),
            name,
            is_parallel,
        })))
    }
}

/// The outcome of [`FlowContext::parallel`]: `result[i]` corresponds to
/// `items[i]` regardless of completion order (§4.3 Ordering, §8).
pub struct ParallelOutcome<T> {
    pub results: Vec<T>,
    pub stats: ParallelStats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}
