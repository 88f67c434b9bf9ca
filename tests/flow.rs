use executor_graph::{
    custom, provide, tag, Controller, ExecuteOptions, Flow, FlowContext, FlowDefinition,
    ParallelSettled, Promised, RuntimeError, Schema, TagOptions, ValidationIssue,
};

fn doubling_flow(source: executor_graph::Executor<i32>) -> Flow<i32, i32> {
    executor_graph::flow(
        FlowDefinition::new("double", custom::<i32>(), custom::<i32>()),
        source,
        |base: i32, _ctx: FlowContext, input: i32| base + input * 2,
    )
}

#[tokio::test]
async fn execute_resolves_its_dependency_and_returns_the_handler_result() {
    let source = provide(|_controller: Controller<i32>| 10, Vec::new());
    let flow = doubling_flow(source);

    let result = flow.execute(5, ExecuteOptions::default()).await.unwrap();
    assert_eq!(result, 20);
}

struct RejectEverything;
impl Schema<i32> for RejectEverything {
    fn validate(&self, _input: i32) -> Result<i32, Vec<ValidationIssue>> {
        Err(vec![ValidationIssue::new("nope")])
    }
}

#[tokio::test]
async fn invalid_input_becomes_a_failed_outcome_instead_of_a_panic() {
    let flow = executor_graph::flow(
        FlowDefinition::new("rejects", RejectEverything, custom::<i32>()),
        (),
        |_: (), _ctx: FlowContext, input: i32| input,
    );

    let outcome = flow.execute_details(1, ExecuteOptions::default()).await.unwrap();

    assert!(!outcome.success);
    assert!(matches!(outcome.error, Some(RuntimeError::ValidationFailure { .. })));
    assert!(outcome.result.is_none());
}

#[tokio::test]
async fn ctx_run_memoizes_the_first_result_within_one_invocation() {
    use std::{cell::Cell, rc::Rc};

    let calls = Rc::new(Cell::new(0));
    let calls_for_handler = Rc::clone(&calls);
    let counting = executor_graph::flow(
        FlowDefinition::new("count", custom::<()>(), custom::<i32>()),
        (),
        move |_: (), ctx: FlowContext, _input: ()| {
            let calls = Rc::clone(&calls_for_handler);
            Promised::from_future(async move {
                let first = ctx.run::<i32>("only-key", move || {
                    calls.set(calls.get() + 1);
                    7
                }).await?;
                let second = ctx
                    .run::<i32>("only-key", || -> i32 { panic!("a journal hit must not rerun the producer") })
                    .await?;
                Ok(first + second)
            })
        },
    );

    let result = counting.execute((), ExecuteOptions::default()).await.unwrap();

    assert_eq!(result, 14);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn exec_runs_a_subflow_over_a_nested_pod() {
    let inner = executor_graph::flow(
        FlowDefinition::new("inner", custom::<i32>(), custom::<i32>()),
        (),
        |_: (), _ctx: FlowContext, input: i32| input * 10,
    );
    let outer = executor_graph::flow(
        FlowDefinition::new("outer", custom::<i32>(), custom::<i32>()),
        (),
        move |_: (), ctx: FlowContext, input: i32| {
            let inner = inner.clone();
            Promised::from_future(async move { ctx.exec(&inner, input, None).await })
        },
    );

    let result = outer.execute(4, ExecuteOptions::default()).await.unwrap();
    assert_eq!(result, 40);
}

#[tokio::test]
async fn exec_with_a_journal_key_replays_the_cached_subflow_result() {
    use std::{cell::Cell, rc::Rc};

    let calls = Rc::new(Cell::new(0));
    let calls_for_inner = Rc::clone(&calls);
    let inner = executor_graph::flow(
        FlowDefinition::new("inner", custom::<i32>(), custom::<i32>()),
        (),
        move |_: (), _ctx: FlowContext, input: i32| {
            calls_for_inner.set(calls_for_inner.get() + 1);
            input
        },
    );
    let outer = executor_graph::flow(
        FlowDefinition::new("outer", custom::<i32>(), custom::<i32>()),
        (),
        move |_: (), ctx: FlowContext, input: i32| {
            let inner = inner.clone();
            Promised::from_future(async move {
                let first = ctx.exec(&inner, input, Some("sub")).await?;
                let second = ctx.exec(&inner, input, Some("sub")).await?;
                Ok(first + second)
            })
        },
    );

    let result = outer.execute(5, ExecuteOptions::default()).await.unwrap();

    assert_eq!(result, 10);
    assert_eq!(calls.get(), 1, "the second exec with the same journal key must replay, not re-run, the subflow");
}

#[tokio::test]
async fn parallel_settled_partitions_fulfilled_and_rejected_promises() {
    let flow = executor_graph::flow(
        FlowDefinition::new("settle", custom::<()>(), custom::<(i32, usize)>()),
        (),
        |_: (), ctx: FlowContext, _input: ()| {
            Promised::from_future(async move {
                let items = vec![
                    Promised::value(1),
                    Promised::<i32>::error(RuntimeError::custom("boom")),
                    Promised::value(3),
                ];
                let settled: ParallelSettled<i32> = ctx.parallel_settled(items).await?;
                let (ok, err) = settled.partition();
                Ok((ok.iter().sum::<i32>(), err.len()))
            })
        },
    );

    let (sum, failures) = flow.execute((), ExecuteOptions::default()).await.unwrap();

    assert_eq!(sum, 4);
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn parallel_fails_fast_as_soon_as_one_item_rejects() {
    let flow = executor_graph::flow(
        FlowDefinition::new("race", custom::<()>(), custom::<Vec<i32>>()),
        (),
        |_: (), ctx: FlowContext, _input: ()| {
            Promised::from_future(async move {
                let items = vec![Promised::value(1), Promised::<i32>::error(RuntimeError::custom("boom"))];
                let outcome = ctx.parallel(items).await?;
                Ok(outcome.results)
            })
        },
    );

    let outcome = flow.execute_details((), ExecuteOptions::default()).await.unwrap();
    assert!(!outcome.success);
}

#[tokio::test]
async fn ctx_set_tag_and_get_tag_roundtrip_through_the_flow_context() {
    let marker = tag(custom::<&'static str>(), TagOptions::<&'static str>::default());
    let marker_for_handler = marker.clone();
    let flow = executor_graph::flow(
        FlowDefinition::new("tags", custom::<()>(), custom::<Option<&'static str>>()),
        (),
        move |_: (), ctx: FlowContext, _input: ()| {
            ctx.set_tag(&marker_for_handler, "seen").unwrap();
            ctx.get_tag(&marker_for_handler)
        },
    );

    let result = flow.execute((), ExecuteOptions::default()).await.unwrap();
    assert_eq!(result, Some("seen"));
}
