use executor_graph::{
    custom, derive, preset, provide, Accessor, Controller, Promised, RuntimeError, Scope, ScopeOptions,
};

#[tokio::test]
async fn provide_resolves_without_dependencies() {
    let answer = provide(|_controller: Controller<i32>| 42, Vec::new());
    let scope = Scope::create(ScopeOptions::default());

    assert_eq!(scope.resolve(&answer).await.unwrap(), 42);
}

#[tokio::test]
async fn derive_resolves_through_value_dependency() {
    let base = provide(|_controller: Controller<i32>| 10, Vec::new());
    let doubled = derive(
        base,
        |value: i32, _controller: Controller<i32>| value * 2,
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());

    assert_eq!(scope.resolve(&doubled).await.unwrap(), 20);
}

#[tokio::test]
async fn resolving_twice_reuses_the_cached_value_without_rerunning_the_factory() {
    use std::{cell::Cell, rc::Rc};

    let calls = Rc::new(Cell::new(0));
    let counted = {
        let calls = Rc::clone(&calls);
        provide(
            move |_controller: Controller<i32>| {
                calls.set(calls.get() + 1);
                7
            },
            Vec::new(),
        )
    };
    let scope = Scope::create(ScopeOptions::default());

    assert_eq!(scope.resolve(&counted).await.unwrap(), 7);
    assert_eq!(scope.resolve(&counted).await.unwrap(), 7);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn lazy_dependency_does_not_force_resolution() {
    use std::{cell::Cell, rc::Rc};

    let calls = Rc::new(Cell::new(0));
    let expensive = {
        let calls = Rc::clone(&calls);
        provide(
            move |_controller: Controller<i32>| {
                calls.set(calls.get() + 1);
                99
            },
            Vec::new(),
        )
    };
    let consumer = derive(
        expensive.lazy(),
        |accessor: Accessor<i32>, _controller: Controller<bool>| accessor.lookup().is_none(),
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());

    assert_eq!(scope.resolve(&consumer).await.unwrap(), true);
    assert_eq!(calls.get(), 0, "a lazy dependency must not force its own resolution");
}

#[tokio::test]
async fn static_dependency_can_read_its_own_prior_value_via_the_controller() {
    let counter = provide(
        |controller: Controller<i32>| {
            let current = controller.accessor().get().unwrap_or(0);
            current + 1
        },
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());

    assert_eq!(scope.resolve(&counter).await.unwrap(), 1);
}

#[tokio::test]
async fn resolving_an_executor_from_inside_its_own_factory_is_a_rejected_cycle() {
    let looped = provide(
        |controller: Controller<i32>| {
            let accessor = controller.accessor();
            Promised::from_future(async move { accessor.resolve().await })
        },
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());

    let err = scope.resolve(&looped).await.unwrap_err();
    assert!(matches!(err, RuntimeError::FactoryFailed { .. }));
}

#[tokio::test]
async fn preset_override_skips_the_factory_entirely() {
    use std::{cell::Cell, rc::Rc};

    let calls = Rc::new(Cell::new(0));
    let executor = {
        let calls = Rc::clone(&calls);
        provide(
            move |_controller: Controller<i32>| {
                calls.set(calls.get() + 1);
                1
            },
            Vec::new(),
        )
    };
    let scope = Scope::create(ScopeOptions {
        presets: vec![preset(executor, 999)],
        ..Default::default()
    });

    assert_eq!(scope.resolve(&executor).await.unwrap(), 999);
    assert_eq!(calls.get(), 0, "a preset must never invoke the factory");
}

#[tokio::test]
async fn validation_failure_surfaces_as_a_typed_error() {
    struct RejectEverything;
    impl executor_graph::Schema<i32> for RejectEverything {
        fn validate(&self, _input: i32) -> Result<i32, Vec<executor_graph::ValidationIssue>> {
            Err(vec![executor_graph::ValidationIssue::new("always rejected")])
        }
    }

    let tag = executor_graph::tag(RejectEverything, executor_graph::TagOptions::default());
    let result = tag.make(Some(1));
    assert!(matches!(result, Err(RuntimeError::ValidationFailure { .. })));

    // A pass-through schema, by contrast, never rejects.
    let permissive = executor_graph::tag(custom::<i32>(), executor_graph::TagOptions::default());
    assert!(permissive.make(Some(1)).is_ok());
}
