use executor_graph::{derive, provide, Controller, RuntimeError, Scope, ScopeOptions};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

#[tokio::test]
async fn updating_a_root_reruns_its_reactive_dependents_and_leaves_the_rest_untouched() {
    let root = provide(|_controller: Controller<i32>| 1, Vec::new());
    let mid = derive(root.reactive(), |v: i32, _controller: Controller<i32>| v + 1, Vec::new());
    let leaf = derive(mid.reactive(), |v: i32, _controller: Controller<i32>| v * 10, Vec::new());
    let scope = Scope::create(ScopeOptions::default());

    assert_eq!(scope.resolve(&leaf).await.unwrap(), 20);

    scope.update(&root, 2).await.unwrap();

    assert_eq!(scope.resolve(&mid).await.unwrap(), 3);
    assert_eq!(scope.resolve(&leaf).await.unwrap(), 30);
}

#[tokio::test]
async fn updating_an_unresolved_executor_fails_instead_of_silently_seeding_the_cache() {
    let root = provide(|_controller: Controller<i32>| 1, Vec::new());
    let scope = Scope::create(ScopeOptions::default());

    let err = scope.update(&root, 2).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotResolved { .. }));
}

#[tokio::test]
async fn cleanups_run_in_lifo_order_when_the_scope_is_disposed() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let order_for_factory = Rc::clone(&order);
    let executor = provide(
        move |controller: Controller<i32>| {
            let first = Rc::clone(&order_for_factory);
            let second = Rc::clone(&order_for_factory);
            controller.cleanup(move || {
                first.borrow_mut().push(1);
                Ok(())
            });
            controller.cleanup(move || {
                second.borrow_mut().push(2);
                Ok(())
            });
            0
        },
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());
    scope.resolve(&executor).await.unwrap();

    let report = scope.dispose();

    assert!(report.is_clean());
    assert_eq!(*order.borrow(), vec![2, 1]);
}

#[tokio::test]
async fn cleanup_failures_are_aggregated_in_the_dispose_report_not_swallowed() {
    let executor = provide(
        |controller: Controller<i32>| {
            controller.cleanup(|| Err(RuntimeError::custom("cleanup exploded")));
            0
        },
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());
    scope.resolve(&executor).await.unwrap();

    let report = scope.dispose();

    assert!(!report.is_clean());
    assert_eq!(report.cleanup_errors.len(), 1);
}

#[tokio::test]
async fn a_disposed_scope_rejects_further_resolution() {
    let executor = provide(|_controller: Controller<i32>| 1, Vec::new());
    let scope = Scope::create(ScopeOptions::default());
    scope.resolve(&executor).await.unwrap();
    scope.dispose();

    let err = scope.resolve(&executor).await.unwrap_err();
    assert!(matches!(err, RuntimeError::ScopeDisposed));
}

#[tokio::test]
async fn release_clears_the_cache_so_the_factory_reruns_on_the_next_resolve() {
    let calls = Rc::new(Cell::new(0));
    let calls_for_factory = Rc::clone(&calls);
    let executor = provide(
        move |_controller: Controller<i32>| {
            calls_for_factory.set(calls_for_factory.get() + 1);
            5
        },
        Vec::new(),
    );
    let scope = Scope::create(ScopeOptions::default());

    scope.resolve(&executor).await.unwrap();
    scope.release(&executor).unwrap();
    scope.resolve(&executor).await.unwrap();

    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn a_pod_copy_reads_its_parents_cache_instead_of_rerunning_the_factory() {
    let calls = Rc::new(Cell::new(0));
    let calls_for_factory = Rc::clone(&calls);
    let executor = provide(
        move |_controller: Controller<i32>| {
            calls_for_factory.set(calls_for_factory.get() + 1);
            42
        },
        Vec::new(),
    );
    let parent = Scope::create(ScopeOptions::default());
    parent.resolve(&executor).await.unwrap();

    let pod = parent.pod(Default::default(), Vec::new());

    assert_eq!(pod.resolve(&executor).await.unwrap(), 42);
    assert_eq!(calls.get(), 1, "a pod must copy-read a resolved parent value, not recompute it");
}

#[tokio::test]
async fn a_pods_own_resolutions_never_write_into_its_parents_cache() {
    let calls = Rc::new(Cell::new(0));
    let calls_for_factory = Rc::clone(&calls);
    let executor = provide(
        move |_controller: Controller<i32>| {
            calls_for_factory.set(calls_for_factory.get() + 1);
            7
        },
        Vec::new(),
    );
    let parent = Scope::create(ScopeOptions::default());
    let pod = parent.pod(Default::default(), Vec::new());

    assert_eq!(pod.resolve(&executor).await.unwrap(), 7);
    assert_eq!(parent.resolve(&executor).await.unwrap(), 7);
    assert_eq!(
        calls.get(),
        2,
        "a pod resolving before its parent does must not pre-seed the parent's own cache"
    );
}
