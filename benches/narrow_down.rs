use criterion::{criterion_group, criterion_main, Criterion};
use executor_graph::{derive, provide, Controller, Executor, Scope, ScopeOptions};
use futures::executor::block_on;

fn narrow_down(c: &mut Criterion) {
    let sources: Vec<Executor<i32>> = (0..1000)
        .map(|n| provide(move |_controller: Controller<i32>| n, Vec::new()))
        .collect();
    let memo = derive(
        sources,
        |values: Vec<i32>, _controller: Controller<i32>| values.iter().sum::<i32>(),
        Vec::new(),
    );

    c.bench_function("narrow_down", |b| {
        b.iter(|| {
            let scope = Scope::create(ScopeOptions::default());
            block_on(async {
                let value = scope.resolve(&memo).await.unwrap();
                assert_eq!(value, 499500);
            });
            scope.dispose();
        });
    });
}

criterion_group!(benches, narrow_down);
criterion_main!(benches);
