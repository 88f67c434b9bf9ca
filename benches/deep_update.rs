use criterion::{criterion_group, criterion_main, Criterion};
use executor_graph::{derive, provide, Controller, Scope, ScopeOptions};
use futures::executor::block_on;

fn deep_update(c: &mut Criterion) {
    let root = provide(|_controller: Controller<i32>| 0i32, Vec::new());
    let mut prev = root;
    for _ in 0..1000 {
        let dep = prev;
        prev = derive(
            dep.reactive(),
            |value: i32, _controller: Controller<i32>| value + 1,
            Vec::new(),
        );
    }
    let tail = prev;

    c.bench_function("deep_update", |b| {
        b.iter(|| {
            let scope = Scope::create(ScopeOptions::default());
            block_on(async {
                scope.resolve(&tail).await.unwrap();
                scope.update(&root, 1).await.unwrap();
                let value = scope.resolve(&tail).await.unwrap();
                assert_eq!(value, 1001);
            });
            scope.dispose();
        });
    });
}

criterion_group!(benches, deep_update);
criterion_main!(benches);
