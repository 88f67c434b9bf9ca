use executor_graph::{Promised, RuntimeError};
use std::{cell::Cell, rc::Rc};

#[tokio::test]
async fn map_transforms_a_resolved_value_and_skips_on_failure() {
    let ok = Promised::value(2).map(|v| v * 10);
    assert_eq!(ok.await.unwrap(), 20);

    let failed: Promised<i32> = Promised::error(RuntimeError::custom("boom"));
    let mapped = failed.map(|v: i32| v * 10);
    assert!(mapped.await.is_err());
}

#[tokio::test]
async fn flat_map_chains_into_another_promised() {
    let chained = Promised::value(3).flat_map(|v| Promised::value(v + 1));
    assert_eq!(chained.await.unwrap(), 4);
}

#[tokio::test]
async fn catch_recovers_from_a_failure_but_not_from_success() {
    let recovered = Promised::<i32>::error(RuntimeError::custom("boom")).catch(|_| Promised::value(99));
    assert_eq!(recovered.await.unwrap(), 99);

    let untouched = Promised::value(1).catch(|_| Promised::value(99));
    assert_eq!(untouched.await.unwrap(), 1);
}

#[tokio::test]
async fn finally_runs_regardless_of_outcome_without_changing_it() {
    let ran = Rc::new(Cell::new(false));
    let ran_for_ok = Rc::clone(&ran);
    let ok = Promised::value(1).finally(move || ran_for_ok.set(true));
    assert_eq!(ok.await.unwrap(), 1);
    assert!(ran.get());

    let ran = Rc::new(Cell::new(false));
    let ran_for_err = Rc::clone(&ran);
    let failed: Promised<i32> = Promised::error(RuntimeError::custom("boom")).finally(move || ran_for_err.set(true));
    assert!(failed.await.is_err());
    assert!(ran.get());
}

#[tokio::test]
async fn a_promised_only_runs_its_producer_once_across_clones_and_repeated_awaits() {
    let calls = Rc::new(Cell::new(0));
    let calls_for_producer = Rc::clone(&calls);
    let shared = Promised::from_future(async move {
        calls_for_producer.set(calls_for_producer.get() + 1);
        Ok::<i32, RuntimeError>(7)
    });
    let clone = shared.clone();

    assert_eq!(shared.clone().await.unwrap(), 7);
    assert_eq!(clone.await.unwrap(), 7);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn all_resolves_every_item_in_input_order_and_fails_fast_on_the_first_rejection() {
    let items = vec![Promised::value(1), Promised::value(2), Promised::value(3)];
    assert_eq!(Promised::all(items).await.unwrap(), vec![1, 2, 3]);

    let with_failure = vec![
        Promised::value(1),
        Promised::error(RuntimeError::custom("boom")),
        Promised::value(3),
    ];
    assert!(Promised::all(with_failure).await.is_err());
}

#[tokio::test]
async fn all_settled_always_fulfills_partitioning_successes_from_failures_in_order() {
    let items = vec![
        Promised::value(1),
        Promised::error(RuntimeError::custom("boom")),
        Promised::value(3),
    ];

    let settled = Promised::all_settled(items).await.unwrap();
    let (fulfilled, rejected) = settled.partition();

    assert_eq!(fulfilled, vec![1, 3]);
    assert_eq!(rejected.len(), 1);
    assert_eq!(settled.first_fulfilled(), Some(1));
}

#[tokio::test]
async fn assert_all_fulfilled_turns_a_settled_result_back_into_all_or_nothing() {
    let all_ok = Promised::all_settled(vec![Promised::value(1), Promised::value(2)])
        .await
        .unwrap();
    assert_eq!(all_ok.assert_all_fulfilled().unwrap(), vec![1, 2]);

    let mixed = Promised::all_settled(vec![Promised::value(1), Promised::error(RuntimeError::custom("boom"))])
        .await
        .unwrap();
    assert!(mixed.assert_all_fulfilled().is_err());
}
