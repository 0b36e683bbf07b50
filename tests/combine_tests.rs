use rs2_rx::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_zip_stops_at_shortest_source() {
    let letters = of(vec!["a", "b", "c"]);
    let result = of(vec![1, 2]).zip(&letters).blocking_collect().unwrap();
    assert_eq!(result, vec![(1, "a"), (2, "b")]);

    let result = of(vec![1, 2, 3, 4]).zip(&letters).blocking_collect().unwrap();
    assert_eq!(result, vec![(1, "a"), (2, "b"), (3, "c")]);
}

#[test]
fn test_zip_with_combines_by_position() {
    let result = range(1, 3)
        .zip_with(&range(10, 3), |a, b| a * b)
        .blocking_collect()
        .unwrap();
    assert_eq!(result, vec![10, 22, 36]);
}

#[test]
fn test_zip_all_with_asynchronous_sources() {
    let scheduler = worker_pool(2).unwrap();
    let slow = interval(Duration::from_millis(10), Arc::clone(&scheduler)).take(3);
    let fast = of(vec![100u64, 200, 300, 400]);

    let result = zip_all(vec![slow, fast], |values| values.iter().sum::<u64>())
        .blocking_collect_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(result, vec![100, 201, 302]);
}

#[test]
fn test_zip_with_empty_source_list_completes() {
    let observer = zip_all(Vec::<Stream<i32>>::new(), |values| values.len()).test();
    assert!(observer.is_completed());
    assert!(observer.values().is_empty());
}

#[test]
fn test_zip_error_fails_fast() {
    let failing = of(vec![1]).concat_with(&error(StreamError::custom("left failed")));
    let result = failing.zip(&of(vec![1, 2, 3])).blocking_collect();
    assert_eq!(result, Err(StreamError::custom("left failed")));
}

#[test]
fn test_merge_completes_after_every_source() {
    let scheduler = worker_pool(2).unwrap();
    let slow = timer(Duration::from_millis(30), Arc::clone(&scheduler)).map(|_| 3);
    let mut result = merge(vec![of(vec![1, 2]), slow, empty()])
        .blocking_collect_timeout(Duration::from_secs(2))
        .unwrap();
    result.sort();
    assert_eq!(result, vec![1, 2, 3]);
}

#[test]
fn test_merge_error_cancels_remaining_sources() {
    let scheduler = worker_pool(2).unwrap();
    let late = timer(Duration::from_millis(50), Arc::clone(&scheduler)).map(|_| 1);
    let observer = merge(vec![late, error(StreamError::Timeout)]).test();

    assert!(observer.await_terminal(Duration::from_secs(1)));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(observer.signals(), vec![Signal::Error(StreamError::Timeout)]);
}

#[test]
fn test_concat_subscribes_sequentially() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&subscriptions);
    let second = defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        of(vec![3, 4])
    });

    let result = of(vec![1, 2]).concat_with(&second).blocking_collect().unwrap();
    assert_eq!(result, vec![1, 2, 3, 4]);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concat_halts_on_error() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&subscriptions);
    let never_reached = defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        just(99)
    });

    let result = concat(vec![just(1), error(StreamError::custom("stop")), never_reached]).blocking_collect();
    assert_eq!(result, Err(StreamError::custom("stop")));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_merge_with_two_streams() {
    let mut result = range(0, 3)
        .merge_with(&range(10, 2))
        .blocking_collect()
        .unwrap();
    result.sort();
    assert_eq!(result, vec![0, 1, 2, 10, 11]);
}
