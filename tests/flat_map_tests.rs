use quickcheck::{quickcheck, TestResult};
use rs2_rx::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

fn pool() -> SchedulerRef {
    static POOL: OnceLock<SchedulerRef> = OnceLock::new();
    POOL.get_or_init(|| worker_pool(4).unwrap()).clone()
}

/// A single-item stream that answers after `delay`, like a remote call
fn remote(value: i64, delay_ms: u64) -> Stream<i64> {
    timer(Duration::from_millis(delay_ms), pool()).map(move |_| value)
}

/// Inner stream that records how many inners are running at once
fn tracked(value: i64, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Stream<i64> {
    defer(move || {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        let done = Arc::clone(&active);
        remote(value, 15).do_on_signal(move |signal| {
            if signal.is_terminal() {
                done.fetch_sub(1, Ordering::SeqCst);
            }
        })
    })
}

#[test]
fn test_concurrency_one_is_strictly_sequential() {
    // Later items answer faster; with one slot they must still come out in order
    let result = range(1, 5)
        .flat_map_with_concurrency(Some(1), |n| remote(n, 60 - (n as u64) * 10))
        .blocking_collect_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(result, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_concat_map_is_sequential() {
    let result = range(1, 3)
        .concat_map(|n| range(n * 10, 2).concat_with(&remote(-n, 20)))
        .blocking_collect_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(result, vec![10, 11, -1, 20, 21, -2, 30, 31, -3]);
}

#[test]
fn test_unbounded_flat_map_interleaves() {
    let result = range(1, 4)
        .flat_map(|n| remote(n, 120 - (n as u64) * 25))
        .blocking_collect_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(result, vec![4, 3, 2, 1]);
}

#[test]
fn test_window_bounds_active_inners() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

    let mut result = range(0, 12)
        .flat_map_with_concurrency(Some(3), move |n| tracked(n, Arc::clone(&a), Arc::clone(&p)))
        .blocking_collect_timeout(Duration::from_secs(5))
        .unwrap();
    result.sort();

    assert_eq!(result, (0..12).collect::<Vec<i64>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[test]
fn test_flat_map_with_config_uses_configured_limit() {
    let config = RxConfig::from_json(r#"{ "flat_map_concurrency": 2 }"#).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

    let count = range(0, 8)
        .flat_map_with_config(&config, move |n| tracked(n, Arc::clone(&a), Arc::clone(&p)))
        .count()
        .blocking_collect_timeout(Duration::from_secs(5))
        .unwrap();

    assert_eq!(count, vec![8]);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn test_inner_error_fails_fast_and_cancels_the_rest() {
    let observer = range(1, 3)
        .flat_map(|n| {
            if n == 2 {
                error(StreamError::custom("inner 2 failed"))
            } else {
                remote(n, 50)
            }
        })
        .test();

    assert!(observer.await_terminal(Duration::from_secs(1)));
    assert_eq!(observer.error(), Some(StreamError::custom("inner 2 failed")));

    std::thread::sleep(Duration::from_millis(120));
    assert!(observer.values().is_empty());
    assert_eq!(observer.terminal_count(), 1);
}

#[test]
fn test_recovered_inners_do_not_fail_the_merge() {
    let result = range(1, 3)
        .flat_map(|n| {
            let inner = if n == 2 {
                error(StreamError::custom("flaky"))
            } else {
                just(n)
            };
            inner.on_error_return(|_| 0)
        })
        .blocking_collect()
        .unwrap();
    assert_eq!(result, vec![1, 0, 3]);
}

#[test]
fn test_exactly_three_n_items_then_one_complete() {
    let n = 200;
    let observer = range(0, n)
        .flat_map(|x| of(vec![x, x, x]).subscribe_on(pool()))
        .test();

    assert!(observer.await_terminal(Duration::from_secs(5)));
    assert!(observer.is_completed());
    assert_eq!(observer.terminal_count(), 1);
    assert_eq!(observer.next_count(), 3 * n);

    let mut per_value: HashMap<i64, usize> = HashMap::new();
    for value in observer.values() {
        *per_value.entry(value).or_default() += 1;
    }
    assert_eq!(per_value.len(), n);
    assert!(per_value.values().all(|&count| count == 3));
}

#[test]
fn test_flat_map_count_property() {
    fn prop(items: Vec<u8>, limit: u8) -> TestResult {
        if items.len() > 64 {
            return TestResult::discard();
        }
        let limit = if limit % 4 == 0 { None } else { Some(limit as usize % 4) };
        let result = from_iter(items.clone())
            .flat_map_with_concurrency(limit, |x| of(vec![x, x, x]).subscribe_on(pool()))
            .blocking_collect_timeout(Duration::from_secs(5));

        let mut actual = match result {
            Ok(values) => values,
            Err(_) => return TestResult::failed(),
        };
        let mut expected: Vec<u8> = items.iter().flat_map(|&x| vec![x, x, x]).collect();
        actual.sort();
        expected.sort();
        TestResult::from_bool(actual == expected)
    }
    quickcheck(prop as fn(Vec<u8>, u8) -> TestResult);
}

#[test]
fn test_merge_coordinator_handles_long_synchronous_sources() {
    let count = range(0, 50_000)
        .flat_map(just)
        .count()
        .blocking_collect()
        .unwrap();
    assert_eq!(count, vec![50_000]);
}
