use rs2_rx::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_cold_stream_replays_for_every_subscriber() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&subscriptions);
    let stream = Stream::create(move |emitter| {
        counter.fetch_add(1, Ordering::SeqCst);
        emitter.next(1);
        emitter.next(2);
        emitter.complete();
    });

    // Building the stream does no work
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);

    let first = stream.test();
    let second = stream.test();
    let expected = vec![Signal::Next(1), Signal::Next(2), Signal::Complete];
    assert_eq!(first.signals(), expected);
    assert_eq!(second.signals(), expected);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
}

#[test]
fn test_subscribe_with_callbacks() {
    let items = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(AtomicUsize::new(0));
    let sink_items = Arc::clone(&items);
    let sink_completed = Arc::clone(&completed);

    let subscription = of(vec!["a", "b"]).subscribe(
        move |value| sink_items.lock().unwrap().push(value),
        |error| panic!("unexpected error {}", error),
        move || {
            sink_completed.fetch_add(1, Ordering::SeqCst);
        },
    );

    assert_eq!(*items.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    // A terminal signal disposes the subscription
    assert!(subscription.is_cancelled());
}

#[test]
fn test_only_one_terminal_signal_is_delivered() {
    let observer = Stream::create(|emitter| {
        emitter.next(1);
        emitter.error(StreamError::custom("first"));
        emitter.complete();
        emitter.next(2);
        emitter.error(StreamError::custom("second"));
    })
    .test();

    assert_eq!(
        observer.signals(),
        vec![Signal::Next(1), Signal::Error(StreamError::custom("first"))]
    );
    assert_eq!(observer.terminal_count(), 1);
}

#[test]
fn test_producer_panic_becomes_user_function_error() {
    let result = Stream::<i32>::create(|emitter| {
        emitter.next(1);
        panic!("producer exploded");
    })
    .blocking_collect();
    assert_eq!(result, Err(StreamError::UserFunction("producer exploded".to_string())));
}

#[test]
fn test_no_consumer_calls_after_cancel_returns() {
    let late_calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..500 {
        let calls = Arc::new(AtomicUsize::new(0));
        let returned = Arc::new(AtomicBool::new(false));

        let producer = Stream::create(|emitter: Emitter<u64>| {
            thread::spawn(move || {
                let mut n = 0;
                while !emitter.is_cancelled() {
                    emitter.next(n);
                    n += 1;
                }
            });
        });

        let counter = Arc::clone(&calls);
        let cancelled = Arc::clone(&returned);
        let late = Arc::clone(&late_calls);
        let subscription = producer.map(|n| n * 2).subscribe_signals(move |_signal| {
            if cancelled.load(Ordering::SeqCst) {
                late.fetch_add(1, Ordering::SeqCst);
            }
            counter.fetch_add(1, Ordering::SeqCst);
        });

        while calls.load(Ordering::SeqCst) < 3 {
            thread::yield_now();
        }
        subscription.cancel();
        returned.store(true, Ordering::SeqCst);
    }

    thread::sleep(Duration::from_millis(20));
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_map_filter_scan() {
    let result = range(1, 6)
        .map(|n| n * 10)
        .filter(|n| n % 20 != 0)
        .scan(0, |acc, n| acc + n)
        .blocking_collect()
        .unwrap();
    assert_eq!(result, vec![10, 40, 90]);
}

#[test]
fn test_reduce_fold_collect_count() {
    assert_eq!(range(1, 4).reduce(|a, b| a + b).blocking_collect().unwrap(), vec![10]);
    assert_eq!(empty::<i64>().reduce(|a, b| a + b).blocking_collect().unwrap(), Vec::<i64>::new());
    assert_eq!(
        of(vec!["x", "y"]).fold(String::new(), |acc, s| acc + s).blocking_collect().unwrap(),
        vec!["xy".to_string()]
    );
    assert_eq!(range(0, 3).collect().blocking_collect().unwrap(), vec![vec![0, 1, 2]]);
    assert_eq!(range(0, 7).count().blocking_collect().unwrap(), vec![7]);
}

#[test]
fn test_failing_user_function_cancels_upstream() {
    let emitted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&emitted);
    let source = Stream::create(move |emitter| {
        for n in 0..10 {
            if emitter.is_cancelled() {
                return;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            emitter.next(n);
        }
        emitter.complete();
    });

    let result = source
        .try_map(|n: i32| if n == 2 { Err("two is not allowed") } else { Ok(n) })
        .blocking_collect();

    assert_eq!(result, Err(StreamError::UserFunction("two is not allowed".to_string())));
    assert_eq!(emitted.load(Ordering::SeqCst), 3);
}

#[test]
fn test_take_and_skip() {
    assert_eq!(range(0, 100).skip(3).take(2).blocking_collect().unwrap(), vec![3, 4]);
    assert_eq!(never::<i32>().take(0).blocking_collect().unwrap(), Vec::<i32>::new());
}

#[test]
fn test_defer_builds_per_subscription() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let stream = defer(move || just(counter.fetch_add(1, Ordering::SeqCst)));

    assert_eq!(stream.blocking_collect().unwrap(), vec![0]);
    assert_eq!(stream.blocking_collect().unwrap(), vec![1]);
}

#[test]
fn test_error_and_empty_constructors() {
    assert_eq!(
        error::<i32>(StreamError::IO("disk".to_string())).blocking_collect(),
        Err(StreamError::IO("disk".to_string()))
    );
    let observer = empty::<i32>().test();
    assert!(observer.is_completed());
    assert!(observer.values().is_empty());
}

#[test]
fn test_do_on_signal_sees_everything() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let result = of(vec![1, 2])
        .do_on_signal(move |signal| sink.lock().unwrap().push(signal.clone()))
        .log_signals("numbers")
        .blocking_collect()
        .unwrap();

    assert_eq!(result, vec![1, 2]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Signal::Next(1), Signal::Next(2), Signal::Complete]
    );
}

#[test]
fn test_blocking_collect_timeout_gives_up() {
    let result = never::<i32>().blocking_collect_timeout(Duration::from_millis(30));
    assert_eq!(result, Err(StreamError::Timeout));
}
