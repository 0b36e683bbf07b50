use rs2_rx::*;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn thread_name() -> String {
    thread::current().name().unwrap_or("unnamed").to_string()
}

#[test]
fn test_subscribe_on_moves_the_producer() {
    let scheduler = worker_pool(2).unwrap();
    let producer_thread = Arc::new(Mutex::new(String::new()));
    let seen = Arc::clone(&producer_thread);

    let result = Stream::create(move |emitter| {
        *seen.lock().unwrap() = thread_name();
        emitter.next(1);
        emitter.complete();
    })
    .subscribe_on(scheduler)
    .blocking_collect_timeout(Duration::from_secs(1))
    .unwrap();

    assert_eq!(result, vec![1]);
    assert_eq!(*producer_thread.lock().unwrap(), "rs2-rx-worker");
}

#[test]
fn test_observe_on_preserves_order_on_another_thread() {
    let scheduler = single_thread("observer").unwrap();
    let consumer_threads = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&consumer_threads);

    let result = range(0, 1000)
        .observe_on(scheduler)
        .do_on_signal(move |_| seen.lock().unwrap().push(thread_name()))
        .blocking_collect_timeout(Duration::from_secs(2))
        .unwrap();

    assert_eq!(result, (0..1000).collect::<Vec<i64>>());
    let threads = consumer_threads.lock().unwrap();
    assert!(threads.iter().all(|name| name == "rs2-rx-observer"));
}

#[test]
#[serial]
fn test_interval_with_take() {
    let start = Instant::now();
    let result = interval(Duration::from_millis(10), worker_pool(1).unwrap())
        .take(4)
        .blocking_collect_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(result, vec![0, 1, 2, 3]);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
#[serial]
fn test_timer_on_immediate_scheduler() {
    let start = Instant::now();
    let result = timer(Duration::from_millis(30), immediate())
        .blocking_collect_timeout(Duration::from_secs(1))
        .unwrap();
    assert_eq!(result, vec![0]);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
#[serial]
fn test_delay_shifts_items_and_keeps_order() {
    let scheduler = worker_pool(4).unwrap();
    let start = Instant::now();
    let result = range(0, 20)
        .delay(Duration::from_millis(30), scheduler)
        .blocking_collect_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(result, (0..20).collect::<Vec<i64>>());
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_delay_does_not_hold_back_errors() {
    let scheduler = worker_pool(1).unwrap();
    let observer = of(vec![1, 2])
        .concat_with(&error(StreamError::custom("late")))
        .delay(Duration::from_millis(200), scheduler)
        .test();

    assert!(observer.await_terminal(Duration::from_millis(100)));
    assert_eq!(observer.signals(), vec![Signal::Error(StreamError::custom("late"))]);
}

#[test]
fn test_cancel_stops_scheduled_work() {
    let scheduler = worker_pool(1).unwrap();
    let observer = timer(Duration::from_millis(30), scheduler).test();
    observer.cancel();
    thread::sleep(Duration::from_millis(80));
    assert!(observer.signals().is_empty());
}

#[test]
fn test_scheduler_from_config_and_handle() {
    let config = RxConfig::new().worker_threads(2);
    let scheduler = TokioScheduler::from_config(&config).unwrap();
    assert_eq!(scheduler.name(), "worker-pool-2");

    let borrowed = TokioScheduler::from_handle(scheduler.handle().clone());
    let result = just("hello")
        .subscribe_on(Arc::new(borrowed))
        .blocking_collect_timeout(Duration::from_secs(1))
        .unwrap();
    assert_eq!(result, vec!["hello"]);
}
