use futures_util::stream::{self, StreamExt};
use rs2_rx::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

#[tokio::test]
async fn test_into_async_yields_items_in_order() {
    let items: Vec<i64> = range(0, 5)
        .map(|n| n * n)
        .into_async()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(items, vec![0, 1, 4, 9, 16]);
}

#[tokio::test]
async fn test_into_async_ends_with_the_error() {
    let items: Vec<StreamResult<i32>> = just(1)
        .concat_with(&error(StreamError::Timeout))
        .into_async()
        .collect()
        .await;
    assert_eq!(items, vec![Ok(1), Err(StreamError::Timeout)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_into_async_with_scheduled_source() {
    let ticks: Vec<u64> = interval(Duration::from_millis(5), worker_pool(1).unwrap())
        .take(3)
        .into_async()
        .filter_map(|item| async move { item.ok() })
        .collect()
        .await;
    assert_eq!(ticks, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_dropping_the_async_stream_cancels_the_subscription() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let source = Stream::create(move |emitter: Emitter<i32>| {
        emitter.next(1);
        let flag = Arc::clone(&flag);
        emitter.on_cancel(move || flag.store(true, Ordering::SeqCst));
    });

    let mut pulled = source.into_async();
    assert_eq!(pulled.next().await, Some(Ok(1)));
    assert!(!cancelled.load(Ordering::SeqCst));
    drop(pulled);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_from_async_drives_a_futures_stream() {
    let source = from_async(
        || stream::iter(vec![Ok::<i32, StreamError>(1), Ok(2), Ok(3)]),
        Handle::current(),
    );
    let items: Vec<StreamResult<i32>> = source.map(|n| n + 1).into_async().collect().await;
    assert_eq!(items, vec![Ok(2), Ok(3), Ok(4)]);
}

#[tokio::test]
async fn test_from_async_forwards_errors() {
    let source = from_async(
        || stream::iter(vec![Ok(1), Err(StreamError::IO("reset".to_string())), Ok(3)]),
        Handle::current(),
    );
    let items: Vec<StreamResult<i32>> = source.into_async().collect().await;
    assert_eq!(items, vec![Ok(1), Err(StreamError::IO("reset".to_string()))]);
}

#[test]
fn test_from_async_on_owned_runtime_with_blocking_collect() {
    let rt = Runtime::new().unwrap();
    let source = from_async(
        || {
            stream::iter(0..3).then(|n| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<i32, StreamError>(n)
            })
        },
        rt.handle().clone(),
    );

    let result = source.blocking_collect_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(result, vec![0, 1, 2]);
}
