use rs2_rx::*;
use std::thread;
use std::time::Duration;

/// Simulated remote call emitting one event per character of `color`, spaced out
/// on its own thread
fn simulate_remote_operation(color: &'static str) -> Stream<String> {
    Stream::create(move |emitter: Emitter<String>| {
        thread::spawn(move || {
            for i in 0..color.len() {
                if emitter.is_cancelled() {
                    return;
                }
                emitter.next(format!("{}{}", color, i));
                thread::sleep(Duration::from_millis(50));
            }
            emitter.complete();
        });
    })
}

/// Subscribe, log every signal and block until the stream terminates
fn subscribe_with_log<T>(title: &str, stream: Stream<T>)
where
    T: Clone + Send + std::fmt::Debug + 'static,
{
    println!("\n📊 {}", title);
    let observer = stream
        .do_on_signal(|signal| match signal {
            Signal::Next(value) => println!("  next: {:?} on {:?}", value, thread::current().id()),
            Signal::Error(error) => println!("  error: {}", error),
            Signal::Complete => println!("  complete"),
        })
        .test();
    if !observer.await_terminal(Duration::from_secs(10)) {
        println!("  ⚠️ gave up waiting");
    }
}

fn main() {
    println!("🚀 flat_map, concat_map and group_by walkthrough");

    // Inner streams run concurrently; their events interleave
    subscribe_with_log(
        "flat_map: one remote call per color",
        of(vec!["orange", "red", "green"]).flat_map(simulate_remote_operation),
    );

    // Operators work on every inner stream on its own
    subscribe_with_log(
        "flat_map with per-substream count",
        of(vec!["orange", "red", "green", "blue"]).flat_map(|color| {
            simulate_remote_operation(color)
                .count()
                .map(move |count| (color, count))
        }),
    );

    // With one slot, the next remote call starts when the previous completes
    subscribe_with_log(
        "flat_map with concurrency 1",
        of(vec!["orange", "red", "green"]).flat_map_with_concurrency(Some(1), simulate_remote_operation),
    );

    let io = match worker_pool(2) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("failed to start worker pool: {}", e);
            return;
        }
    };
    subscribe_with_log(
        "concat_map after subscribe_on",
        of(vec!["orange", "red", "green", "blue"])
            .subscribe_on(io)
            .concat_map(simulate_remote_operation),
    );

    // A stream of streams: count every color group
    subscribe_with_log(
        "group_by then flat_map to count each color",
        of(vec!["red", "green", "blue", "red", "yellow", "green", "green"])
            .group_by(|color| color.to_string())
            .flat_map(|group| {
                let key = group.key().clone();
                group.count().map(move |count| (key.clone(), count))
            }),
    );

    println!("\n✅ Done");
}
