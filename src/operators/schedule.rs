//! Scheduler injection points: subscribe_on and observe_on

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::emitter::Emitter;
use crate::scheduler::SchedulerRef;
use crate::signal::Signal;
use crate::stream::Stream;
use crate::sync::lock;

struct Handoff<T> {
    queue: VecDeque<Signal<T>>,
    scheduled: bool,
}

impl<T: Send + 'static> Stream<T> {
    /// Run the producer (the subscription side effects) on `scheduler`
    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Stream<T> {
        let source = self.clone();
        Stream::create(move |downstream: Emitter<T>| {
            let source = source.clone();
            let target = downstream.clone();
            let task = scheduler.schedule(Box::new(move || {
                if target.is_cancelled() {
                    return;
                }
                source.forward_into(target.subscription().child(), target.clone());
            }));
            downstream.subscription().add(task);
        })
    }

    /// Deliver every signal to the consumer on `scheduler`.
    ///
    /// Signals are queued and drained by at most one scheduled task at a time,
    /// so the consumer sees them in upstream order.
    pub fn observe_on(&self, scheduler: SchedulerRef) -> Stream<T> {
        self.lift(move |downstream: Emitter<T>| {
            let scheduler = Arc::clone(&scheduler);
            let handoff = Arc::new(Mutex::new(Handoff {
                queue: VecDeque::new(),
                scheduled: false,
            }));
            Box::new(move |signal: Signal<T>| {
                let start = {
                    let mut handoff = lock(&handoff);
                    handoff.queue.push_back(signal);
                    !std::mem::replace(&mut handoff.scheduled, true)
                };
                if !start {
                    return;
                }
                let handoff = Arc::clone(&handoff);
                let target = downstream.clone();
                let task = scheduler.schedule(Box::new(move || loop {
                    let next = {
                        let mut handoff = lock(&handoff);
                        if target.is_cancelled() {
                            handoff.queue.clear();
                        }
                        match handoff.queue.pop_front() {
                            Some(next) => next,
                            None => {
                                handoff.scheduled = false;
                                return;
                            }
                        }
                    };
                    target.signal(next);
                }));
                downstream.subscription().add(task);
            })
        })
    }
}
