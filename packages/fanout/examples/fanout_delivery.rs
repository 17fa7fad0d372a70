//! Immediate, queued and delayed delivery on one event.
//!
//! Library log output is printed at `trace` level to show how deliveries are scheduled.

use std::thread;
use std::time::Duration;

use fanout::{Delivery, Event, Owner, SubscribeOptions, WorkerQueue};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_thread_names(true)
        .init();

    let queue = WorkerQueue::new("deliveries");
    let event = Event::<&'static str>::builder().name("greetings").build();
    let owner = Owner::new();

    event.subscribe(&owner, |message| {
        println!("[{}] immediate: {message}", current_thread());
    });

    event.subscribe_with(
        &owner,
        SubscribeOptions::new().delivery(Delivery::queued(queue.clone())),
        |message| println!("[{}] queued: {message}", current_thread()),
    );

    event.subscribe_with(
        &owner,
        SubscribeOptions::new().delivery(Delivery::delayed_on(
            queue.clone(),
            Duration::from_millis(100),
        )),
        |message| println!("[{}] delayed: {message}", current_thread()),
    );

    event.trigger("hello");

    // Wait for the queued handler, then long enough for the delayed one.
    queue.flush();
    thread::sleep(Duration::from_millis(200));
    queue.flush();

    println!("Handler calls: {}", event.handled_count());
}

fn current_thread() -> String {
    thread::current().name().unwrap_or("unnamed").to_owned()
}
