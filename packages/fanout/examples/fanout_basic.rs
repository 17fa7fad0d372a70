//! Basic usage of a thread-safe event with owner-scoped subscriptions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fanout::{Event, Owner, SubscribeOptions};

/// Something that reacts to an event for as long as it exists.
struct Listener {
    name: &'static str,
    owner: Owner,
    received: Arc<AtomicU32>,
}

impl Listener {
    fn new(name: &'static str, event: &Event<u32>) -> Self {
        let owner = Owner::new();
        let received = Arc::new(AtomicU32::new(0));

        let received_clone = Arc::clone(&received);
        event.subscribe(&owner, move |value| {
            println!("{name} received {value}");
            received_clone.fetch_add(value, Ordering::Relaxed);
        });

        Self {
            name,
            owner,
            received,
        }
    }
}

fn main() {
    let event = Event::<u32>::builder().name("numbers").build();

    let first = Listener::new("first", &event);
    let second = Listener::new("second", &event);

    event.trigger(1);

    // The second listener goes away. Its subscription is not delivered to any more and is
    // cleaned up by the next trigger.
    println!("Dropping {} (owner {:?})", second.name, second.owner.id());
    drop(second);

    event.trigger(2);

    println!(
        "{} received a total of {}",
        first.name,
        first.received.load(Ordering::Relaxed)
    );
    println!("Subscribers left: {}", event.subscribers_count());

    // A one-time subscription only sees the next trigger.
    event.subscribe_with(&first.owner, SubscribeOptions::new().onetime(), |value| {
        println!("one-time handler received {value}");
    });

    event.trigger(3);
    event.trigger(4);

    // A scoped subscription lasts as long as its guard.
    {
        let _guard = event.subscribe_scoped(SubscribeOptions::new(), |value| {
            println!("scoped handler received {value}");
        });

        event.trigger(5);
    }

    event.trigger(6);

    println!(
        "Triggered {} times, {} handler calls in total",
        event.triggers_count(),
        event.handled_count()
    );
}
