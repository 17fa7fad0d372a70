//! Observing a value that is assigned from several threads.

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;

use fanout::{Observable, Owner};

fn main() {
    let temperature = Arc::new(Observable::new(20_i32));
    let display = Owner::new();

    temperature.bind(&display, |change| {
        let trend = match change.new.cmp(&change.old) {
            Ordering::Greater => "rising",
            Ordering::Less => "falling",
            Ordering::Equal => "steady",
        };

        println!("{} -> {} ({trend})", change.old, change.new);
    });

    let sensors: Vec<_> = [18, 22, 22, 25]
        .into_iter()
        .map(|reading| {
            let temperature = Arc::clone(&temperature);
            thread::spawn(move || temperature.set_value(reading))
        })
        .collect();

    for sensor in sensors {
        sensor.join().expect("sensor thread does not panic");
    }

    println!(
        "Final temperature {} after {} assignments",
        temperature.value(),
        temperature.triggers_count()
    );

    temperature.unbind(&display);
    temperature.set_value(0);

    println!("Observers left: {}", temperature.observers_count());
}
