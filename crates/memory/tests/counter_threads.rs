//! Concurrency tests for the synchronized counter: no lost updates, reads
//! bounded by the number of increments, and poisoning surfaced as an error.

use std::thread;

use crucible_memory::{MemoryError, SharedCounter};

fn run_workers(n: usize) -> u64 {
    let counter = SharedCounter::new();

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || counter.increment().unwrap())
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    counter.read().unwrap()
}

#[test]
fn one_worker_one_increment() {
    assert_eq!(run_workers(1), 1);
}

#[test]
fn ten_workers_no_lost_updates() {
    for _ in 0..10 {
        assert_eq!(run_workers(10), 10);
    }
}

#[test]
fn thousand_workers_no_lost_updates() {
    assert_eq!(run_workers(1000), 1000);
}

#[test]
fn reads_never_leave_the_increment_bounds() {
    const WORKERS: usize = 8;
    const PER_WORKER: u64 = 250;
    const TOTAL: u64 = WORKERS as u64 * PER_WORKER;

    let counter = SharedCounter::new();

    let incrementers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..PER_WORKER {
                    counter.increment().unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let counter = counter.clone();
        thread::spawn(move || {
            loop {
                let value = counter.read().unwrap();
                assert!(value <= TOTAL, "read {value} beyond {TOTAL} increments");
                if value == TOTAL {
                    break;
                }
                thread::yield_now();
            }
        })
    };

    for handle in incrementers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(counter.read().unwrap(), TOTAL);
}

#[test]
fn increments_serialize_into_distinct_values() {
    let counter = SharedCounter::new();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(64);
                for _ in 0..64 {
                    seen.push(counter.increment().unwrap());
                }
                seen
            })
        })
        .collect();

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    // Every increment observed a unique post-value: nothing was lost
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 16 * 64);
    assert_eq!(all.last().copied(), Some(16 * 64));
}

#[test]
fn abnormal_holder_poisons_the_guard() {
    let counter = SharedCounter::new();
    counter.increment().unwrap();

    let poisoner = counter.clone();
    let died = thread::spawn(move || {
        let _ = poisoner.with(|value| {
            *value += 1;
            panic!("holder terminated abnormally while holding the guard");
        });
    })
    .join();
    assert!(died.is_err());

    // Surfaced on the next access, not swallowed
    assert!(matches!(
        counter.increment(),
        Err(MemoryError::LockPoisoned { .. })
    ));
    assert!(matches!(
        counter.read(),
        Err(MemoryError::LockPoisoned { .. })
    ));
}
