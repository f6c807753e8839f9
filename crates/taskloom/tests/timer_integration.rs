//! Integration tests for timer queues

use crossbeam::channel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskloom::{
    Completion, Error, Event, ExecuteFlags, LegacyConfig, LegacyQueue, MonotonicClock, Teardown,
    TimerConfig, TimerQueue,
};

fn queue() -> TimerQueue {
    TimerQueue::with_parts(
        TimerConfig::default(),
        LegacyQueue::new(LegacyConfig::default()),
        Arc::new(MonotonicClock::new()),
    )
    .unwrap()
}

#[test]
fn test_periodic_timer_fires_repeatedly() {
    let queue = queue();
    let start = Instant::now();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&stamps);

    let timer = queue
        .create_timer(
            move || recorded.lock().push(start.elapsed()),
            Duration::from_millis(10),
            Duration::from_millis(50),
            ExecuteFlags::DEFAULT,
        )
        .unwrap();

    thread::sleep(Duration::from_millis(170));
    queue.delete_timer(&timer, Completion::Wait).unwrap();

    let stamps = stamps.lock();
    assert!(stamps.len() >= 3, "expected at least 3 invocations, got {}", stamps.len());
    // Never earlier than the schedule
    assert!(stamps[0] >= Duration::from_millis(10));
    for pair in stamps.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(20) && gap <= Duration::from_millis(150),
            "invocations {:?} apart, expected about 50ms",
            gap
        );
    }
}

#[test]
fn test_timers_fire_in_expiry_order() {
    let queue = queue();
    let (tx, rx) = channel::unbounded();

    for (label, due) in [(3u32, 60u64), (1, 20), (2, 40)] {
        let tx = tx.clone();
        queue
            .create_timer(
                move || tx.send(label).unwrap(),
                Duration::from_millis(due),
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();
    }

    let order: Vec<u32> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_delete_timer_twice_is_rejected() {
    let queue = queue();
    let timer = queue
        .create_timer(|| {}, Duration::from_secs(60), Duration::ZERO, ExecuteFlags::DEFAULT)
        .unwrap();

    assert_eq!(queue.delete_timer(&timer, Completion::Wait).unwrap(), Teardown::Complete);
    assert!(matches!(
        queue.delete_timer(&timer, Completion::Wait),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(queue.timer_count(), 0);
}

#[test]
fn test_no_callback_after_waited_delete() {
    let queue = queue();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let timer = queue
        .create_timer(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::ZERO,
            Duration::from_millis(5),
            ExecuteFlags::DEFAULT,
        )
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    queue.delete_timer(&timer, Completion::Wait).unwrap();
    let seen = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), seen);
}

#[test]
fn test_delete_queue_with_signal() {
    let queue = queue();
    for due in [5u64, 10, 1000] {
        queue
            .create_timer(|| {}, Duration::from_millis(due), Duration::from_millis(5), ExecuteFlags::DEFAULT)
            .unwrap();
    }
    thread::sleep(Duration::from_millis(30));

    let done = Arc::new(Event::new_manual());
    queue.delete(Completion::Signal(Arc::clone(&done))).unwrap();
    assert!(done.wait(Some(Duration::from_secs(5))));
    assert!(matches!(queue.delete(Completion::Wait), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_global_timer_queue() {
    let (tx, rx) = channel::unbounded();
    let queue = TimerQueue::global().unwrap();
    let timer = queue
        .create_timer(
            move || tx.send(()).unwrap(),
            Duration::from_millis(5),
            Duration::ZERO,
            ExecuteFlags::DEFAULT,
        )
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    queue.delete_timer(&timer, Completion::Wait).unwrap();
}
