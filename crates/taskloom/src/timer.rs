//! Timer queues
//!
//! Each queue owns a sorted list of timers and one dispatcher thread that
//! sleeps until the head expires. Due timers are fired either inline on the
//! dispatcher (`EXECUTE_IN_TIMER_THREAD`) or through the legacy work queue,
//! and periodic timers are re-armed from their original schedule.
//!
//! A deleted timer whose callbacks are still in flight is parked at
//! `EXPIRE_NEVER` instead of being removed, so the list stays sorted and the
//! dispatcher never sleeps on it. The last finishing callback removes it.

use crate::clock::{Clock, MonotonicClock};
use crate::config::TimerConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::flags::ExecuteFlags;
use crate::legacy::LegacyQueue;
use crate::unwind::run_contained;
use crate::{Completion, Teardown};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Expiry of one-shot timers that already fired and of deleted timers
pub const EXPIRE_NEVER: u64 = u64::MAX;

/// Latest expiry a live timer can hold
const EXPIRE_LATEST: u64 = EXPIRE_NEVER - 1;

/// Timer callback
pub type TimerCallback = Arc<dyn Fn() + Send + Sync + 'static>;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Next expiry of a timer that just fired at `expiry`
///
/// Follows the original schedule; if that has already slipped behind `now`,
/// restarts the period from `now` instead of firing a burst of catch-ups.
pub fn next_expiry(expiry: u64, period: u64, now: u64) -> u64 {
    if period == 0 {
        return EXPIRE_NEVER;
    }
    let next = expiry.saturating_add(period);
    let next = if next < now {
        now.saturating_add(period)
    } else {
        next
    };
    next.min(EXPIRE_LATEST)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`
fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Expiry of a timer armed `due` after `now`, never `EXPIRE_NEVER`
fn arm_expiry(now: u64, due: Duration) -> u64 {
    now.saturating_add(duration_ms(due)).min(EXPIRE_LATEST)
}

struct TimerSlot {
    id: u64,
    callback: TimerCallback,
    flags: ExecuteFlags,
    period: u64,
    expiry: u64,
    runcount: usize,
    destroy: bool,
    removal: Option<Arc<Event>>,
}

struct QueueState {
    /// Sorted ascending by expiry; ties keep insertion order
    timers: Vec<TimerSlot>,
    quit: bool,
}

impl QueueState {
    fn position(&self, id: u64) -> Option<usize> {
        self.timers.iter().position(|t| t.id == id)
    }

    /// Insert in sorted order, returning the new index
    fn insert_sorted(&mut self, slot: TimerSlot) -> usize {
        let pos = self.timers.partition_point(|t| t.expiry <= slot.expiry);
        self.timers.insert(pos, slot);
        pos
    }

    fn move_timer(&mut self, pos: usize, expiry: u64) -> usize {
        let mut slot = self.timers.remove(pos);
        slot.expiry = expiry;
        self.insert_sorted(slot)
    }
}

struct ExitState {
    exited: bool,
    completion: Option<Arc<Event>>,
}

struct QueueInner {
    id: u64,
    state: Mutex<QueueState>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
    legacy: LegacyQueue,
    exit: Mutex<ExitState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl QueueInner {
    /// Physically remove the slot at `pos`. Caller drops the slot unlocked.
    fn remove_slot(&self, state: &mut QueueState, pos: usize) -> TimerSlot {
        let slot = state.timers.remove(pos);
        if let Some(event) = &slot.removal {
            event.set();
        }
        if state.quit && state.timers.is_empty() {
            self.wake.notify_all();
        }
        slot
    }

    /// One invocation of timer `id` finished
    fn complete_run(&self, state: &mut QueueState, id: u64) -> Option<TimerSlot> {
        let pos = state.position(id)?;
        let slot = &mut state.timers[pos];
        slot.runcount -= 1;
        if slot.destroy && slot.runcount == 0 {
            Some(self.remove_slot(state, pos))
        } else {
            None
        }
    }

    fn finish_run(&self, id: u64) {
        let removed = {
            let mut state = self.state.lock();
            self.complete_run(&mut state, id)
        };
        drop(removed);
    }

    /// Make the dispatcher re-read the clock
    #[cfg(test)]
    fn poke(&self) {
        let _state = self.state.lock();
        self.wake.notify_all();
    }

    /// Dispatcher thread main loop
    fn run_loop(self: Arc<Self>) {
        tracing::debug!(queue = self.id, "timer dispatcher started");
        let mut state = self.state.lock();
        loop {
            if state.quit && state.timers.is_empty() {
                break;
            }

            let now = self.clock.now_ms();
            match state.timers.first().map(|t| t.expiry) {
                Some(expiry) if expiry != EXPIRE_NEVER && expiry <= now => {
                    self.fire_head(&mut state, now);
                }
                Some(expiry) if expiry != EXPIRE_NEVER => {
                    // Wakes early when a new head is inserted
                    self.wake
                        .wait_for(&mut state, Duration::from_millis(expiry - now));
                }
                _ => self.wake.wait(&mut state),
            }
        }
        drop(state);

        let completion = {
            let mut exit = self.exit.lock();
            exit.exited = true;
            exit.completion.take()
        };
        if let Some(event) = completion {
            event.set();
        }
        tracing::debug!(queue = self.id, "timer dispatcher exiting");
    }

    fn fire_head(self: &Arc<Self>, state: &mut MutexGuard<'_, QueueState>, now: u64) {
        let next = {
            let head = &mut state.timers[0];
            head.runcount += 1;
            next_expiry(head.expiry, head.period, now)
        };
        let pos = state.move_timer(0, next);
        let (id, callback, flags) = {
            let fired = &state.timers[pos];
            (fired.id, Arc::clone(&fired.callback), fired.flags)
        };

        tracing::trace!(queue = self.id, timer = id, "timer fired");

        if flags.contains(ExecuteFlags::EXECUTE_IN_TIMER_THREAD) {
            MutexGuard::unlocked(state, || run_contained("timer callback", || callback()));
            let removed = self.complete_run(state, id);
            MutexGuard::unlocked(state, move || drop(removed));
            return;
        }

        let queue = Arc::clone(self);
        let legacy = self.legacy.clone();
        let submitted = MutexGuard::unlocked(state, move || {
            legacy.submit(
                move || {
                    run_contained("timer callback", || callback());
                    queue.finish_run(id);
                },
                flags,
            )
        });
        if let Err(err) = submitted {
            tracing::warn!(queue = self.id, timer = id, error = %err, "timer dispatch failed");
            let removed = self.complete_run(state, id);
            MutexGuard::unlocked(state, move || drop(removed));
        }
    }
}

/// Identifies one timer inside one queue
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    queue_id: u64,
    id: u64,
}

impl TimerHandle {
    /// Timer id, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A timer queue and its dispatcher thread
///
/// Dropping the queue deletes it without waiting.
pub struct TimerQueue {
    inner: Arc<QueueInner>,
}

static GLOBAL: OnceCell<TimerQueue> = OnceCell::new();

impl TimerQueue {
    /// Create a queue dispatching through the process-wide legacy queue
    pub fn new() -> Result<Self> {
        Self::with_parts(
            TimerConfig::default(),
            LegacyQueue::global().clone(),
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Create a queue from explicit collaborators
    pub fn with_parts(
        config: TimerConfig,
        legacy: LegacyQueue,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let inner = Arc::new(QueueInner {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(QueueState {
                timers: Vec::new(),
                quit: false,
            }),
            wake: Condvar::new(),
            clock,
            legacy,
            exit: Mutex::new(ExitState {
                exited: false,
                completion: None,
            }),
            dispatcher: Mutex::new(None),
        });

        let dispatcher = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || dispatcher.run_loop())?;
        *inner.dispatcher.lock() = Some(handle);

        Ok(Self { inner })
    }

    /// Process-wide default queue, created on first use
    pub fn global() -> Result<&'static TimerQueue> {
        GLOBAL.get_or_try_init(TimerQueue::new)
    }

    /// Queue id, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of timers still in the queue (including deleted ones in flight)
    pub fn timer_count(&self) -> usize {
        self.inner.state.lock().timers.len()
    }

    fn check_owner(&self, timer: &TimerHandle) -> Result<()> {
        if timer.queue_id == self.inner.id {
            Ok(())
        } else {
            Err(Error::invalid("timer belongs to another queue"))
        }
    }

    /// Fire `callback` after `due`, then every `period` (zero = one-shot)
    pub fn create_timer<F>(
        &self,
        callback: F,
        due: Duration,
        period: Duration,
        flags: ExecuteFlags,
    ) -> Result<TimerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock();
        if state.quit {
            return Err(Error::invalid("timer queue is being deleted"));
        }

        let pos = state.insert_sorted(TimerSlot {
            id,
            callback: Arc::new(callback),
            flags,
            period: duration_ms(period),
            expiry: arm_expiry(now, due),
            runcount: 0,
            destroy: false,
            removal: None,
        });
        if pos == 0 {
            self.inner.wake.notify_one();
        }

        Ok(TimerHandle {
            queue_id: self.inner.id,
            id,
        })
    }

    /// Re-arm a timer with a new due time and period
    ///
    /// A one-shot timer that already fired stays expired.
    pub fn update_timer(&self, timer: &TimerHandle, due: Duration, period: Duration) -> Result<()> {
        self.check_owner(timer)?;
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock();
        let pos = state
            .position(timer.id)
            .ok_or_else(|| Error::invalid("unknown timer"))?;
        if state.timers[pos].destroy {
            return Err(Error::invalid("timer already deleted"));
        }
        if state.timers[pos].expiry == EXPIRE_NEVER {
            return Ok(());
        }

        state.timers[pos].period = duration_ms(period);
        let new_pos = state.move_timer(pos, arm_expiry(now, due));
        if new_pos == 0 {
            self.inner.wake.notify_one();
        }
        Ok(())
    }

    /// Delete a timer
    ///
    /// Returns `Pending` if callbacks are still in flight and `completion`
    /// does not wait for them. A second call returns `InvalidArgument`.
    pub fn delete_timer(&self, timer: &TimerHandle, completion: Completion) -> Result<Teardown> {
        self.check_owner(timer)?;

        let mut private = None;
        let (status, removed) = {
            let mut state = self.inner.state.lock();
            let pos = state
                .position(timer.id)
                .ok_or_else(|| Error::invalid("unknown timer"))?;
            if state.timers[pos].destroy {
                return Err(Error::invalid("timer already deleted"));
            }
            state.timers[pos].destroy = true;

            if state.timers[pos].runcount == 0 {
                if let Completion::Signal(event) = &completion {
                    event.set();
                }
                let removed = self.inner.remove_slot(&mut state, pos);
                (Teardown::Complete, Some(removed))
            } else {
                state.timers[pos].removal = match completion {
                    Completion::NoWait => None,
                    Completion::Signal(event) => Some(event),
                    Completion::Wait => {
                        let event = Arc::new(Event::new_manual());
                        private = Some(Arc::clone(&event));
                        Some(event)
                    }
                };
                if state.move_timer(pos, EXPIRE_NEVER) != pos {
                    self.inner.wake.notify_one();
                }
                (Teardown::Pending, None)
            }
        };
        drop(removed);

        if let Some(event) = private {
            event.wait(None);
            return Ok(Teardown::Complete);
        }
        Ok(status)
    }

    /// Delete the queue and every timer in it
    ///
    /// `Wait` blocks until the dispatcher has exited. A second call returns
    /// `InvalidArgument`.
    pub fn delete(&self, completion: Completion) -> Result<Teardown> {
        let removed = {
            let mut state = self.inner.state.lock();
            if state.quit {
                return Err(Error::invalid("timer queue already deleted"));
            }
            state.quit = true;

            let mut removed = Vec::new();
            let mut in_flight = Vec::new();
            for mut slot in state.timers.drain(..) {
                if slot.destroy {
                    in_flight.push(slot);
                } else if slot.runcount == 0 {
                    removed.push(slot);
                } else {
                    slot.destroy = true;
                    slot.expiry = EXPIRE_NEVER;
                    in_flight.push(slot);
                }
            }
            state.timers = in_flight;
            self.inner.wake.notify_all();
            removed
        };
        drop(removed);
        tracing::debug!(queue = self.inner.id, "timer queue deleted");

        match completion {
            Completion::Wait => {
                let handle = self.inner.dispatcher.lock().take();
                match handle {
                    Some(handle) if handle.thread().id() != thread::current().id() => {
                        let _ = handle.join();
                        Ok(Teardown::Complete)
                    }
                    _ => Ok(Teardown::Pending),
                }
            }
            Completion::Signal(event) => {
                let mut exit = self.inner.exit.lock();
                if exit.exited {
                    event.set();
                } else {
                    exit.completion = Some(event);
                }
                Ok(Teardown::Pending)
            }
            Completion::NoWait => Ok(Teardown::Pending),
        }
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        let _ = self.delete(Completion::NoWait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LegacyConfig;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    fn queue() -> TimerQueue {
        TimerQueue::with_parts(
            TimerConfig::default(),
            LegacyQueue::new(LegacyConfig::default()),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_next_expiry() {
        assert_eq!(next_expiry(100, 0, 100), EXPIRE_NEVER);
        assert_eq!(next_expiry(100, 50, 110), 150);
        // Slipped: restart from now
        assert_eq!(next_expiry(100, 50, 400), 450);
        // Never collides with the expired marker
        assert_eq!(next_expiry(u64::MAX - 1, 50, 0), EXPIRE_NEVER - 1);
    }

    #[test]
    fn test_panicking_callback_still_completes_run() {
        let queue = queue();
        let timer = queue
            .create_timer(
                || panic!("timer callback failure"),
                Duration::ZERO,
                Duration::from_millis(5),
                ExecuteFlags::DEFAULT,
            )
            .unwrap();
        thread::sleep(Duration::from_millis(40));

        let removed = Arc::new(Event::new_manual());
        queue
            .delete_timer(&timer, Completion::Signal(Arc::clone(&removed)))
            .unwrap();
        assert!(removed.wait(Some(Duration::from_secs(5))));
        assert_eq!(queue.timer_count(), 0);
    }

    #[test]
    fn test_panicking_inline_callback_keeps_dispatcher() {
        let queue = queue();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        queue
            .create_timer(
                || panic!("inline callback failure"),
                Duration::ZERO,
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();
        queue
            .create_timer(
                move || tx.lock().send(()).unwrap(),
                Duration::from_millis(20),
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(queue.delete(Completion::Wait).unwrap(), Teardown::Complete);
    }

    #[test]
    fn test_huge_durations_saturate() {
        assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_ms(Duration::from_secs(u64::MAX / 1000 + 1)), u64::MAX);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
        assert_eq!(arm_expiry(10, Duration::from_millis(5)), 15);
        assert_eq!(arm_expiry(10, Duration::MAX), EXPIRE_NEVER - 1);
    }

    #[test]
    fn test_far_future_timers_stay_live() {
        let queue = queue();
        let count = Arc::new(AtomicUsize::new(0));

        let far = Arc::clone(&count);
        queue
            .create_timer(
                move || {
                    far.fetch_add(100, Ordering::SeqCst);
                },
                Duration::from_secs(u64::MAX / 1000 + 1),
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();

        let rearmed = Arc::clone(&count);
        let timer = queue
            .create_timer(
                move || {
                    rearmed.fetch_add(1, Ordering::SeqCst);
                },
                Duration::MAX,
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();
        queue
            .update_timer(&timer, Duration::from_millis(10), Duration::ZERO)
            .unwrap();

        let start = Instant::now();
        while count.load(Ordering::SeqCst) == 0 && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sorted_insert_keeps_fifo_ties() {
        let mut state = QueueState {
            timers: Vec::new(),
            quit: false,
        };
        let slot = |id, expiry| TimerSlot {
            id,
            callback: Arc::new(|| {}),
            flags: ExecuteFlags::DEFAULT,
            period: 0,
            expiry,
            runcount: 0,
            destroy: false,
            removal: None,
        };
        assert_eq!(state.insert_sorted(slot(1, 50)), 0);
        assert_eq!(state.insert_sorted(slot(2, 10)), 0);
        assert_eq!(state.insert_sorted(slot(3, 50)), 2);
        assert_eq!(state.insert_sorted(slot(4, EXPIRE_NEVER)), 3);
        let ids: Vec<_> = state.timers.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_one_shot_fires_once_and_handle_stays_valid() {
        let queue = queue();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let timer = queue
            .create_timer(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(100),
                Duration::ZERO,
                ExecuteFlags::DEFAULT,
            )
            .unwrap();

        thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(queue.timer_count(), 1);

        // Expired one-shot: update is a no-op
        queue
            .update_timer(&timer, Duration::ZERO, Duration::ZERO)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(
            queue.delete_timer(&timer, Completion::Wait).unwrap(),
            Teardown::Complete
        );
        assert!(matches!(
            queue.delete_timer(&timer, Completion::Wait),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(queue.timer_count(), 0);
    }

    #[test]
    fn test_inline_timer_runs_on_dispatcher() {
        let queue = TimerQueue::with_parts(
            TimerConfig::new().with_thread_name("inline-dispatch"),
            LegacyQueue::new(LegacyConfig::default()),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let timer = queue
            .create_timer(
                move || {
                    let name = thread::current().name().map(str::to_string);
                    let _ = tx.lock().send(name);
                },
                Duration::from_millis(10),
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("inline-dispatch"));
        queue.delete_timer(&timer, Completion::NoWait).unwrap();
    }

    #[test]
    fn test_update_moves_timer_earlier() {
        let queue = queue();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let timer = queue
            .create_timer(
                move || {
                    let _ = tx.lock().send(Instant::now());
                },
                Duration::from_secs(60),
                Duration::ZERO,
                ExecuteFlags::DEFAULT,
            )
            .unwrap();

        queue
            .update_timer(&timer, Duration::from_millis(20), Duration::ZERO)
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        queue.delete_timer(&timer, Completion::Wait).unwrap();
    }

    #[test]
    fn test_delete_running_timer_signals_after_callback() {
        let queue = queue();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);

        let timer = queue
            .create_timer(
                move || {
                    let _ = entered_tx.lock().send(());
                    let _ = release_rx.lock().recv();
                },
                Duration::ZERO,
                Duration::ZERO,
                ExecuteFlags::DEFAULT,
            )
            .unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let done = Arc::new(Event::new_manual());
        let status = queue
            .delete_timer(&timer, Completion::Signal(Arc::clone(&done)))
            .unwrap();
        assert_eq!(status, Teardown::Pending);
        assert_eq!(queue.timer_count(), 1);
        assert!(!done.is_set());

        release_tx.send(()).unwrap();
        assert!(done.wait(Some(Duration::from_secs(5))));
        assert_eq!(queue.timer_count(), 0);
    }

    #[test]
    fn test_delete_queue_waits_for_dispatcher() {
        let queue = queue();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        queue
            .create_timer(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                Duration::ZERO,
                Duration::from_millis(10),
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(queue.delete(Completion::Wait).unwrap(), Teardown::Complete);
        assert_eq!(queue.timer_count(), 0);
        assert!(queue.inner.exit.lock().exited);

        let fired = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), fired);

        assert!(matches!(
            queue.delete(Completion::Wait),
            Err(Error::InvalidArgument(_))
        ));
        assert!(queue
            .create_timer(|| {}, Duration::ZERO, Duration::ZERO, ExecuteFlags::DEFAULT)
            .is_err());
    }

    #[test]
    fn test_empty_queue_signals_deletion() {
        let queue = queue();
        let done = Arc::new(Event::new_manual());
        assert_eq!(
            queue.delete(Completion::Signal(Arc::clone(&done))).unwrap(),
            Teardown::Pending
        );
        assert!(done.wait(Some(Duration::from_secs(5))));
    }

    #[test]
    fn test_timer_from_other_queue_rejected() {
        let a = queue();
        let b = queue();
        let timer = a
            .create_timer(|| {}, Duration::from_secs(60), Duration::ZERO, ExecuteFlags::DEFAULT)
            .unwrap();
        assert!(matches!(
            b.delete_timer(&timer, Completion::NoWait),
            Err(Error::InvalidArgument(_))
        ));
        a.delete_timer(&timer, Completion::NoWait).unwrap();
    }

    #[test]
    fn test_manual_clock_drives_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = TimerQueue::with_parts(
            TimerConfig::default(),
            LegacyQueue::new(LegacyConfig::default()),
            clock.clone(),
        )
        .unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        queue
            .create_timer(
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(1_000),
                Duration::ZERO,
                ExecuteFlags::EXECUTE_IN_TIMER_THREAD,
            )
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance(1_000);
        queue.inner.poke();

        let start = Instant::now();
        while count.load(Ordering::SeqCst) == 0 && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
