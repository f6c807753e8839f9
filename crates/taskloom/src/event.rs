//! Signalable events and multi-object waits
//!
//! An [`Event`] is either manual-reset (stays signaled until `reset`) or
//! auto-reset (a successful wait consumes the signal). [`wait_any`] blocks
//! until one of several events is signaled or a timeout elapses; when more
//! than one is signaled, the lowest index wins.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a wait on one or more events
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    /// The event at this index was signaled (and consumed, if auto-reset)
    Signaled(usize),
    /// The timeout elapsed first
    TimedOut,
}

/// A blocked `wait_any` caller
struct Waiter {
    notified: Mutex<bool>,
    cond: Condvar,
}

impl Waiter {
    fn new() -> Self {
        Self {
            notified: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn notify(&self) {
        *self.notified.lock() = true;
        self.cond.notify_one();
    }

    /// Block until notified or the deadline passes. Returns false on timeout.
    fn park(&self, deadline: Option<Instant>) -> bool {
        let mut notified = self.notified.lock();
        while !*notified {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut notified, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut notified),
            }
        }
        std::mem::replace(&mut *notified, false)
    }
}

struct EventState {
    signaled: bool,
    waiters: Vec<Arc<Waiter>>,
}

/// Signalable synchronization object
pub struct Event {
    state: Mutex<EventState>,
    manual_reset: bool,
}

impl Event {
    fn with_mode(manual_reset: bool, signaled: bool) -> Self {
        Self {
            state: Mutex::new(EventState {
                signaled,
                waiters: Vec::new(),
            }),
            manual_reset,
        }
    }

    /// Create an unsignaled auto-reset event
    pub fn new_auto() -> Self {
        Self::with_mode(false, false)
    }

    /// Create an unsignaled manual-reset event
    pub fn new_manual() -> Self {
        Self::with_mode(true, false)
    }

    /// Signal the event, waking every waiter subscribed to it
    pub fn set(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.signaled = true;
            state.waiters.clone()
        };
        for waiter in waiters {
            waiter.notify();
        }
    }

    /// Return the event to the unsignaled state
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    /// Check the signaled state without consuming it
    pub fn is_set(&self) -> bool {
        self.state.lock().signaled
    }

    /// Whether this is a manual-reset event
    pub fn is_manual_reset(&self) -> bool {
        self.manual_reset
    }

    /// Wait for this event alone. Returns false on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        wait_any(&[self], timeout) == WaitStatus::Signaled(0)
    }

    /// Consume the signal if present
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.signaled {
            if !self.manual_reset {
                state.signaled = false;
            }
            true
        } else {
            false
        }
    }

    fn subscribe(&self, waiter: &Arc<Waiter>) {
        self.state.lock().waiters.push(Arc::clone(waiter));
    }

    fn unsubscribe(&self, waiter: &Arc<Waiter>) {
        self.state
            .lock()
            .waiters
            .retain(|w| !Arc::ptr_eq(w, waiter));
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("signaled", &self.is_set())
            .field("manual_reset", &self.manual_reset)
            .finish()
    }
}

/// Block until one of `events` is signaled or `timeout` elapses
///
/// `None` waits forever, as does a timeout too large to form a deadline.
/// An empty slice returns `TimedOut` immediately.
pub fn wait_any(events: &[&Event], timeout: Option<Duration>) -> WaitStatus {
    if events.is_empty() {
        return WaitStatus::TimedOut;
    }

    let waiter = Arc::new(Waiter::new());
    for event in events {
        event.subscribe(&waiter);
    }

    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let status = loop {
        if let Some(index) = events.iter().position(|e| e.try_acquire()) {
            break WaitStatus::Signaled(index);
        }
        if !waiter.park(deadline) {
            // Last look: a signal may have landed right at the deadline
            break events
                .iter()
                .position(|e| e.try_acquire())
                .map_or(WaitStatus::TimedOut, WaitStatus::Signaled);
        }
    };

    for event in events {
        event.unsubscribe(&waiter);
    }
    status
}
