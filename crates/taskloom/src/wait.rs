//! Wait registrations
//!
//! A registration turns "this event became signaled" into a callback. Each
//! registration runs a dedicated loop on the legacy work queue that waits on
//! the target event plus a private cancel event.
//!
//! Teardown is two-phase: the loop's exit path and `deregister` each drop
//! one reference, and the callback (with everything it captured) is released
//! only when both have done so.

use crate::error::{Error, Result};
use crate::event::{wait_any, Event, WaitStatus};
use crate::flags::ExecuteFlags;
use crate::legacy::LegacyQueue;
use crate::unwind::run_contained;
use crate::{Completion, Teardown};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Callback run when the target is signaled (`false`) or the wait times out (`true`)
pub type WaitCallback = Arc<dyn Fn(bool) + Send + Sync + 'static>;

static NEXT_WAIT_ID: AtomicU64 = AtomicU64::new(1);

/// Parties that must release a registration before it is freed
const RELEASE_PARTIES: u8 = 2;

struct LoopState {
    callback_in_progress: bool,
    cancelled: bool,
    exited: bool,
    completion: Option<Arc<Event>>,
}

struct Registration {
    id: u64,
    target: Arc<Event>,
    cancel: Event,
    callback: Mutex<Option<WaitCallback>>,
    timeout: Option<Duration>,
    flags: ExecuteFlags,
    state: Mutex<LoopState>,
    delete_count: AtomicU8,
}

impl Registration {
    /// Drop one of the two references; the last one frees the callback
    fn release_ref(&self) {
        let previous = self.delete_count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous < RELEASE_PARTIES, "wait registration released too often");
        if previous + 1 == RELEASE_PARTIES {
            let callback = self.callback.lock().take();
            debug_assert!(callback.is_some());
            drop(callback);
            tracing::trace!(wait = self.id, "wait registration freed");
        }
    }

    /// Dedicated wait loop, runs on a legacy worker
    fn run_loop(&self) {
        let once = self.flags.contains(ExecuteFlags::EXECUTE_ONLY_ONCE);
        loop {
            let timed_out = match wait_any(&[&*self.target, &self.cancel], self.timeout) {
                WaitStatus::Signaled(0) => false,
                WaitStatus::TimedOut => true,
                WaitStatus::Signaled(_) => break,
            };

            let callback = {
                let mut state = self.state.lock();
                if state.cancelled {
                    break;
                }
                state.callback_in_progress = true;
                self.callback.lock().clone()
            };

            if let Some(callback) = callback {
                run_contained("wait callback", || callback(timed_out));
            }

            self.state.lock().callback_in_progress = false;
            if once {
                break;
            }
        }

        let completion = {
            let mut state = self.state.lock();
            state.exited = true;
            state.completion.take()
        };
        if let Some(event) = completion {
            event.set();
        }
        tracing::trace!(wait = self.id, "wait loop exited");
        self.release_ref();
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        debug_assert!(
            self.callback.get_mut().is_none(),
            "wait registration dropped before both parties released it"
        );
    }
}

/// Handle to a wait registration
///
/// Dropping the handle deregisters without waiting.
pub struct WaitHandle {
    reg: Arc<Registration>,
    deregistered: AtomicBool,
}

impl WaitHandle {
    /// Registration id, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.reg.id
    }

    /// Cancel the registration
    ///
    /// Returns `Pending` if a callback is still running and `completion`
    /// does not wait for it. A second call returns `InvalidArgument`.
    pub fn deregister(&self, completion: Completion) -> Result<Teardown> {
        if self.deregistered.swap(true, Ordering::AcqRel) {
            return Err(Error::invalid("wait already deregistered"));
        }

        let reg = &self.reg;
        let mut private = None;
        let running = {
            let mut state = reg.state.lock();
            state.cancelled = true;
            reg.cancel.set();

            match &completion {
                Completion::NoWait => {}
                Completion::Signal(event) => {
                    if state.exited {
                        event.set();
                    } else {
                        state.completion = Some(Arc::clone(event));
                    }
                }
                Completion::Wait => {
                    if !state.exited {
                        let event = Arc::new(Event::new_manual());
                        state.completion = Some(Arc::clone(&event));
                        private = Some(event);
                    }
                }
            }
            state.callback_in_progress
        };

        if let Some(event) = private {
            event.wait(None);
        }
        reg.release_ref();

        match completion {
            Completion::Wait => Ok(Teardown::Complete),
            _ if running => Ok(Teardown::Pending),
            _ => Ok(Teardown::Complete),
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        if !self.deregistered.load(Ordering::Acquire) {
            let _ = self.deregister(Completion::NoWait);
        }
    }
}

/// Registers waits whose loops run on a given legacy queue
#[derive(Clone)]
pub struct WaitService {
    queue: LegacyQueue,
}

impl WaitService {
    /// Service whose wait loops occupy workers of `queue`
    pub fn new(queue: LegacyQueue) -> Self {
        Self { queue }
    }

    /// Service backed by the process-wide legacy queue
    pub fn global() -> Self {
        Self::new(LegacyQueue::global().clone())
    }

    /// Invoke `callback` each time `target` is signaled or `timeout` elapses
    ///
    /// `None` waits without a timeout. With `EXECUTE_ONLY_ONCE` the callback
    /// runs at most once.
    pub fn register<F>(
        &self,
        target: Arc<Event>,
        callback: F,
        timeout: Option<Duration>,
        flags: ExecuteFlags,
    ) -> Result<WaitHandle>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        if flags.contains(ExecuteFlags::EXECUTE_IN_TIMER_THREAD) {
            return Err(Error::Unsupported(
                "EXECUTE_IN_TIMER_THREAD on a wait registration".to_string(),
            ));
        }

        let reg = Arc::new(Registration {
            id: NEXT_WAIT_ID.fetch_add(1, Ordering::Relaxed),
            target,
            cancel: Event::new_manual(),
            callback: Mutex::new(Some(Arc::new(callback))),
            timeout,
            flags,
            state: Mutex::new(LoopState {
                callback_in_progress: false,
                cancelled: false,
                exited: false,
                completion: None,
            }),
            delete_count: AtomicU8::new(0),
        });

        let looped = Arc::clone(&reg);
        let submitted = self.queue.submit(
            move || looped.run_loop(),
            flags | ExecuteFlags::EXECUTE_LONG_FUNCTION,
        );
        if let Err(err) = submitted {
            reg.callback.lock().take();
            return Err(err);
        }

        tracing::trace!(wait = reg.id, "wait registered");
        Ok(WaitHandle {
            reg,
            deregistered: AtomicBool::new(false),
        })
    }
}

/// Register a wait on the process-wide legacy queue
pub fn register_wait<F>(
    target: Arc<Event>,
    callback: F,
    timeout: Option<Duration>,
    flags: ExecuteFlags,
) -> Result<WaitHandle>
where
    F: Fn(bool) + Send + Sync + 'static,
{
    WaitService::global().register(target, callback, timeout, flags)
}
