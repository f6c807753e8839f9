//! Legacy work queue
//!
//! A single FIFO of closures serviced by a self-sizing set of worker threads.
//! Submitting wakes an idle worker if there is one and spawns a new worker
//! otherwise. Workers exit after sitting idle for `idle_timeout`.

use crate::config::LegacyConfig;
use crate::error::{Error, Result};
use crate::flags::ExecuteFlags;
use crate::spawn::{OsThreadSpawner, ThreadSpawner};
use crate::unwind::run_contained;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;

/// Boxed work item body
pub type WorkFn = Box<dyn FnOnce() + Send + 'static>;

struct WorkItem {
    id: u64,
    func: WorkFn,
    flags: ExecuteFlags,
}

struct LegacyState {
    queue: VecDeque<WorkItem>,
    num_workers: usize,
    num_busy_workers: usize,
    num_items_processed: u64,
    next_item_id: u64,
    next_worker_id: usize,
}

struct Shared {
    state: Mutex<LegacyState>,
    work_available: Condvar,
    config: LegacyConfig,
    spawner: Arc<dyn ThreadSpawner>,
}

/// Snapshot of a legacy queue's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyStats {
    /// Live worker threads
    pub workers: usize,
    /// Workers not waiting for work
    pub busy_workers: usize,
    /// Items waiting in the FIFO
    pub queued: usize,
    /// Items run to completion since creation
    pub processed: u64,
}

/// Handle to a legacy work queue; clones share the same queue
#[derive(Clone)]
pub struct LegacyQueue {
    shared: Arc<Shared>,
}

static GLOBAL: OnceCell<LegacyQueue> = OnceCell::new();

impl LegacyQueue {
    /// Create a queue with OS worker threads
    pub fn new(config: LegacyConfig) -> Self {
        Self::with_spawner(config, Arc::new(OsThreadSpawner))
    }

    /// Create a queue that starts workers through `spawner`
    pub fn with_spawner(config: LegacyConfig, spawner: Arc<dyn ThreadSpawner>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LegacyState {
                    queue: VecDeque::new(),
                    num_workers: 0,
                    num_busy_workers: 0,
                    num_items_processed: 0,
                    next_item_id: 0,
                    next_worker_id: 0,
                }),
                work_available: Condvar::new(),
                config,
                spawner,
            }),
        }
    }

    /// Process-wide queue, created on first use
    pub fn global() -> &'static LegacyQueue {
        GLOBAL.get_or_init(|| LegacyQueue::new(LegacyConfig::default()))
    }

    /// Set the configuration of the process-wide queue before its first use
    pub fn configure_global(config: LegacyConfig) -> Result<()> {
        GLOBAL
            .set(LegacyQueue::new(config))
            .map_err(|_| Error::AlreadyInitialized)
    }

    /// Counters of the process-wide queue, if it has been created
    pub fn global_stats() -> Result<LegacyStats> {
        GLOBAL
            .get()
            .map(LegacyQueue::stats)
            .ok_or(Error::NotInitialized)
    }

    /// Queue `func` for execution on a worker thread
    ///
    /// On failure the item is not enqueued.
    pub fn submit<F>(&self, func: F, flags: ExecuteFlags) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Box::new(func), flags)
    }

    pub(crate) fn submit_boxed(&self, func: WorkFn, flags: ExecuteFlags) -> Result<()> {
        if flags.contains(ExecuteFlags::EXECUTE_IN_TIMER_THREAD) {
            return Err(Error::Unsupported(
                "EXECUTE_IN_TIMER_THREAD outside a timer queue".to_string(),
            ));
        }

        let mut state = self.shared.state.lock();
        let item_id = state.next_item_id;
        state.next_item_id += 1;
        state.queue.push_back(WorkItem {
            id: item_id,
            func,
            flags,
        });

        if state.num_busy_workers < state.num_workers {
            // An idle worker exists
            self.shared.work_available.notify_one();
            return Ok(());
        }

        let processed_before = state.num_items_processed;
        let worker_id = state.next_worker_id;
        state.next_worker_id += 1;
        // Busy until it first waits, so a burst does not pile onto it
        state.num_workers += 1;
        state.num_busy_workers += 1;
        drop(state);

        let shared = Arc::clone(&self.shared);
        let spawned = self.shared.spawner.spawn(
            format!("taskloom-legacy-{}", worker_id),
            self.shared.config.stack_size,
            Box::new(move || Self::run_loop(shared, worker_id)),
        );

        match spawned {
            Ok(()) => {
                tracing::debug!(worker = worker_id, "legacy worker spawned");
                Ok(())
            }
            Err(err) => {
                let mut state = self.shared.state.lock();
                state.num_workers -= 1;
                state.num_busy_workers -= 1;

                // Someone is still around to pick the item up
                if state.num_workers > 0 || state.num_items_processed != processed_before {
                    tracing::warn!(error = %err, "legacy worker spawn failed; reusing existing workers");
                    return Ok(());
                }

                let position = state.queue.iter().position(|item| item.id == item_id);
                let rolled_back = position.and_then(|pos| state.queue.remove(pos));
                drop(state);

                match rolled_back {
                    Some(_) => {
                        tracing::warn!(error = %err, "legacy worker spawn failed; item rolled back");
                        Err(Error::OutOfResources)
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Snapshot of the queue's counters
    pub fn stats(&self) -> LegacyStats {
        let state = self.shared.state.lock();
        LegacyStats {
            workers: state.num_workers,
            busy_workers: state.num_busy_workers,
            queued: state.queue.len(),
            processed: state.num_items_processed,
        }
    }

    /// Worker thread main loop
    fn run_loop(shared: Arc<Shared>, id: usize) {
        let mut state = shared.state.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                Self::run_item(&mut state, item);
                state.num_items_processed += 1;
                continue;
            }

            state.num_busy_workers -= 1;
            let timed_out = shared
                .work_available
                .wait_for(&mut state, shared.config.idle_timeout)
                .timed_out();
            state.num_busy_workers += 1;
            if timed_out && state.queue.is_empty() {
                break;
            }
        }
        state.num_busy_workers -= 1;
        state.num_workers -= 1;
        drop(state);

        tracing::debug!(worker = id, "legacy worker idle, exiting");
    }

    fn run_item(state: &mut MutexGuard<'_, LegacyState>, item: WorkItem) {
        tracing::trace!(item = item.id, flags = item.flags.bits(), "running work item");
        let func = item.func;
        MutexGuard::unlocked(state, || run_contained("legacy work item", func));
    }
}

/// Queue `func` on the process-wide legacy queue
pub fn submit_work<F>(func: F, flags: ExecuteFlags) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    LegacyQueue::global().submit(func, flags)
}
