//! Pool: worker threads plus the FIFO of ready objects

use super::object::ObjectInner;
use super::policy::{self, WorkerCounts};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::spawn::{OsThreadSpawner, ThreadSpawner};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: OnceCell<ThreadPool> = OnceCell::new();

/// Everything guarded by the pool lock
///
/// Object `pending`/`running` counters are also only written under it.
pub(crate) struct PoolState {
    pub(crate) shutdown: bool,
    /// Objects with `pending > 0`, each present exactly once
    pub(crate) pending: VecDeque<Arc<ObjectInner>>,
    pub(crate) min_workers: usize,
    pub(crate) max_workers: usize,
    pub(crate) num_workers: usize,
    pub(crate) num_busy_workers: usize,
    pub(crate) objcount: usize,
    next_worker_id: usize,
}

impl PoolState {
    pub(crate) fn counts(&self) -> WorkerCounts {
        WorkerCounts {
            workers: self.num_workers,
            busy: self.num_busy_workers,
            min: self.min_workers,
            max: self.max_workers,
            objects: self.objcount,
        }
    }
}

pub(crate) struct PoolInner {
    pub(crate) id: u64,
    pub(crate) state: Mutex<PoolState>,
    update: Condvar,
    worker_timeout: Duration,
    stack_size: Option<usize>,
    spawner: Arc<dyn ThreadSpawner>,
}

impl PoolInner {
    /// Start one worker; the caller holds the pool lock
    ///
    /// The new thread blocks on the lock until the caller releases it, and
    /// counts as busy until it first waits for work.
    pub(crate) fn new_worker(self: &Arc<Self>, state: &mut PoolState) -> Result<()> {
        let worker = state.next_worker_id;
        state.next_worker_id += 1;

        let pool = Arc::clone(self);
        let spawned = self.spawner.spawn(
            format!("taskloom-pool{}-worker-{}", self.id, worker),
            self.stack_size,
            Box::new(move || pool.run_loop(worker)),
        );

        match spawned {
            Ok(()) => {
                state.num_workers += 1;
                state.num_busy_workers += 1;
                tracing::debug!(pool = self.id, worker, workers = state.num_workers, "pool worker spawned");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(pool = self.id, error = %err, "pool worker spawn failed");
                Err(Error::OutOfResources)
            }
        }
    }

    /// Account for a new object; guarantees at least one worker
    pub(crate) fn lock_object(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(Error::ShutDown);
        }
        if state.num_workers == 0 {
            self.new_worker(&mut state)?;
        }
        state.objcount += 1;
        Ok(())
    }

    /// Drop the accounting taken by [`PoolInner::lock_object`]
    pub(crate) fn unlock_object(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.objcount > 0);
        state.objcount -= 1;
    }

    /// Make `object` ready once more and get a worker to it
    pub(crate) fn submit(self: &Arc<Self>, object: &Arc<ObjectInner>) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutdown || object.is_shut_down() {
            return Err(Error::ShutDown);
        }

        if policy::on_submit(&state.counts()) == policy::SubmitAction::Spawn {
            // At least one worker exists while objects are bound, so the
            // object is serviced even if this fails
            let _ = self.new_worker(&mut state);
        }

        let previous = object.pending.fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            state.pending.push_back(Arc::clone(object));
        }
        self.update.notify_one();
        Ok(())
    }

    /// Discard every pending invocation of `object`; returns how many
    pub(crate) fn cancel(&self, object: &Arc<ObjectInner>) -> u32 {
        let mut state = self.state.lock();
        let count = object.pending.swap(0, Ordering::Relaxed);
        let mut removed = None;
        if count > 0 {
            removed = state
                .pending
                .iter()
                .position(|queued| Arc::ptr_eq(queued, object))
                .and_then(|pos| state.pending.remove(pos));
            object.notify_if_idle();
        }
        drop(state);
        drop(removed);
        count
    }

    /// Block until `object` has nothing pending or running
    pub(crate) fn wait_idle(&self, object: &ObjectInner) {
        let mut state = self.state.lock();
        while object.pending.load(Ordering::Relaxed) > 0 || object.running.load(Ordering::Relaxed) > 0 {
            object.finished.wait(&mut state);
        }
    }

    /// Keep the pool responsive while the calling worker blocks
    pub(crate) fn prepare_long_run(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();
        match policy::on_long_run(&state.counts()) {
            policy::LongRunAction::Nothing => Ok(()),
            policy::LongRunAction::Spawn => self.new_worker(&mut state),
            policy::LongRunAction::TooManyThreads => Err(Error::OutOfResources),
        }
    }

    /// End the running accounting of an invocation early
    pub(crate) fn disassociate(&self, object: &ObjectInner) {
        let _state = self.state.lock();
        object.leave_running();
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.update.notify_all();
    }

    /// Worker thread main loop
    fn run_loop(self: Arc<Self>, worker: usize) {
        let mut state = self.state.lock();
        loop {
            while let Some(object) = state.pending.pop_front() {
                let remaining = object.pending.load(Ordering::Relaxed).saturating_sub(1);
                object.pending.store(remaining, Ordering::Relaxed);
                if remaining > 0 {
                    state.pending.push_back(Arc::clone(&object));
                }
                object.running.fetch_add(1, Ordering::Relaxed);

                let associated = MutexGuard::unlocked(&mut state, || object.execute());
                if associated {
                    object.leave_running();
                }
                // The object's destructor takes the pool lock
                MutexGuard::unlocked(&mut state, move || drop(object));
            }

            if state.shutdown {
                break;
            }

            state.num_busy_workers -= 1;
            let timed_out = self.update.wait_for(&mut state, self.worker_timeout).timed_out();
            state.num_busy_workers += 1;

            if policy::should_retire(&state.counts(), timed_out, state.pending.is_empty()) {
                break;
            }
        }

        state.num_busy_workers -= 1;
        state.num_workers -= 1;
        let remaining = state.num_workers;
        drop(state);

        tracing::debug!(pool = self.id, worker, remaining, "pool worker exiting");
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug_assert!(state.objcount == 0, "pool freed with live objects");
        debug_assert!(state.pending.is_empty(), "pool freed with queued objects");
    }
}

/// Snapshot of a pool's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads
    pub workers: usize,
    /// Workers not waiting for work
    pub busy_workers: usize,
    /// Objects in the ready FIFO
    pub queued: usize,
    /// Objects bound to the pool
    pub objects: usize,
    /// Worker floor
    pub min_workers: usize,
    /// Worker ceiling
    pub max_workers: usize,
}

/// Handle to an auto-scaling thread pool
///
/// Releasing (dropping) the handle shuts the pool down: queued work is still
/// drained, then the workers exit. Objects keep the pool alive until they are
/// released themselves.
pub struct ThreadPool {
    pub(crate) inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Create a pool with OS worker threads
    ///
    /// A nonzero `min_workers` starts those workers right away.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_spawner(config, Arc::new(OsThreadSpawner))
    }

    /// Create a pool that starts workers through `spawner`
    pub fn with_spawner(config: PoolConfig, spawner: Arc<dyn ThreadSpawner>) -> Result<Self> {
        let pool = Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(PoolState {
                    shutdown: false,
                    pending: VecDeque::new(),
                    min_workers: 0,
                    max_workers: config.max_workers.max(1),
                    num_workers: 0,
                    num_busy_workers: 0,
                    objcount: 0,
                    next_worker_id: 0,
                }),
                update: Condvar::new(),
                worker_timeout: config.worker_timeout,
                stack_size: config.stack_size,
                spawner,
            }),
        };
        if config.min_workers > 0 {
            pool.set_min_threads(config.min_workers)?;
        }
        tracing::debug!(pool = pool.id(), "pool created");
        Ok(pool)
    }

    /// Process-wide default pool, created on first use
    pub fn global() -> Result<&'static ThreadPool> {
        GLOBAL.get_or_try_init(|| ThreadPool::new(PoolConfig::default()))
    }

    /// Set the configuration of the default pool before its first use
    ///
    /// A pool built here that loses the race is shut down again.
    pub fn configure_global(config: PoolConfig) -> Result<()> {
        if GLOBAL.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }
        GLOBAL
            .set(ThreadPool::new(config)?)
            .map_err(|_loser| Error::AlreadyInitialized)
    }

    /// Pool id, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Raise the worker floor to `min`, starting workers as needed
    ///
    /// If a spawn fails the workers already started are kept, the floor
    /// settles at the number actually running, and the error is returned.
    pub fn set_min_threads(&self, min: usize) -> Result<()> {
        let mut state = self.inner.state.lock();
        let mut result = Ok(());
        while state.num_workers < min {
            if let Err(err) = self.inner.new_worker(&mut state) {
                result = Err(err);
                break;
            }
        }
        let floor = if result.is_ok() {
            min
        } else {
            state.min_workers.max(state.num_workers)
        };
        state.min_workers = floor;
        state.max_workers = state.max_workers.max(floor);
        result
    }

    /// Set the worker ceiling; at least one worker is always allowed
    ///
    /// Running workers above the new ceiling retire once idle.
    pub fn set_max_threads(&self, max: usize) {
        let mut state = self.inner.state.lock();
        state.max_workers = max.max(1);
        state.min_workers = state.min_workers.min(state.max_workers);
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            workers: state.num_workers,
            busy_workers: state.num_busy_workers,
            queued: state.pending.len(),
            objects: state.objcount,
            min_workers: state.min_workers,
            max_workers: state.max_workers,
        }
    }

    /// Shut the pool down
    pub fn release(self) {}
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        tracing::debug!(pool = self.inner.id, "pool released");
        self.inner.shutdown();
    }
}
