//! Pool objects: work items and one-shot simple callbacks

use super::environment::{CallbackEnvironment, FinalizationCallback, GroupCancelCallback};
use super::group::GroupInner;
use super::instance::CallbackInstance;
use super::pool::{PoolInner, ThreadPool};
use crate::error::Result;
use crate::unwind::run_contained;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

type SimpleCallback = Box<dyn FnOnce(&CallbackInstance<'_>) + Send + 'static>;
type WorkCallback = Box<dyn Fn(&CallbackInstance<'_>) + Send + Sync + 'static>;

pub(crate) enum ObjectKind {
    /// Runs once, then the callback is gone
    Simple(Mutex<Option<SimpleCallback>>),
    /// Runs once per post
    Work(WorkCallback),
}

pub(crate) struct ObjectInner {
    pub(crate) id: u64,
    kind: ObjectKind,
    pub(crate) pool: Arc<PoolInner>,
    group: Option<Arc<GroupInner>>,
    pub(crate) is_group_member: AtomicBool,
    group_cancel: Option<GroupCancelCallback>,
    finalization: Option<FinalizationCallback>,
    long_function: bool,
    shutdown: AtomicBool,
    /// Queued invocations; written under the pool lock
    pub(crate) pending: AtomicU32,
    /// Invocations executing right now; written under the pool lock
    pub(crate) running: AtomicU32,
    /// Paired with the pool lock; notified when both counters reach zero
    pub(crate) finished: Condvar,
}

impl ObjectInner {
    /// Bind a new object to the environment's pool and group
    pub(crate) fn create(env: &CallbackEnvironment<'_>, kind: ObjectKind) -> Result<Arc<Self>> {
        let pool = match env.pool {
            Some(pool) => Arc::clone(&pool.inner),
            None => Arc::clone(&ThreadPool::global()?.inner),
        };
        pool.lock_object()?;

        let object = Arc::new(Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            pool,
            group: env.group.map(|group| Arc::clone(&group.inner)),
            is_group_member: AtomicBool::new(false),
            group_cancel: env.group_cancel.clone(),
            finalization: env.finalization.clone(),
            long_function: env.long_function,
            shutdown: AtomicBool::new(false),
            pending: AtomicU32::new(0),
            running: AtomicU32::new(0),
            finished: Condvar::new(),
        });

        if let Some(group) = &object.group {
            group.add_member(&object);
        }

        tracing::trace!(object = object.id, pool = object.pool.id, "pool object created");
        Ok(object)
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// No further submissions are accepted
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn submit(self: &Arc<Self>) -> Result<()> {
        self.pool.submit(self)
    }

    /// Drop pending invocations; with `group_data`, run the group-cancel callback
    pub(crate) fn cancel(self: &Arc<Self>, group_data: Option<&dyn Any>) {
        let count = self.pool.cancel(self);
        if count == 0 {
            return;
        }
        tracing::trace!(object = self.id, count, "pending invocations cancelled");
        if let (Some(user_data), Some(callback)) = (group_data, &self.group_cancel) {
            run_contained("group cancel callback", || callback(user_data));
        }
    }

    pub(crate) fn wait(&self) {
        self.pool.wait_idle(self);
    }

    /// Run one invocation; returns whether it is still counted as running
    pub(crate) fn execute(self: &Arc<Self>) -> bool {
        let instance = CallbackInstance::new(self);
        if self.long_function {
            if let Err(err) = instance.may_run_long() {
                tracing::debug!(object = self.id, error = %err, "no spare worker for long callback");
            }
        }

        match &self.kind {
            ObjectKind::Simple(callback) => {
                let callback = callback.lock().take();
                if let Some(callback) = callback {
                    run_contained("pool callback", || callback(&instance));
                }
            }
            ObjectKind::Work(callback) => {
                run_contained("pool callback", || callback(&instance));
            }
        }

        if let Some(finalization) = &self.finalization {
            run_contained("finalization callback", || finalization(&instance));
        }
        instance.finish()
    }

    /// One invocation stops counting as running; caller holds the pool lock
    pub(crate) fn leave_running(&self) {
        let previous = self.running.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0);
        self.notify_if_idle();
    }

    /// Wake waiters once nothing is pending or running; caller holds the pool lock
    pub(crate) fn notify_if_idle(&self) {
        if self.pending.load(Ordering::Relaxed) == 0 && self.running.load(Ordering::Relaxed) == 0 {
            self.finished.notify_all();
        }
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        debug_assert!(self.is_shut_down(), "pool object freed before shutdown");
        debug_assert_eq!(*self.pending.get_mut(), 0);
        debug_assert_eq!(*self.running.get_mut(), 0);

        if let Some(group) = &self.group {
            if *self.is_group_member.get_mut() {
                group.remove_member(self);
            }
        }
        self.pool.unlock_object();
        tracing::trace!(object = self.id, "pool object freed");
    }
}

/// A reusable work item bound to a pool
///
/// Every [`Work::post`] queues one more invocation of the callback.
/// Dropping the handle releases the work: no further posts are possible and
/// it is freed once queued invocations have run.
pub struct Work {
    inner: Arc<ObjectInner>,
}

impl Work {
    /// Create a work object in `env`
    pub fn new<F>(env: &CallbackEnvironment<'_>, callback: F) -> Result<Self>
    where
        F: Fn(&CallbackInstance<'_>) + Send + Sync + 'static,
    {
        let inner = ObjectInner::create(env, ObjectKind::Work(Box::new(callback)))?;
        Ok(Self { inner })
    }

    /// Object id, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Queue one invocation
    ///
    /// Fails with `ShutDown` once the work's cleanup group has released it or
    /// its pool has been released.
    pub fn post(&self) -> Result<()> {
        self.inner.submit()
    }

    /// Wait until no invocation is queued or running
    ///
    /// With `cancel_pending`, queued invocations are discarded first.
    pub fn wait(&self, cancel_pending: bool) {
        if cancel_pending {
            self.inner.cancel(None);
        }
        self.inner.wait();
    }

    /// Release the work object
    pub fn release(self) {}
}

impl Drop for Work {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Work")
            .field("id", &self.inner.id)
            .field("pool", &self.inner.pool.id)
            .finish()
    }
}

/// Run `callback` once on the environment's pool
///
/// The object is released right after submission and freed once the
/// callback has run.
pub fn try_submit_simple<F>(env: &CallbackEnvironment<'_>, callback: F) -> Result<()>
where
    F: FnOnce(&CallbackInstance<'_>) + Send + 'static,
{
    let object = ObjectInner::create(env, ObjectKind::Simple(Mutex::new(Some(Box::new(callback)))))?;
    let submitted = object.submit();
    object.shutdown();
    if submitted.is_err() {
        tracing::debug!(object = object.id, "simple callback not submitted");
    }
    submitted
}
