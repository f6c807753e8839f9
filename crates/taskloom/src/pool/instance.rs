//! Per-invocation callback instance

use super::object::ObjectInner;
use crate::error::Result;
use crate::event::Event;
use std::cell::{Cell, RefCell};
use std::sync::Arc;

/// Handed to every pool callback for the duration of one invocation
///
/// Lets the callback tell the pool how it behaves: that it will block for
/// long, that waiters need not wait for it, or that an event should be
/// signaled once it is done.
pub struct CallbackInstance<'a> {
    object: &'a Arc<ObjectInner>,
    associated: Cell<bool>,
    may_run_long: Cell<bool>,
    completion_event: RefCell<Option<Arc<Event>>>,
}

impl<'a> CallbackInstance<'a> {
    pub(crate) fn new(object: &'a Arc<ObjectInner>) -> Self {
        Self {
            object,
            associated: Cell::new(true),
            may_run_long: Cell::new(false),
            completion_event: RefCell::new(None),
        }
    }

    /// Id of the object being run
    pub fn object_id(&self) -> u64 {
        self.object.id
    }

    /// Announce that this callback will block for a long time
    ///
    /// If every worker is busy the pool adds one, up to its ceiling.
    /// Returns `OutOfResources` when no worker could be added. Further calls
    /// in the same invocation are no-ops once one has succeeded.
    pub fn may_run_long(&self) -> Result<()> {
        if self.may_run_long.get() {
            return Ok(());
        }
        self.object.pool.prepare_long_run()?;
        self.may_run_long.set(true);
        Ok(())
    }

    /// Stop counting this invocation as running
    ///
    /// Waiters on the object (and on its cleanup group) no longer wait for
    /// the rest of this callback.
    pub fn disassociate(&self) {
        if self.associated.replace(false) {
            self.object.pool.disassociate(self.object);
        }
    }

    /// Signal `event` once the callback and its finalization have returned
    ///
    /// Only the first event set per invocation is kept.
    pub fn set_event_on_completion(&self, event: Arc<Event>) {
        let mut slot = self.completion_event.borrow_mut();
        if slot.is_none() {
            *slot = Some(event);
        }
    }

    /// Run the completion actions; returns whether still associated
    pub(crate) fn finish(self) -> bool {
        if let Some(event) = self.completion_event.into_inner() {
            event.set();
        }
        self.associated.get()
    }
}

impl std::fmt::Debug for CallbackInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackInstance")
            .field("object", &self.object.id)
            .field("associated", &self.associated.get())
            .field("may_run_long", &self.may_run_long.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PoolConfig;
    use crate::event::Event;
    use crate::pool::{CallbackEnvironment, ThreadPool, Work};
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_set_event_on_completion() {
        let pool = ThreadPool::new(PoolConfig::default()).unwrap();
        let env = CallbackEnvironment::new().with_pool(&pool);
        let done = Arc::new(Event::new_manual());
        let event = Arc::clone(&done);
        let work = Work::new(&env, move |instance| {
            instance.set_event_on_completion(Arc::clone(&event));
        })
        .unwrap();

        work.post().unwrap();
        assert!(done.wait(Some(Duration::from_secs(5))));
        work.wait(false);
    }

    #[test]
    fn test_disassociate_releases_waiters() {
        let pool = ThreadPool::new(PoolConfig::default()).unwrap();
        let env = CallbackEnvironment::new().with_pool(&pool);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (done_tx, done_rx) = mpsc::channel();

        let work = Work::new(&env, move |instance| {
            instance.disassociate();
            instance.disassociate();
            release_rx.lock().recv().unwrap();
            done_tx.send(()).unwrap();
        })
        .unwrap();

        work.post().unwrap();
        // Returns although the callback is still blocked
        work.wait(false);
        assert!(done_rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_may_run_long_adds_worker() {
        let pool = ThreadPool::new(PoolConfig::new().with_max_workers(2)).unwrap();
        let env = CallbackEnvironment::new().with_pool(&pool);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let work = Work::new(&env, move |instance| {
            tx.lock().send(instance.may_run_long().is_ok()).unwrap();
        })
        .unwrap();

        work.post().unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        work.wait(false);
        assert_eq!(pool.stats().workers, 2);
    }

    #[test]
    fn test_may_run_long_at_ceiling_fails() {
        let pool = ThreadPool::new(PoolConfig::new().with_max_workers(1)).unwrap();
        let env = CallbackEnvironment::new().with_pool(&pool);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let work = Work::new(&env, move |instance| {
            tx.lock().send(instance.may_run_long().is_err()).unwrap();
        })
        .unwrap();

        work.post().unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        work.wait(false);
    }
}
