//! Worker thread creation
//!
//! Workers are detached: they decide on their own when to exit, so nobody
//! keeps their join handles. The trait exists so queues and pools can be
//! driven by a spawner that refuses to create threads.

use std::io;
use std::thread;

/// Body of a worker thread
pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Creates detached worker threads
pub trait ThreadSpawner: Send + Sync {
    /// Start `body` on a new thread
    fn spawn(&self, name: String, stack_size: Option<usize>, body: ThreadBody) -> io::Result<()>;
}

/// Spawner backed by [`std::thread::Builder`]
#[derive(Debug, Default, Clone, Copy)]
pub struct OsThreadSpawner;

impl ThreadSpawner for OsThreadSpawner {
    fn spawn(&self, name: String, stack_size: Option<usize>, body: ThreadBody) -> io::Result<()> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(body).map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Spawner that succeeds `allowed` times, then fails
    pub(crate) struct LimitedSpawner {
        allowed: AtomicUsize,
        pub(crate) attempts: AtomicUsize,
    }

    impl LimitedSpawner {
        pub(crate) fn new(allowed: usize) -> Self {
            Self {
                allowed: AtomicUsize::new(allowed),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl ThreadSpawner for LimitedSpawner {
        fn spawn(&self, name: String, stack_size: Option<usize>, body: ThreadBody) -> io::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let granted = self
                .allowed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if granted {
                OsThreadSpawner.spawn(name, stack_size, body)
            } else {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::LimitedSpawner;
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_os_spawner_names_thread() {
        let (tx, rx) = mpsc::channel();
        OsThreadSpawner
            .spawn(
                "taskloom-test".to_string(),
                None,
                Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send(name).unwrap();
                }),
            )
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("taskloom-test"));
    }

    #[test]
    fn test_limited_spawner_refuses() {
        let spawner = LimitedSpawner::new(0);
        let result = spawner.spawn("x".to_string(), None, Box::new(|| {}));
        assert!(result.is_err());
    }
}
