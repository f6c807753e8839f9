//! Taskloom Thread-Pool Runtime
//!
//! This crate provides a user-space task scheduling and timer runtime:
//! - Legacy FIFO work queue with self-scaling worker threads
//! - Wait registrations (callback when an event becomes signaled)
//! - Timer queues (sorted expiry list + dispatcher thread)
//! - Object-oriented pools with work objects and cleanup groups
//!
//! Every component shares one execution contract: a unit of deferred work,
//! owned by a pool, executed by a worker, released when exhausted.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod flags;
pub mod legacy;
pub mod pool;
pub mod spawn;
pub mod timer;
mod unwind;
pub mod wait;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{LegacyConfig, PoolConfig, RuntimeConfig, TimerConfig};
pub use error::{Error, Result};
pub use event::{wait_any, Event, WaitStatus};
pub use flags::ExecuteFlags;
pub use legacy::{submit_work, LegacyQueue, LegacyStats};
pub use pool::{
    try_submit_simple, CallbackEnvironment, CallbackInstance, CleanupGroup, PoolStats, ThreadPool,
    Work,
};
pub use spawn::{OsThreadSpawner, ThreadSpawner};
pub use timer::{TimerHandle, TimerQueue};
pub use wait::{register_wait, WaitHandle, WaitService};

use std::sync::Arc;

/// How a teardown call synchronizes with callbacks that are still running
#[derive(Clone, Default)]
pub enum Completion {
    /// Return immediately; in-flight callbacks finish on their own
    #[default]
    NoWait,
    /// Block the caller until every in-flight callback has returned
    Wait,
    /// Signal the given event once every in-flight callback has returned
    Signal(Arc<Event>),
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::NoWait => write!(f, "NoWait"),
            Completion::Wait => write!(f, "Wait"),
            Completion::Signal(_) => write!(f, "Signal(..)"),
        }
    }
}

/// Outcome of a successful teardown call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Nothing is running any more; the object is gone
    Complete,
    /// Callbacks are still in flight; completion is reported asynchronously
    Pending,
}
