//! Object-oriented thread pools
//!
//! Pools own auto-scaling worker threads and one FIFO of ready objects.
//! Objects (work items with a bound callback) are refcounted and carry
//! pending/running counters; cleanup groups batch-own objects so they can be
//! cancelled and awaited together.

mod environment;
mod group;
mod instance;
mod object;
pub mod policy;
#[allow(clippy::module_inception)]
mod pool;

pub use environment::{CallbackEnvironment, FinalizationCallback, GroupCancelCallback};
pub use group::CleanupGroup;
pub use instance::CallbackInstance;
pub use object::{try_submit_simple, Work};
pub use pool::{PoolStats, ThreadPool};
