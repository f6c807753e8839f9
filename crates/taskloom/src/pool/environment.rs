//! Callback environment: where and how a new object runs

use super::group::CleanupGroup;
use super::instance::CallbackInstance;
use super::pool::ThreadPool;
use std::any::Any;
use std::sync::Arc;

/// Runs once per member cancelled by [`CleanupGroup::release_members`]
///
/// Receives the `user_data` passed to `release_members`.
pub type GroupCancelCallback = Arc<dyn Fn(&dyn Any) + Send + Sync + 'static>;

/// Runs after the main callback, inside the same invocation
pub type FinalizationCallback = Arc<dyn Fn(&CallbackInstance<'_>) + Send + Sync + 'static>;

/// Binding of new objects to a pool, a cleanup group and extra callbacks
///
/// Without a pool the process-wide default pool is used.
#[derive(Clone, Default)]
pub struct CallbackEnvironment<'a> {
    pub(crate) pool: Option<&'a ThreadPool>,
    pub(crate) group: Option<&'a CleanupGroup>,
    pub(crate) group_cancel: Option<GroupCancelCallback>,
    pub(crate) finalization: Option<FinalizationCallback>,
    pub(crate) long_function: bool,
}

impl<'a> CallbackEnvironment<'a> {
    /// Environment bound to the default pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Run objects on `pool`
    pub fn with_pool(mut self, pool: &'a ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Make objects members of `group`
    pub fn with_cleanup_group(mut self, group: &'a CleanupGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Callback run when a group release cancels pending invocations
    pub fn with_group_cancel<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn Any) + Send + Sync + 'static,
    {
        self.group_cancel = Some(Arc::new(callback));
        self
    }

    /// Callback run after every invocation of the main callback
    pub fn with_finalization<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CallbackInstance<'_>) + Send + Sync + 'static,
    {
        self.finalization = Some(Arc::new(callback));
        self
    }

    /// Mark callbacks as long-running
    pub fn with_long_function(mut self, long: bool) -> Self {
        self.long_function = long;
        self
    }
}

impl std::fmt::Debug for CallbackEnvironment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackEnvironment")
            .field("pool", &self.pool.map(ThreadPool::id))
            .field("group", &self.group.map(CleanupGroup::id))
            .field("group_cancel", &self.group_cancel.is_some())
            .field("finalization", &self.finalization.is_some())
            .field("long_function", &self.long_function)
            .finish()
    }
}
