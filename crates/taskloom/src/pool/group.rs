//! Cleanup groups: batch ownership of pool objects

use super::object::ObjectInner;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

struct GroupState {
    shutdown: bool,
    members: Vec<Weak<ObjectInner>>,
}

pub(crate) struct GroupInner {
    id: u64,
    state: Mutex<GroupState>,
}

impl GroupInner {
    pub(crate) fn add_member(&self, object: &Arc<ObjectInner>) {
        let mut state = self.state.lock();
        debug_assert!(!state.shutdown);
        object.is_group_member.store(true, Ordering::Release);
        state.members.push(Arc::downgrade(object));
    }

    /// Called from the object's destructor
    pub(crate) fn remove_member(&self, object: &ObjectInner) {
        let mut state = self.state.lock();
        state
            .members
            .retain(|member| !std::ptr::eq(member.as_ptr(), object));
    }

    /// Detach and shut down every live member, handing back strong references
    fn detach_members(&self) -> Vec<Arc<ObjectInner>> {
        let mut state = self.state.lock();
        let members = std::mem::take(&mut state.members);
        members
            .iter()
            .filter_map(Weak::upgrade)
            .inspect(|object| {
                object.is_group_member.store(false, Ordering::Release);
                object.shutdown();
            })
            .collect()
    }
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug_assert!(state.shutdown, "cleanup group freed before release");
        debug_assert!(
            state.members.iter().all(|member| member.strong_count() == 0),
            "cleanup group freed with live members"
        );
    }
}

/// Owns a set of pool objects so they can be cancelled and awaited together
///
/// Objects join a group through [`CallbackEnvironment::with_cleanup_group`].
///
/// [`CallbackEnvironment::with_cleanup_group`]: super::CallbackEnvironment::with_cleanup_group
pub struct CleanupGroup {
    pub(crate) inner: Arc<GroupInner>,
}

impl CleanupGroup {
    /// Create an empty group
    pub fn new() -> Self {
        let inner = Arc::new(GroupInner {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(GroupState {
                shutdown: false,
                members: Vec::new(),
            }),
        });
        tracing::trace!(group = inner.id, "cleanup group created");
        Self { inner }
    }

    /// Group id, unique for the life of the process
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of live members
    pub fn member_count(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .members
            .iter()
            .filter(|member| member.strong_count() > 0)
            .count()
    }

    /// Release every member and wait for it
    ///
    /// Members are detached and shut down, so further posts to them fail.
    /// With `cancel_pending`, queued invocations of all members are
    /// discarded first, and each member that had any runs its group-cancel
    /// callback once with `user_data`. Returns when every member has
    /// nothing queued or running.
    pub fn release_members(&self, cancel_pending: bool, user_data: &dyn Any) {
        let members = self.inner.detach_members();
        tracing::debug!(
            group = self.inner.id,
            members = members.len(),
            cancel_pending,
            "releasing cleanup group members"
        );

        if cancel_pending {
            for object in &members {
                object.cancel(Some(user_data));
            }
        }
        for object in &members {
            object.wait();
        }
        drop(members);
    }

    /// Release the group; members not yet released stay alive on their own
    pub fn release(self) {}
}

impl Default for CleanupGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupGroup {
    fn drop(&mut self) {
        self.inner.state.lock().shutdown = true;
    }
}
