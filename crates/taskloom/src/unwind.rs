//! Panic containment for user callbacks

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run a user callback, containing any panic it raises
///
/// Returns false if the callback panicked. The panic is logged and the
/// calling worker carries on with its bookkeeping.
pub(crate) fn run_contained<F: FnOnce()>(site: &'static str, f: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::warn!(site, message = panic_message(&*payload), "callback panicked");
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
