//! Subscription handles shared by the store and identity seams.
//!
//! Both collaborators hand out a [`ListenerHandle`] when a listener is
//! registered. Dropping the handle (or calling [`ListenerHandle::cancel`])
//! unregisters the listener, so a subscription's lifetime is tied to the
//! value that holds its handle.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// RAII registration of a realtime listener.
#[must_use = "dropping a ListenerHandle unsubscribes immediately"]
pub struct ListenerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerHandle {
    /// Wrap an unsubscribe action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unregister the listener now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
