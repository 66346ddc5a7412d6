//! Broadcast channel implementation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A named one-to-many notification channel.
///
/// `Channel` is a cheap clonable handle, all clones share the same observer
/// list. Observers are invoked synchronously and in registration order by
/// [`Channel::notify`]. There is no buffering, a late subscriber never sees
/// past payloads.
pub struct Channel<T> {
    name: Arc<str>,
    inner: Arc<ChannelInner<T>>,
}

/// Handle returned by [`Channel::register_observer`], used to unregister the
/// observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(u64);

struct ChannelInner<T> {
    observers: Mutex<Vec<Observer<T>>>,
    next_id: AtomicU64,
}

struct Observer<T> {
    id: u64,
    func: ObserverFn<T>,
}

/// Observers are shared so that a notification pass can run on a snapshot of
/// the list, leaving the list itself free for re-entrant (un)registration.
type ObserverFn<T> = Arc<Mutex<dyn FnMut(&T) + Send>>;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T> Channel<T> {
    /// Create a new channel with the given name.
    ///
    /// The name identifies the channel in diagnostics and is the value an
    /// [`super::EventRace`] resolves with.
    pub fn new<S: Into<Arc<str>>>(name: S) -> Self {
        Channel {
            name: name.into(),
            inner: Arc::new(ChannelInner {
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// The channel's name.
    pub fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Register an observer, returning a handle with which it can be
    /// unregistered again.
    ///
    /// Observers registered while a notification is being dispatched will
    /// first be invoked by the next notification.
    pub fn register_observer<F>(&self, func: F) -> ObserverHandle
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.lock().push(Observer {
            id,
            func: Arc::new(Mutex::new(func)),
        });
        ObserverHandle(id)
    }

    /// Unregister the observer behind the given handle.
    ///
    /// Unregistering an observer which is not (or no longer) registered is a
    /// no-op.
    pub fn unregister_observer(&self, handle: ObserverHandle) {
        self.inner.observers.lock().retain(|o| o.id != handle.0);
    }

    /// Notify all observers of the given payload.
    ///
    /// Dispatch is synchronous: every observer has run to completion, in
    /// registration order, before this function returns. The observer list is
    /// snapshotted first, so observers may register or unregister observers
    /// on any channel, including this one, without deadlocking. Removals take
    /// effect from the next notification.
    pub fn notify(&self, payload: &T) {
        let snapshot: Vec<ObserverFn<T>> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|o| o.func.clone())
            .collect();

        for func in snapshot {
            (&mut *func.lock())(payload);
        }
    }

    /// The number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            name: self.name.clone(),
            inner: self.inner.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_observers_run_in_registration_order() {
        let channel: Channel<i32> = Channel::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let seen = seen.clone();
            channel.register_observer(move |payload: &i32| {
                seen.lock().push((tag, *payload));
            });
        }

        channel.notify(&7);

        assert_eq!(*seen.lock(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let channel: Channel<i32> = Channel::new("test");
        let count = Arc::new(Mutex::new(0));

        let counter = count.clone();
        let handle = channel.register_observer(move |_: &i32| {
            *counter.lock() += 1;
        });

        channel.notify(&0);
        channel.unregister_observer(handle);
        channel.unregister_observer(handle);
        channel.notify(&0);

        assert_eq!(*count.lock(), 1);
        assert_eq!(channel.observer_count(), 0);
    }

    #[test]
    fn test_register_during_notify_does_not_deadlock() {
        let channel: Channel<i32> = Channel::new("test");
        let late_calls = Arc::new(Mutex::new(0));

        let chan = channel.clone();
        let late = late_calls.clone();
        channel.register_observer(move |_: &i32| {
            let late = late.clone();
            chan.register_observer(move |_: &i32| {
                *late.lock() += 1;
            });
        });

        // The observer registered during this pass must not fire yet
        channel.notify(&0);
        assert_eq!(*late_calls.lock(), 0);

        channel.notify(&0);
        assert_eq!(*late_calls.lock(), 1);
    }
}
