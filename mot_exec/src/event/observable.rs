//! Observable value implementation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use parking_lot::Mutex;
use std::sync::Arc;

// Internal
use super::{Channel, ObserverHandle};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A [`Channel`] wrapping a current value.
///
/// Assignment through [`Observable::set`] compares the new value to the old
/// one and notifies only on change. The current value can be read
/// synchronously at any time with [`Observable::get`].
pub struct Observable<T> {
    channel: Channel<T>,
    value: Arc<Mutex<T>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Create a new observable with the given channel name and initial value.
    ///
    /// Creation does not notify.
    pub fn new<S: Into<Arc<str>>>(name: S, initial: T) -> Self {
        Observable {
            channel: Channel::new(name),
            value: Arc::new(Mutex::new(initial)),
        }
    }

    /// Read the current value.
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Assign a new value.
    ///
    /// A no-op when the new value equals the current one. Otherwise the value
    /// is stored first and the observers are notified with the value lock
    /// released, so observers are free to read the observable again.
    pub fn set(&self, new_value: T) {
        {
            let mut value = self.value.lock();
            if *value == new_value {
                return;
            }
            *value = new_value.clone();
        }

        self.channel.notify(&new_value);
    }

    /// Assign a new value, notifying observers whether or not it changed.
    ///
    /// Periodic sources publish through this: the encoder pushes every speed
    /// sample, so observers which count samples (the throttle ramp, stall
    /// detection) see repeats of the same value.
    pub fn force_set(&self, new_value: T) {
        *self.value.lock() = new_value.clone();
        self.channel.notify(&new_value);
    }

    /// The underlying broadcast channel.
    ///
    /// Gives access to raw notification, which fires the observers without
    /// changing the stored value. Tests drive the wheel controller's stall
    /// detection this way.
    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// The name of the underlying channel.
    pub fn name(&self) -> Arc<str> {
        self.channel.name()
    }

    /// Register an observer on the underlying channel.
    pub fn register_observer<F>(&self, func: F) -> ObserverHandle
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.channel.register_observer(func)
    }

    /// Unregister an observer from the underlying channel.
    pub fn unregister_observer(&self, handle: ObserverHandle) {
        self.channel.unregister_observer(handle)
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            channel: self.channel.clone(),
            value: self.value.clone(),
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
    fn test_set_notifies_only_on_change() {
        let obs: Observable<i64> = Observable::new("position", 0);
        let notifications = Arc::new(Mutex::new(Vec::new()));

        let seen = notifications.clone();
        obs.register_observer(move |payload: &i64| {
            seen.lock().push(*payload);
        });

        obs.set(0);
        obs.set(5);
        obs.set(5);
        obs.set(3);

        assert_eq!(*notifications.lock(), vec![5, 3]);
        assert_eq!(obs.get(), 3);
    }

    #[test]
    fn test_force_set_notifies_unchanged_values() {
        let obs: Observable<f64> = Observable::new("speed", 0.0);
        let notifications = Arc::new(Mutex::new(0));

        let seen = notifications.clone();
        obs.register_observer(move |_: &f64| {
            *seen.lock() += 1;
        });

        obs.force_set(0.0);
        obs.force_set(0.0);

        assert_eq!(*notifications.lock(), 2);
        assert_eq!(obs.get(), 0.0);
    }

    #[test]
    fn test_observer_may_read_current_value() {
        let obs: Observable<i64> = Observable::new("position", 0);
        let seen = Arc::new(Mutex::new(None));

        let inner = obs.clone();
        let read_back = seen.clone();
        obs.register_observer(move |payload: &i64| {
            // The stored value must already match the payload
            *read_back.lock() = Some((inner.get(), *payload));
        });

        obs.set(42);
        assert_eq!(*seen.lock(), Some((42, 42)));
    }
}
