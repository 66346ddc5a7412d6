//! Event race implementation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

// Internal
use super::Channel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A one-shot composite wait over several (channel, predicate) pairs.
///
/// Entries are added with [`EventRace::wait_for`], then [`EventRace::race`]
/// resolves with the name of the first channel whose predicate is satisfied
/// by a notified payload. Predicate evaluation happens inside the channels'
/// synchronous dispatch, so the winner is fixed in notification order and a
/// match is never missed between `wait_for` and `race`.
///
/// Beyond the winner the race keeps a `completed` list: every channel whose
/// predicate has matched at least once, in match order. The list keeps
/// growing after the winner is fixed, until the race is dropped, which lets
/// a caller inspect "did B also finish, even though A won" after the fact.
///
/// Dropping the race unregisters every entry from its channel, exactly once,
/// so no observer registration can leak.
pub struct EventRace {
    entries: Vec<RaceEntry>,
    shared: Arc<Mutex<RaceState>>,
    resolved_rx: watch::Receiver<bool>,
    result: Option<Arc<str>>,
}

struct RaceEntry {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

struct RaceState {
    winner: Option<Arc<str>>,
    completed: Vec<Arc<str>>,
    resolved_tx: watch::Sender<bool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EventRace {
    /// Create a new race with no entries.
    pub fn new() -> Self {
        let (resolved_tx, resolved_rx) = watch::channel(false);

        EventRace {
            entries: Vec::new(),
            shared: Arc::new(Mutex::new(RaceState {
                winner: None,
                completed: Vec::new(),
                resolved_tx,
            })),
            resolved_rx,
            result: None,
        }
    }

    /// Register interest in `channel`, with the given predicate.
    ///
    /// May be called multiple times, against the same or different channels.
    /// The predicate is evaluated against every payload notified on the
    /// channel from this point on.
    pub fn wait_for<T, P>(&mut self, channel: &Channel<T>, mut predicate: P)
    where
        T: Send + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let shared = self.shared.clone();
        let name = channel.name();

        let observer_name = name.clone();
        let handle = channel.register_observer(move |payload: &T| {
            if predicate(payload) {
                let mut state = shared.lock();

                if !state.completed.iter().any(|c| *c == observer_name) {
                    state.completed.push(observer_name.clone());
                }

                if state.winner.is_none() {
                    state.winner = Some(observer_name.clone());
                    let _ = state.resolved_tx.send(true);
                }
            }
        });

        let unreg_channel = channel.clone();
        self.entries.push(RaceEntry {
            unregister: Some(Box::new(move || {
                unreg_channel.unregister_observer(handle)
            })),
        });
    }

    /// Register interest in `channel` with an always-true predicate.
    pub fn wait_for_any<T: Send + 'static>(&mut self, channel: &Channel<T>) {
        self.wait_for(channel, |_| true)
    }

    /// Wait for the first entry to match, returning the winning channel's
    /// name.
    ///
    /// With no entries the race resolves immediately with the empty name.
    /// Calling `race` again on an already resolved instance returns the same
    /// result.
    pub async fn race(&mut self) -> Arc<str> {
        if let Some(result) = &self.result {
            return result.clone();
        }

        if self.entries.is_empty() {
            let empty: Arc<str> = Arc::from("");
            self.result = Some(empty.clone());
            return empty;
        }

        loop {
            if let Some(winner) = self.shared.lock().winner.clone() {
                self.result = Some(winner.clone());
                return winner;
            }

            // The sender lives in `shared` so it cannot be dropped while we
            // are waiting, but don't hang should that invariant ever break
            if self.resolved_rx.changed().await.is_err() {
                let empty: Arc<str> = Arc::from("");
                self.result = Some(empty.clone());
                return empty;
            }
        }
    }

    /// The winning channel name, if the race has resolved.
    pub fn winner(&self) -> Option<Arc<str>> {
        self.shared.lock().winner.clone()
    }

    /// Names of all channels whose predicate has matched at least once, in
    /// match order.
    pub fn completed(&self) -> Vec<Arc<str>> {
        self.shared.lock().completed.clone()
    }
}

impl Default for EventRace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventRace {
    fn drop(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Some(unregister) = entry.unregister.take() {
                unregister();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_empty_race_resolves_immediately() {
        let mut race = EventRace::new();
        assert_eq!(&*race.race().await, "");
        assert!(race.completed().is_empty());
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let a: Channel<i32> = Channel::new("A");
        let b: Channel<i32> = Channel::new("B");

        let mut race = EventRace::new();
        race.wait_for(&a, |payload| *payload > 10);
        race.wait_for(&b, |payload| *payload > 10);

        a.notify(&5);
        assert!(race.winner().is_none());

        b.notify(&11);
        assert_eq!(&*race.race().await, "B");

        // B stays the winner even if A matches afterwards
        a.notify(&20);
        assert_eq!(&*race.race().await, "B");
    }

    #[tokio::test]
    async fn test_completed_keeps_growing_after_resolution() {
        let a: Channel<i32> = Channel::new("A");
        let b: Channel<i32> = Channel::new("B");

        let mut race = EventRace::new();
        race.wait_for_any(&a);
        race.wait_for_any(&b);

        b.notify(&0);
        assert_eq!(&*race.race().await, "B");
        assert_eq!(race.completed(), vec![Arc::from("B")]);

        a.notify(&0);
        a.notify(&0);
        assert_eq!(
            race.completed(),
            vec![Arc::<str>::from("B"), Arc::<str>::from("A")]
        );
    }

    #[tokio::test]
    async fn test_drop_unregisters_all_entries() {
        let a: Channel<i32> = Channel::new("A");
        let b: Channel<i32> = Channel::new("B");

        {
            let mut race = EventRace::new();
            race.wait_for_any(&a);
            race.wait_for_any(&b);
            assert_eq!(a.observer_count(), 1);
            assert_eq!(b.observer_count(), 1);

            a.notify(&0);
            assert_eq!(&*race.race().await, "A");
        }

        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_race_resolves_while_awaited() {
        let a: Channel<i32> = Channel::new("A");

        let mut race = EventRace::new();
        race.wait_for(&a, |payload| *payload == 3);

        let task = tokio::spawn(async move { race.race().await });
        tokio::task::yield_now().await;

        a.notify(&1);
        a.notify(&3);

        assert_eq!(&*task.await.unwrap(), "A");
    }
}
