//! Implementation of the encoder state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

// Internal
use super::Params;
use crate::event::Observable;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A quadrature encoder attached to one wheel.
///
/// `Encoder` is a cheap clonable handle onto shared state. The `position`
/// and `speed` observables are the encoder's outputs; `tick` (and the decode
/// path feeding it) is its input.
///
/// All methods which arm timers (`tick`, `simulate_speed`) must be called
/// from within a tokio runtime.
#[derive(Clone)]
pub struct Encoder {
    shared: Arc<EncoderShared>,
}

struct EncoderShared {
    /// Encoder number, assigned by the constructor's caller.
    id: usize,

    /// True if this encoder synthesises ticks instead of decoding a live
    /// stream.
    simulated: bool,

    /// Bit position of the first quadrature pin in the level bitmask.
    pin_a: u8,

    /// Bit position of the second quadrature pin in the level bitmask.
    pin_b: u8,

    params: Params,

    /// Signed tick count.
    position: Observable<i64>,

    /// Instantaneous speed in wheel revolutions per second.
    speed: Observable<f64>,

    inner: Mutex<EncoderInner>,
}

#[derive(Default)]
struct EncoderInner {
    /// Timestamp of the last tick, microseconds.
    last_tick_us: Option<i64>,

    /// Previous 2-bit Gray code state of the quadrature pins.
    quad_state: u8,

    /// Timer zeroing the speed when no tick arrives in time.
    zero_speed_task: Option<JoinHandle<()>>,

    /// Synthetic tick generator.
    sim_task: Option<JoinHandle<()>>,

    /// True once a zero rate has been simulated, so generation can stop.
    zero_rate_sent: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Encoder {
    /// Create a new encoder.
    ///
    /// `pin_a` and `pin_b` are the bit positions of the two quadrature pins
    /// in the notifier's level bitmask. `simulated` should come from the pin
    /// factory and enables [`Encoder::simulate_speed`].
    pub fn new(id: usize, pin_a: u8, pin_b: u8, simulated: bool, params: Params) -> Self {
        Encoder {
            shared: Arc::new(EncoderShared {
                id,
                simulated,
                pin_a,
                pin_b,
                params,
                position: Observable::new(format!("enc{} position", id), 0),
                speed: Observable::new(format!("enc{} speed", id), 0.0),
                inner: Mutex::new(EncoderInner::default()),
            }),
        }
    }

    /// The encoder number.
    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// True if this encoder synthesises its own ticks.
    pub fn simulated(&self) -> bool {
        self.shared.simulated
    }

    /// The position observable, in signed ticks.
    pub fn position(&self) -> &Observable<i64> {
        &self.shared.position
    }

    /// The speed observable, in wheel revolutions per second.
    pub fn speed(&self) -> &Observable<f64> {
        &self.shared.speed
    }

    pub(super) fn pins(&self) -> (u8, u8) {
        (self.shared.pin_a, self.shared.pin_b)
    }

    pub(super) fn quad_state(&self) -> u8 {
        self.shared.inner.lock().quad_state
    }

    pub(super) fn set_quad_state(&self, state: u8) {
        self.shared.inner.lock().quad_state = state;
    }

    /// Handle a single tick of the wheel.
    ///
    /// `delta` gives the direction, positive is forward, negative backwards.
    /// `time_us` is the sample timestamp in microseconds. The speed is the
    /// tick rate over the interval since the previous tick, zero on the very
    /// first tick, and is published on every sample even when the value did
    /// not change: the wheel controller's ramp and stall detection advance
    /// per sample, not per change. Each tick re-arms a timeout which zeroes
    /// the speed if no further tick arrives, modelling a stopped wheel.
    pub fn tick(&self, delta: i64, time_us: i64) {
        let (speed, old_task) = {
            let mut inner = self.shared.inner.lock();

            let time_diff = match inner.last_tick_us {
                Some(last) => time_us - last,
                None => 0,
            };
            inner.last_tick_us = Some(time_us);

            let speed = if time_diff != 0 {
                delta as f64 / time_diff as f64 * 1e6 / self.shared.params.ticks_per_rev
            }
            else {
                0.0
            };

            (speed, inner.zero_speed_task.take())
        };

        if let Some(task) = old_task {
            task.abort();
        }

        // The inner lock must be released here: observers of these
        // observables call back into the encoder.
        if delta != 0 {
            self.shared.position.set(self.shared.position.get() + delta);
        }
        self.shared.speed.force_set(speed);

        trace!(
            "Encoder {}: pos {}, speed {:.3} rev/s",
            self.shared.id,
            self.shared.position.get(),
            speed
        );

        let encoder = self.clone();
        let timeout = Duration::from_millis(self.shared.params.zero_speed_timeout_ms);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            encoder.shared.speed.set(0.0);
        });
        self.shared.inner.lock().zero_speed_task = Some(task);
    }

    /// Generate synthetic ticks approximating the given rate.
    ///
    /// Only active on simulated encoders, a no-op otherwise. Any previous
    /// generator is cancelled first. After the rate has returned to zero one
    /// zero-delta generator keeps running, so that observers see the speed
    /// reach zero; a second zero-rate request stops generation entirely.
    pub fn simulate_speed(&self, ticks_per_s: f64) {
        if !self.shared.simulated {
            return;
        }

        let (old_task, run) = {
            let mut inner = self.shared.inner.lock();
            let run = ticks_per_s != 0.0 || !inner.zero_rate_sent;
            inner.zero_rate_sent = ticks_per_s == 0.0;
            (inner.sim_task.take(), run)
        };

        if let Some(task) = old_task {
            task.abort();
        }
        if !run {
            return;
        }

        let period_ms = self.shared.params.sim_sample_period_ms;
        let delta = (ticks_per_s * period_ms as f64 / 1000.0).round() as i64;

        let encoder = self.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
            // The first interval tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let time_us = {
                    let inner = encoder.shared.inner.lock();
                    inner.last_tick_us.unwrap_or(0) + (period_ms as i64) * 1000
                };
                encoder.tick(delta, time_us);
            }
        });
        self.shared.inner.lock().sim_task = Some(task);
    }

    /// Stop all timers owned by this encoder.
    pub fn shutdown(&self) {
        let (zero_task, sim_task) = {
            let mut inner = self.shared.inner.lock();
            (inner.zero_speed_task.take(), inner.sim_task.take())
        };
        if let Some(task) = zero_task {
            task.abort();
        }
        if let Some(task) = sim_task {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tick_updates_position_and_speed() {
        let enc = Encoder::new(0, 17, 18, false, Params::default());

        // First tick: position moves, speed still zero
        enc.tick(1, 1_000_000);
        assert_eq!(enc.position().get(), 1);
        assert_eq!(enc.speed().get(), 0.0);

        // 1 tick per 2 ms = 500 ticks/s
        enc.tick(1, 1_002_000);
        assert_eq!(enc.position().get(), 2);
        let expected = 500.0 / Params::default().ticks_per_rev;
        assert!((enc.speed().get() - expected).abs() < 1e-9);

        enc.tick(-1, 1_004_000);
        assert_eq!(enc.position().get(), 1);
        assert!(enc.speed().get() < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_sample_notifies_speed() {
        let enc = Encoder::new(0, 17, 18, false, Params::default());
        let samples = Arc::new(Mutex::new(0));

        let seen = samples.clone();
        enc.speed().register_observer(move |_: &f64| {
            *seen.lock() += 1;
        });

        // A constant tick rate repeats the same speed value, but every
        // sample must still reach the observers
        enc.tick(1, 1_000);
        enc.tick(1, 4_000);
        enc.tick(1, 7_000);
        enc.tick(1, 10_000);

        assert_eq!(*samples.lock(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_decays_to_zero_after_timeout() {
        let enc = Encoder::new(0, 17, 18, false, Params::default());

        enc.tick(1, 0);
        enc.tick(1, 2_000);
        assert!(enc.speed().get() > 0.0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(enc.speed().get(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_speed_generates_ticks() {
        let enc = Encoder::new(0, 17, 18, true, Params::default());

        enc.simulate_speed(1000.0);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // 3 ticks per 3 ms sample, ~33 samples
        let pos = enc.position().get();
        assert!(pos > 80 && pos < 110, "position was {}", pos);
        assert!(enc.speed().get() > 0.0);

        // A zero rate keeps one generator running so the speed is seen to
        // drop to zero
        enc.simulate_speed(0.0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(enc.speed().get(), 0.0);
        let pos = enc.position().get();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(enc.position().get(), pos);

        enc.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_speed_is_noop_on_real_hardware() {
        let enc = Encoder::new(0, 17, 18, false, Params::default());

        enc.simulate_speed(1000.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(enc.position().get(), 0);
    }
}
