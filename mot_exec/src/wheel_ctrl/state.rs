//! Wheel controller state and operations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;

// Internal
use crate::elec_driver::{DigitalOutput, PwmOutput};
use crate::enc_driver::Encoder;
use crate::event::{Channel, EventRace, Observable, ObserverHandle};
use util::maths;

use super::{Params, WheelCtrlError, WheelMode, WheelSide};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pin capabilities driving one motor through its H-bridge.
pub struct WheelPins {
    /// First direction input.
    pub in_a: Box<dyn DigitalOutput>,

    /// Second direction input.
    pub in_b: Box<dyn DigitalOutput>,

    /// PWM enable input, sets the effective motor power.
    pub ena: Box<dyn PwmOutput>,
}

/// Controller for a single wheel.
///
/// A cheap clonable handle, all clones drive the same wheel.
pub struct WheelCtrl {
    shared: Arc<WheelShared>,
}

struct WheelShared {
    side: WheelSide,

    params: Params,

    encoder: Encoder,

    /// Current drive mode, as applied to the pins.
    mode: Observable<WheelMode>,

    /// Notified (with `true`) when the wheel trips stall detection.
    blocked: Channel<bool>,

    state: Mutex<WheelState>,

    pins: Mutex<WheelPins>,
}

struct WheelState {
    /// Commanded throttle, -100 to 100.
    throttle: f64,

    /// Throttle actually applied, chases `throttle` at the ramp rate.
    current_throttle: f64,

    /// Consecutive zero-speed samples seen while a throttle was commanded.
    block_count: u32,

    is_blocked: bool,

    /// Handle of the observer driving the ramp and stall detection off the
    /// encoder's speed channel.
    speed_observer: Option<ObserverHandle>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WheelCtrl {
    /// Initialise the controller for one wheel.
    ///
    /// Takes ownership of the wheel's encoder and motor pins. The controller
    /// registers itself on the encoder's speed channel, every speed sample
    /// advances the throttle ramp and the stall detector.
    pub fn new(side: WheelSide, encoder: Encoder, pins: WheelPins, params: Params) -> Self {
        let shared = Arc::new(WheelShared {
            side,
            params,
            encoder,
            mode: Observable::new(format!("wheel_{}_mode", side), WheelMode::Float),
            blocked: Channel::new(format!("wheel_{}_blocked", side)),
            state: Mutex::new(WheelState {
                throttle: 0.0,
                current_throttle: 0.0,
                block_count: 0,
                is_blocked: false,
                speed_observer: None,
            }),
            pins: Mutex::new(pins),
        });

        // Weak so the encoder's channel doesn't keep the wheel alive
        let weak = Arc::downgrade(&shared);
        let handle = shared.encoder.speed().register_observer(move |speed: &f64| {
            if let Some(shared) = weak.upgrade() {
                shared.on_speed(*speed);
            }
        });
        shared.state.lock().speed_observer = Some(handle);

        debug!("{} wheel controller initialised", side);

        WheelCtrl { shared }
    }

    /// Which side of the rover this wheel is on.
    pub fn side(&self) -> WheelSide {
        self.shared.side
    }

    /// The encoder measuring this wheel.
    pub fn encoder(&self) -> &Encoder {
        &self.shared.encoder
    }

    /// The drive mode observable.
    pub fn mode(&self) -> &Observable<WheelMode> {
        &self.shared.mode
    }

    /// The channel notified when the wheel trips stall detection.
    pub fn blocked(&self) -> &Channel<bool> {
        &self.shared.blocked
    }

    /// The commanded throttle.
    pub fn throttle(&self) -> f64 {
        self.shared.state.lock().throttle
    }

    /// The throttle actually applied right now.
    pub fn current_throttle(&self) -> f64 {
        self.shared.state.lock().current_throttle
    }

    /// True if the wheel has tripped stall detection and has not been
    /// released yet.
    pub fn is_blocked(&self) -> bool {
        self.shared.state.lock().is_blocked
    }

    /// Command a new throttle, without waiting for the ramp to reach it.
    ///
    /// The value is clamped to -100..=100. A single ramp step is applied
    /// immediately, further steps follow with each encoder speed sample.
    pub fn set_throttle(&self, throttle: f64) -> Result<(), WheelCtrlError> {
        let target = maths::clamp(&throttle, &-100.0, &100.0);

        {
            let mut state = self.shared.state.lock();
            if state.is_blocked {
                return Err(WheelCtrlError::Blocked(self.shared.side));
            }
            state.throttle = target;
        }

        self.shared.adapt_speed();
        Ok(())
    }

    /// Command a new throttle and wait for the ramp to reach it.
    ///
    /// Resolves once the applied throttle equals the target, or fails early
    /// if the wheel blocks while ramping.
    pub async fn accelerate(&self, throttle: f64) -> Result<(), WheelCtrlError> {
        let target = maths::clamp(&throttle, &-100.0, &100.0);

        {
            let mut state = self.shared.state.lock();
            if state.is_blocked {
                return Err(WheelCtrlError::Blocked(self.shared.side));
            }
            state.throttle = target;
        }

        // Register before the first ramp step so no sample is missed. The
        // predicate runs after the ramp observer in the same dispatch, so it
        // sees the post-step state of that sample.
        let mut race = EventRace::new();
        let shared = self.shared.clone();
        race.wait_for(self.shared.encoder.speed().channel(), move |_: &f64| {
            let state = shared.state.lock();
            !state.is_blocked && state.current_throttle == state.throttle
        });
        race.wait_for(&self.shared.blocked, |flag: &bool| *flag);

        self.shared.adapt_speed();
        if self.shared.state.lock().current_throttle == target {
            return Ok(());
        }

        let winner = race.race().await;
        if winner == self.shared.blocked.name() {
            Err(WheelCtrlError::Blocked(self.shared.side))
        } else {
            Ok(())
        }
    }

    /// Drive a distance in encoder ticks, in the direction implied by the
    /// sign of `throttle`, resolving once the encoder reports the wheel has
    /// covered it.
    ///
    /// The wheel is left running at the commanded throttle, callers stop or
    /// float it themselves.
    pub async fn go(&self, distance: i64, throttle: f64) -> Result<(), WheelCtrlError> {
        let throttle = maths::clamp(&throttle, &-100.0, &100.0);
        if distance == 0 || throttle == 0.0 {
            return Ok(());
        }

        let forward = throttle > 0.0;
        let offset = if forward {
            distance.abs()
        } else {
            -distance.abs()
        };
        let target_pos = self.shared.encoder.position().get() + offset;

        {
            let mut state = self.shared.state.lock();
            if state.is_blocked {
                return Err(WheelCtrlError::Blocked(self.shared.side));
            }
            state.throttle = throttle;
        }

        let mut race = EventRace::new();
        race.wait_for(self.shared.encoder.position().channel(), move |pos: &i64| {
            if forward {
                *pos >= target_pos
            } else {
                *pos <= target_pos
            }
        });
        race.wait_for(&self.shared.blocked, |flag: &bool| *flag);

        self.shared.adapt_speed();

        let winner = race.race().await;
        if winner == self.shared.blocked.name() {
            Err(WheelCtrlError::Blocked(self.shared.side))
        } else {
            Ok(())
        }
    }

    /// Brake the wheel to a standstill.
    ///
    /// Engages Brake, ramps the applied throttle down and waits until both
    /// the applied throttle and the measured speed are zero, then lets the
    /// wheel float. A blocked wheel is already floating, a no-op.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.is_blocked {
                return;
            }
            state.throttle = 0.0;
        }

        self.shared.mode.set(WheelMode::Brake);

        let mut race = EventRace::new();
        let shared = self.shared.clone();
        race.wait_for(self.shared.encoder.speed().channel(), move |speed: &f64| {
            *speed == 0.0 && shared.state.lock().current_throttle == 0.0
        });

        self.shared.adapt_speed();

        let done = self.shared.state.lock().current_throttle == 0.0
            && self.shared.encoder.speed().get() == 0.0;
        if !done {
            race.race().await;
        }

        self.shared.force_float();
    }

    /// Ramp the wheel down and let it spin out freely.
    ///
    /// Targets zero throttle, lets the ramp bring the applied throttle down
    /// with each speed sample, and resolves once both the applied throttle
    /// and the measured speed are zero (fast path if they already are), then
    /// cuts the drive. A blocked wheel is already floating, a no-op.
    pub async fn float(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.is_blocked {
                return;
            }
            state.throttle = 0.0;
        }

        let mut race = EventRace::new();
        let shared = self.shared.clone();
        race.wait_for(self.shared.encoder.speed().channel(), move |speed: &f64| {
            *speed == 0.0 && shared.state.lock().current_throttle == 0.0
        });

        self.shared.adapt_speed();

        let done = self.shared.state.lock().current_throttle == 0.0
            && self.shared.encoder.speed().get() == 0.0;
        if !done {
            race.race().await;
        }

        self.shared.force_float();
    }

    /// Clear a tripped stall so the wheel accepts commands again.
    pub fn release_block(&self) {
        let released = {
            let mut state = self.shared.state.lock();
            let was_blocked = state.is_blocked;
            state.is_blocked = false;
            state.block_count = 0;
            was_blocked
        };

        if released {
            info!("{} wheel block released", self.shared.side);
        }
    }

    /// Shut the wheel down: stop synthetic tick generation, float the motor
    /// and detach from the encoder.
    pub fn shutdown(&self) {
        let handle = self.shared.state.lock().speed_observer.take();
        if let Some(handle) = handle {
            self.shared.encoder.speed().unregister_observer(handle);
        }

        self.shared.encoder.shutdown();
        self.shared.apply_pins(WheelMode::Float, 0);
        self.shared.mode.set(WheelMode::Float);

        debug!("{} wheel controller shut down", self.shared.side);
    }
}

impl Clone for WheelCtrl {
    fn clone(&self) -> Self {
        WheelCtrl {
            shared: self.shared.clone(),
        }
    }
}

impl WheelShared {
    /// Advance the stall detector and the throttle ramp with a new speed
    /// sample.
    fn on_speed(&self, speed: f64) {
        let newly_blocked = {
            let mut state = self.state.lock();
            if state.is_blocked {
                return;
            }

            if speed == 0.0 && state.throttle != 0.0 {
                state.block_count += 1;
                if state.block_count >= self.params.max_block_count {
                    state.is_blocked = true;
                    state.throttle = 0.0;
                    state.current_throttle = 0.0;
                    state.block_count = 0;
                    true
                } else {
                    false
                }
            } else {
                // The counter only resets on actual motion or release_block
                if speed != 0.0 {
                    state.block_count = 0;
                }
                false
            }
        };

        if newly_blocked {
            warn!(
                "{} wheel commanded to move but measured no speed, floating the motor",
                self.side
            );
            self.force_float();
            self.blocked.notify(&true);
            return;
        }

        self.adapt_speed();
    }

    /// Apply one ramp step towards the commanded throttle.
    ///
    /// Updates the drive mode, the pins and (for a simulated encoder) the
    /// synthetic tick rate. No-op when the applied throttle is already on
    /// target.
    fn adapt_speed(&self) {
        let current = {
            let mut state = self.state.lock();
            if state.is_blocked {
                return;
            }

            let step = maths::clamp(
                &(state.throttle - state.current_throttle),
                &-self.params.max_acceleration,
                &self.params.max_acceleration,
            );
            if step == 0.0 {
                return;
            }

            state.current_throttle += step;
            state.current_throttle
        };

        // Brake is only released explicitly, never by the ramp
        let new_mode = if self.mode.get() == WheelMode::Brake {
            WheelMode::Brake
        } else if current > 0.0 {
            WheelMode::Forward
        } else if current < 0.0 {
            WheelMode::Backwards
        } else {
            WheelMode::Float
        };

        let duty = maths::clamp(
            &maths::lin_map((0.0, 100.0), (0.0, 255.0), current.abs()).round(),
            &0.0,
            &255.0,
        ) as u8;

        trace!(
            "{} wheel throttle -> {:.1} ({}, pwm {})",
            self.side,
            current,
            new_mode,
            duty
        );

        self.apply_pins(new_mode, duty);
        self.mode.set(new_mode);

        if self.encoder.simulated() {
            self.encoder
                .simulate_speed(current * self.params.sim_full_rate_tps / 100.0);
        }
    }

    /// Cut the drive: float pins, PWM off, synthetic rate zero, mode Float.
    fn force_float(&self) {
        self.apply_pins(WheelMode::Float, 0);
        if self.encoder.simulated() {
            self.encoder.simulate_speed(0.0);
        }
        self.mode.set(WheelMode::Float);
    }

    fn apply_pins(&self, mode: WheelMode, duty: u8) {
        let (in_a, in_b) = match mode {
            WheelMode::Forward => (true, false),
            WheelMode::Backwards => (false, true),
            WheelMode::Float => (false, false),
            WheelMode::Brake => (true, true),
        };

        let mut pins = self.pins.lock();
        pins.in_a.write(in_a);
        pins.in_b.write(in_b);
        pins.ena.write(duty);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::elec_driver::{PinFactory, SimPinFactory};
    use crate::enc_driver;

    const IN_A: u8 = 5;
    const IN_B: u8 = 6;
    const ENA: u8 = 13;

    /// A wheel on an unsimulated encoder: no tokio tasks are spawned, speed
    /// samples are driven by hand through the raw speed channel.
    fn manual_wheel() -> (WheelCtrl, crate::elec_driver::PinLevels) {
        let mut factory = SimPinFactory::new();
        let pins = WheelPins {
            in_a: factory.digital_output(IN_A).unwrap(),
            in_b: factory.digital_output(IN_B).unwrap(),
            ena: factory.pwm_output(ENA).unwrap(),
        };
        let encoder = Encoder::new(0, 17, 18, false, enc_driver::Params::default());
        let wheel = WheelCtrl::new(WheelSide::Left, encoder, pins, Params::default());
        (wheel, factory.levels())
    }

    /// A wheel on a simulated encoder, ticking under paused tokio time.
    fn sim_wheel(side: WheelSide) -> WheelCtrl {
        let mut factory = SimPinFactory::new();
        let pins = WheelPins {
            in_a: factory.digital_output(IN_A).unwrap(),
            in_b: factory.digital_output(IN_B).unwrap(),
            ena: factory.pwm_output(ENA).unwrap(),
        };
        let encoder = Encoder::new(0, 17, 18, true, enc_driver::Params::default());
        WheelCtrl::new(side, encoder, pins, Params::default())
    }

    fn notify_speed(wheel: &WheelCtrl, speed: f64) {
        wheel.encoder().speed().channel().notify(&speed);
    }

    #[test]
    fn test_ramp_is_acceleration_limited() {
        let (wheel, levels) = manual_wheel();

        wheel.set_throttle(100.0).unwrap();
        assert_eq!(wheel.current_throttle(), 40.0);
        assert_eq!(*levels.lock().get(&ENA).unwrap(), 102);
        assert_eq!(*levels.lock().get(&IN_A).unwrap(), 1);
        assert_eq!(*levels.lock().get(&IN_B).unwrap(), 0);
        assert_eq!(wheel.mode().get(), WheelMode::Forward);

        notify_speed(&wheel, 1.0);
        assert_eq!(wheel.current_throttle(), 80.0);
        assert_eq!(*levels.lock().get(&ENA).unwrap(), 204);

        notify_speed(&wheel, 2.0);
        assert_eq!(wheel.current_throttle(), 100.0);
        assert_eq!(*levels.lock().get(&ENA).unwrap(), 255);

        // Already on target, further samples change nothing
        notify_speed(&wheel, 2.0);
        assert_eq!(wheel.current_throttle(), 100.0);
    }

    #[test]
    fn test_ramp_never_overshoots() {
        let (wheel, _levels) = manual_wheel();

        wheel.set_throttle(30.0).unwrap();
        assert_eq!(wheel.current_throttle(), 30.0);

        wheel.set_throttle(-30.0).unwrap();
        assert_eq!(wheel.current_throttle(), -10.0);
        assert_eq!(wheel.mode().get(), WheelMode::Backwards);

        notify_speed(&wheel, 0.5);
        assert_eq!(wheel.current_throttle(), -30.0);
    }

    #[test]
    fn test_throttle_is_clamped() {
        let (wheel, _levels) = manual_wheel();

        wheel.set_throttle(250.0).unwrap();
        assert_eq!(wheel.throttle(), 100.0);

        wheel.set_throttle(-250.0).unwrap();
        assert_eq!(wheel.throttle(), -100.0);
    }

    #[test]
    fn test_stall_trips_after_five_zero_samples() {
        let (wheel, levels) = manual_wheel();

        let blocked_seen = Arc::new(Mutex::new(0));
        let seen = blocked_seen.clone();
        wheel.blocked().register_observer(move |_: &bool| {
            *seen.lock() += 1;
        });

        wheel.set_throttle(60.0).unwrap();

        for _ in 0..4 {
            notify_speed(&wheel, 0.0);
        }
        assert!(!wheel.is_blocked());
        assert_eq!(*blocked_seen.lock(), 0);

        notify_speed(&wheel, 0.0);
        assert!(wheel.is_blocked());
        assert_eq!(*blocked_seen.lock(), 1);
        assert_eq!(wheel.throttle(), 0.0);
        assert_eq!(wheel.current_throttle(), 0.0);
        assert_eq!(wheel.mode().get(), WheelMode::Float);
        assert_eq!(*levels.lock().get(&ENA).unwrap(), 0);

        // Commands are rejected until the block is released
        assert!(matches!(
            wheel.set_throttle(20.0),
            Err(WheelCtrlError::Blocked(WheelSide::Left))
        ));

        wheel.release_block();
        wheel.set_throttle(20.0).unwrap();
        assert_eq!(wheel.current_throttle(), 20.0);
    }

    #[test]
    fn test_stall_counter_resets_on_motion() {
        let (wheel, _levels) = manual_wheel();

        wheel.set_throttle(60.0).unwrap();

        for _ in 0..4 {
            notify_speed(&wheel, 0.0);
        }
        notify_speed(&wheel, 0.7);

        for _ in 0..4 {
            notify_speed(&wheel, 0.0);
        }
        assert!(!wheel.is_blocked());

        notify_speed(&wheel, 0.0);
        assert!(wheel.is_blocked());
    }

    #[test]
    fn test_zero_speed_without_command_is_not_a_stall() {
        let (wheel, _levels) = manual_wheel();

        for _ in 0..10 {
            notify_speed(&wheel, 0.0);
        }
        assert!(!wheel.is_blocked());
    }

    #[tokio::test]
    async fn test_float_ramps_down_and_waits_for_standstill() {
        let (wheel, levels) = manual_wheel();

        wheel.set_throttle(80.0).unwrap();
        notify_speed(&wheel, 1.0);
        assert_eq!(wheel.current_throttle(), 80.0);

        let floater = wheel.clone();
        let task = tokio::spawn(async move { floater.float().await });
        tokio::task::yield_now().await;

        // Float targets zero but the applied throttle still steps down at
        // the ramp rate
        assert_eq!(wheel.throttle(), 0.0);
        assert_eq!(wheel.current_throttle(), 40.0);

        notify_speed(&wheel, 2.0);
        assert_eq!(wheel.current_throttle(), 0.0);

        // Not resolved until the wheel actually stands still
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        notify_speed(&wheel, 0.0);
        task.await.unwrap();
        assert_eq!(wheel.mode().get(), WheelMode::Float);
        assert_eq!(*levels.lock().get(&ENA).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accelerate_reaches_target() {
        let wheel = sim_wheel(WheelSide::Right);

        wheel.accelerate(80.0).await.unwrap();
        assert_eq!(wheel.current_throttle(), 80.0);
        assert_eq!(wheel.mode().get(), WheelMode::Forward);
        assert!(wheel.encoder().position().get() > 0);

        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accelerate_fast_path() {
        let wheel = sim_wheel(WheelSide::Right);

        // Within one ramp step of standstill, resolves without any samples
        wheel.accelerate(-35.0).await.unwrap();
        assert_eq!(wheel.current_throttle(), -35.0);
        assert_eq!(wheel.mode().get(), WheelMode::Backwards);

        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_brakes_then_floats() {
        let wheel = sim_wheel(WheelSide::Left);

        wheel.accelerate(80.0).await.unwrap();
        wheel.stop().await;

        assert_eq!(wheel.current_throttle(), 0.0);
        assert_eq!(wheel.encoder().speed().get(), 0.0);
        assert_eq!(wheel.mode().get(), WheelMode::Float);

        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_go_covers_distance() {
        let wheel = sim_wheel(WheelSide::Left);

        wheel.go(100, 60.0).await.unwrap();
        assert!(wheel.encoder().position().get() >= 100);

        wheel.float().await;
        assert_eq!(wheel.encoder().speed().get(), 0.0);

        let here = wheel.encoder().position().get();
        wheel.go(50, -60.0).await.unwrap();
        assert!(wheel.encoder().position().get() <= here - 50);

        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accelerate_fails_when_blocked_mid_ramp() {
        // A shallow ramp, so stall detection trips before the throttle
        // reaches its target
        let mut factory = SimPinFactory::new();
        let pins = WheelPins {
            in_a: factory.digital_output(IN_A).unwrap(),
            in_b: factory.digital_output(IN_B).unwrap(),
            ena: factory.pwm_output(ENA).unwrap(),
        };
        let encoder = Encoder::new(0, 17, 18, true, enc_driver::Params::default());
        let params = Params {
            max_acceleration: 10.0,
            ..Params::default()
        };
        let wheel = WheelCtrl::new(WheelSide::Right, encoder, pins, params);

        // Paused time never advances while this task is runnable, so the
        // hand-driven zero samples cannot interleave with synthetic ticks
        let driver = wheel.clone();
        let task = tokio::spawn(async move {
            for _ in 0..5 {
                tokio::task::yield_now().await;
                notify_speed(&driver, 0.0);
            }
        });

        let result = wheel.accelerate(90.0).await;
        task.await.unwrap();

        assert!(matches!(result, Err(WheelCtrlError::Blocked(WheelSide::Right))));
        assert!(wheel.is_blocked());

        wheel.shutdown();
    }
}
