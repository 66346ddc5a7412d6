//! Rover state, odometry integration and wheel composition

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use parking_lot::Mutex;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

// Internal
use crate::event::{Channel, Observable, ObserverHandle};
use crate::wheel_ctrl::{WheelCtrl, WheelCtrlError, WheelSide};

use super::{Orientation, Params, Position};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Overall rover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoverState {
    Normal,
    Blocked,
}

/// Events emitted on the rover's event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoverEvent {
    WheelBlocked(WheelSide),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Controller for the whole rover.
///
/// Owns both wheel controllers, integrates their encoder deltas into a pose
/// estimate and implements the navigation algorithms. A cheap clonable
/// handle.
pub struct RoverCtrl {
    pub(super) shared: Arc<RoverShared>,
}

pub(super) struct RoverShared {
    pub(super) params: Params,

    pub(super) left: WheelCtrl,
    pub(super) right: WheelCtrl,

    /// Pose estimate, in encoder ticks in the odometry frame.
    pub(super) position: Observable<Position>,

    /// Accumulated heading estimate.
    pub(super) orientation: Observable<Orientation>,

    /// Ground speed estimate in m/s.
    pub(super) speed: Observable<f64>,

    pub(super) state: Observable<RoverState>,

    pub(super) events: Channel<RoverEvent>,

    odom: Mutex<OdomState>,

    observers: Mutex<RoverObservers>,
}

/// Wheel positions at the previous integration step.
struct OdomState {
    last_left: i64,
    last_right: i64,
}

struct RoverObservers {
    left_position: Option<ObserverHandle>,
    right_position: Option<ObserverHandle>,
    left_blocked: Option<ObserverHandle>,
    right_blocked: Option<ObserverHandle>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RoverCtrl {
    /// Initialise the rover over its two wheel controllers.
    ///
    /// Registers odometry observers on both encoders' position channels and
    /// block observers on both wheels' blocked channels. The pose starts at
    /// the origin with orientation zero.
    pub fn new(left: WheelCtrl, right: WheelCtrl, params: Params) -> Self {
        let odom = OdomState {
            last_left: left.encoder().position().get(),
            last_right: right.encoder().position().get(),
        };

        let shared = Arc::new(RoverShared {
            params,
            left,
            right,
            position: Observable::new("rover_position", Position::origin()),
            orientation: Observable::new("rover_orientation", Orientation::from_radians(0.0)),
            speed: Observable::new("rover_speed", 0.0),
            state: Observable::new("rover_state", RoverState::Normal),
            events: Channel::new("rover_events"),
            odom: Mutex::new(odom),
            observers: Mutex::new(RoverObservers {
                left_position: None,
                right_position: None,
                left_blocked: None,
                right_blocked: None,
            }),
        });

        // Weak so the wheels' channels don't keep the rover alive
        {
            let mut observers = shared.observers.lock();

            let weak = Arc::downgrade(&shared);
            observers.left_position =
                Some(shared.left.encoder().position().register_observer(
                    move |_: &i64| {
                        if let Some(shared) = weak.upgrade() {
                            shared.update_position();
                        }
                    },
                ));

            let weak = Arc::downgrade(&shared);
            observers.right_position =
                Some(shared.right.encoder().position().register_observer(
                    move |_: &i64| {
                        if let Some(shared) = weak.upgrade() {
                            shared.update_position();
                        }
                    },
                ));

            let weak = Arc::downgrade(&shared);
            observers.left_blocked = Some(shared.left.blocked().register_observer(
                move |_: &bool| {
                    if let Some(shared) = weak.upgrade() {
                        shared.handle_blocking(WheelSide::Left);
                    }
                },
            ));

            let weak = Arc::downgrade(&shared);
            observers.right_blocked = Some(shared.right.blocked().register_observer(
                move |_: &bool| {
                    if let Some(shared) = weak.upgrade() {
                        shared.handle_blocking(WheelSide::Right);
                    }
                },
            ));
        }

        debug!("Rover controller initialised");

        RoverCtrl { shared }
    }

    pub fn left(&self) -> &WheelCtrl {
        &self.shared.left
    }

    pub fn right(&self) -> &WheelCtrl {
        &self.shared.right
    }

    /// The pose position observable, in ticks.
    pub fn position(&self) -> &Observable<Position> {
        &self.shared.position
    }

    /// The accumulated heading observable.
    pub fn orientation(&self) -> &Observable<Orientation> {
        &self.shared.orientation
    }

    /// The ground speed observable, in m/s.
    pub fn speed(&self) -> &Observable<f64> {
        &self.shared.speed
    }

    pub fn state(&self) -> &Observable<RoverState> {
        &self.shared.state
    }

    /// The event channel, notified when a wheel blocks.
    pub fn events(&self) -> &Channel<RoverEvent> {
        &self.shared.events
    }

    /// The average of both wheels' commanded throttles.
    pub fn current_throttle(&self) -> f64 {
        (self.shared.left.throttle() + self.shared.right.throttle()) / 2.0
    }

    /// Reset the pose estimate wholesale, e.g. at mission start.
    ///
    /// Discards any wheel movement not yet integrated.
    pub fn reset_pose(&self, position: Position, orientation: Orientation) {
        {
            let mut odom = self.shared.odom.lock();
            odom.last_left = self.shared.left.encoder().position().get();
            odom.last_right = self.shared.right.encoder().position().get();
        }
        self.shared.position.set(position);
        self.shared.orientation.set(orientation);
    }

    /// Accelerate both wheels to the given throttle.
    pub async fn accelerate(&self, throttle: f64) -> Result<(), WheelCtrlError> {
        let (left, right) = futures::join!(
            self.shared.left.accelerate(throttle),
            self.shared.right.accelerate(throttle)
        );
        left?;
        right?;
        Ok(())
    }

    /// Accelerate the wheels to individual throttles.
    pub async fn throttle(&self, left: f64, right: f64) -> Result<(), WheelCtrlError> {
        let (left, right) = futures::join!(
            self.shared.left.accelerate(left),
            self.shared.right.accelerate(right)
        );
        left?;
        right?;
        Ok(())
    }

    /// Brake both wheels to a standstill.
    pub async fn stop(&self) {
        futures::join!(self.shared.left.stop(), self.shared.right.stop());
        self.shared.speed.set(0.0);
    }

    /// Let both wheels spin out freely.
    pub async fn float(&self) {
        futures::join!(self.shared.left.float(), self.shared.right.float());
        self.shared.speed.set(0.0);
    }

    /// Drive a distance in ticks at the given throttle, then float.
    ///
    /// Distances below the minimal-distance dead-band are treated as already
    /// covered.
    pub async fn go(&self, distance: i64, throttle: f64) -> Result<(), WheelCtrlError> {
        if (distance.abs() as f64) < self.shared.params.min_distance_ticks {
            return Ok(());
        }

        let (left, right) = futures::join!(
            self.shared.left.go(distance, throttle),
            self.shared.right.go(distance, throttle)
        );
        self.float().await;
        left?;
        right?;
        Ok(())
    }

    /// Release a tripped stall on both wheels.
    pub fn release_block(&self) {
        self.shared.left.release_block();
        self.shared.right.release_block();
        self.shared.state.set(RoverState::Normal);
    }

    /// Stop the rover and shut both wheels down.
    pub async fn shutdown(&self) {
        self.stop().await;

        let observers = {
            let mut observers = self.shared.observers.lock();
            (
                observers.left_position.take(),
                observers.right_position.take(),
                observers.left_blocked.take(),
                observers.right_blocked.take(),
            )
        };
        if let Some(handle) = observers.0 {
            self.shared.left.encoder().position().unregister_observer(handle);
        }
        if let Some(handle) = observers.1 {
            self.shared.right.encoder().position().unregister_observer(handle);
        }
        if let Some(handle) = observers.2 {
            self.shared.left.blocked().unregister_observer(handle);
        }
        if let Some(handle) = observers.3 {
            self.shared.right.blocked().unregister_observer(handle);
        }

        self.shared.left.shutdown();
        self.shared.right.shutdown();

        debug!("Rover controller shut down");
    }
}

impl Clone for RoverCtrl {
    fn clone(&self) -> Self {
        RoverCtrl {
            shared: self.shared.clone(),
        }
    }
}

impl RoverShared {
    /// Integrate the wheel tick deltas since the last step into the pose.
    ///
    /// Standard differential-drive arc model: unequal deltas trace a
    /// circular arc around the instantaneous turn centre, equal deltas a
    /// straight segment.
    fn update_position(&self) {
        let (a, b) = {
            let mut odom = self.odom.lock();
            let left = self.left.encoder().position().get();
            let right = self.right.encoder().position().get();
            let a = (left - odom.last_left) as f64;
            let b = (right - odom.last_right) as f64;
            odom.last_left = left;
            odom.last_right = right;
            (a, b)
        };

        if a == 0.0 && b == 0.0 {
            return;
        }

        let width = self.params.axis_width_ticks();
        let theta = (a - b) / width;
        let radius = if theta != 0.0 {
            width * (a + b) / (2.0 * (a - b))
        } else {
            0.0
        };
        let dy = if theta != 0.0 {
            theta.sin() * radius
        } else if a.signum() == b.signum() {
            a.signum() * a.abs().min(b.abs())
        } else {
            a + b
        };
        let dx = (1.0 - theta.cos()) * radius;

        let angle = self.orientation.get().radians();
        let delta = FRAC_PI_2 - angle;
        let position = self.position.get();
        self.position.set(position.add(
            dy * angle.cos() + dx * delta.cos(),
            -dy * angle.sin() + dx * delta.sin(),
        ));
        self.orientation.set(Orientation::from_radians(angle + theta));

        let revs_per_s =
            (self.left.encoder().speed().get() + self.right.encoder().speed().get()) / 2.0;
        self.speed.set(revs_per_s * self.params.wheel_perimeter_m());
    }

    /// A wheel has tripped stall detection: float everything and tell the
    /// world.
    fn handle_blocking(&self, side: WheelSide) {
        warn!("{} wheel blocked, floating the rover", side);
        self.state.set(RoverState::Blocked);

        // The blocked wheel itself is already floating, this floats the
        // other one without blocking the notification dispatch
        let left = self.left.clone();
        let right = self.right.clone();
        tokio::spawn(async move {
            futures::join!(left.float(), right.float());
        });

        self.events.notify(&RoverEvent::WheelBlocked(side));
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::elec_driver::{PinFactory, SimPinFactory};
    use crate::enc_driver::{self, Encoder};
    use crate::wheel_ctrl::{self, WheelPins};

    /// A rover on unsimulated encoders: odometry is driven by hand through
    /// the encoder position observables.
    fn manual_rover() -> RoverCtrl {
        let mut factory = SimPinFactory::new();
        let mut wheel = |side, pins: (u8, u8, u8), enc: (u8, u8)| {
            let pins = WheelPins {
                in_a: factory.digital_output(pins.0).unwrap(),
                in_b: factory.digital_output(pins.1).unwrap(),
                ena: factory.pwm_output(pins.2).unwrap(),
            };
            let encoder = Encoder::new(
                side as usize,
                enc.0,
                enc.1,
                false,
                enc_driver::Params::default(),
            );
            WheelCtrl::new(side, encoder, pins, wheel_ctrl::Params::default())
        };

        let left = wheel(WheelSide::Left, (5, 6, 13), (17, 18));
        let right = wheel(WheelSide::Right, (7, 8, 12), (22, 23));
        RoverCtrl::new(left, right, Params::default())
    }

    #[test]
    fn test_straight_line_odometry() {
        let rover = manual_rover();

        rover.left().encoder().speed().set(1.0);
        rover.right().encoder().speed().set(1.0);
        rover.left().encoder().position().set(10);
        rover.right().encoder().position().set(10);

        let position = rover.position().get();
        assert!((position.x - 10.0).abs() < 0.1, "x = {}", position.x);
        assert!(position.y.abs() < 0.2, "y = {}", position.y);
        assert!(rover.orientation().get().radians().abs() < 1e-12);

        // Ground speed is the average wheel rate times the perimeter
        let expected = Params::default().wheel_perimeter_m();
        assert!((rover.speed().get() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_point_turn_odometry() {
        let rover = manual_rover();

        rover.left().encoder().position().set(10);
        rover.right().encoder().position().set(-10);

        let expected = 2.0 * 10.0 / Params::default().axis_width_ticks();
        assert!((rover.orientation().get().radians() - expected).abs() < 1e-9);

        let position = rover.position().get();
        assert!(position.x.abs() < 0.01, "x = {}", position.x);
        assert!(position.y.abs() < 0.2, "y = {}", position.y);
    }

    #[test]
    fn test_reset_pose_discards_pending_deltas() {
        let rover = manual_rover();

        rover.left().encoder().position().set(50);
        rover.right().encoder().position().set(30);

        rover.reset_pose(Position::origin(), Orientation::from_radians(0.0));
        assert_eq!(rover.position().get(), Position::origin());

        // Equal deltas from the reset point: straight line again
        rover.left().encoder().position().set(55);
        rover.right().encoder().position().set(35);
        assert!(rover.orientation().get().radians().abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_wheel_block_propagates() {
        let rover = manual_rover();

        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        rover.events().register_observer(move |event: &RoverEvent| {
            seen.lock().push(*event);
        });

        rover.left().set_throttle(60.0).unwrap();
        for _ in 0..5 {
            rover.left().encoder().speed().channel().notify(&0.0);
        }

        assert_eq!(rover.state().get(), RoverState::Blocked);
        assert_eq!(*events.lock(), vec![RoverEvent::WheelBlocked(WheelSide::Left)]);
        assert!(rover.left().is_blocked());

        // Let the spawned float of both wheels run
        tokio::task::yield_now().await;
        assert_eq!(rover.right().current_throttle(), 0.0);

        rover.release_block();
        assert_eq!(rover.state().get(), RoverState::Normal);
        assert!(!rover.left().is_blocked());
    }
}
