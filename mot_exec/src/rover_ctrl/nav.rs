//! Navigation algorithms: turning, aligning and point-to-point driving

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};

// Internal
use crate::event::EventRace;
use crate::wheel_ctrl::{WheelCtrl, WheelCtrlError};
use util::maths;

use super::state::{RoverShared, RoverState};
use super::{Orientation, Position, RoverCtrl};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Which way to rotate the rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TurnDirection {
    pub fn other(&self) -> Self {
        match self {
            TurnDirection::Left => TurnDirection::Right,
            TurnDirection::Right => TurnDirection::Left,
        }
    }
}

impl RoverCtrl {
    /// Start rotating in the given direction.
    ///
    /// The wheel on the inside of the turn is slowed (or reversed), the
    /// outer one sped up by the same spread around the current average
    /// throttle. From standstill this turns on the spot. Resolves once both
    /// ramps have settled, the rover keeps rotating afterwards.
    pub async fn turn(&self, direction: TurnDirection) -> Result<(), WheelCtrlError> {
        let (lower, higher) = self.shared.turn_throttles();
        debug!(
            "Turning {:?}, throttles ({:.0}, {:.0})",
            direction, lower, higher
        );

        let (inner, outer) = futures::join!(
            self.shared.wheel(direction).accelerate(lower),
            self.shared.wheel(direction.other()).accelerate(higher)
        );
        inner?;
        outer?;
        Ok(())
    }

    /// Rotate by the given angle, then float.
    ///
    /// Angles below the dead-band are treated as already reached. A stall of
    /// either wheel ends the turn early and floats the rover, leaving it
    /// Blocked; callers observe the rover state and event channels for the
    /// fault.
    pub async fn turn_relative(&self, angle: Orientation) {
        if angle.radians().abs() < self.shared.params.min_turn_angle_rad {
            debug!("Turn by {} below dead-band, skipping", angle);
            return;
        }

        let destination = self.orientation().get().add(angle);
        let epsilon = Orientation::from_radians(self.shared.params.min_turn_angle_rad);

        let mut race = EventRace::new();
        race.wait_for(self.orientation().channel(), move |o: &Orientation| {
            o.is_close_to(destination, epsilon)
        });
        race.wait_for(self.state().channel(), |state: &RoverState| {
            *state == RoverState::Blocked
        });

        let direction = if angle.radians() > 0.0 {
            TurnDirection::Right
        } else {
            TurnDirection::Left
        };

        match self.turn(direction).await {
            Ok(()) => {
                let winner = race.race().await;
                if winner == self.state().name() {
                    warn!("Turn interrupted, rover blocked");
                }
            }
            Err(e) => warn!("Turn aborted: {}", e),
        }

        self.float().await;
        debug!("Turn finished at {}", self.orientation().get());
    }

    /// Rotate to the given absolute orientation, then float.
    pub async fn turn_to(&self, destination: Orientation) {
        let diff = self.orientation().get().difference_to(destination);
        self.turn_relative(diff).await
    }

    /// Drive to the given position, then float.
    ///
    /// Positions within the minimal distance are treated as already reached.
    /// While driving, a heading controller re-steers on every orientation
    /// change: large errors trigger a hard turn, small ones bias the
    /// throttle of each wheel proportionally. A stall of either wheel ends
    /// the wait early, leaving the rover Blocked.
    pub async fn goto(&self, target: Position) {
        let distance = self.position().get().distance_to(target);
        if distance > self.shared.params.min_distance_ticks {
            debug!(
                "goto {}, distance {:.0}, from {} {}",
                target,
                distance,
                self.position().get(),
                self.orientation().get()
            );

            let min_distance = self.shared.params.min_distance_ticks;
            let mut race = EventRace::new();
            race.wait_for(self.position().channel(), move |position: &Position| {
                position.distance_to(target) < min_distance
            });
            race.wait_for(self.state().channel(), |state: &RoverState| {
                *state == RoverState::Blocked
            });

            let shared = self.shared.clone();
            let handle = self
                .orientation()
                .register_observer(move |orientation: &Orientation| {
                    shared.steer_towards(*orientation, target);
                });

            // From standstill no orientation change ever arrives, kick the
            // steering once by hand
            self.shared.steer_towards(self.orientation().get(), target);

            let winner = race.race().await;
            if winner == self.state().name() {
                warn!("goto interrupted, rover blocked");
            }

            self.orientation().unregister_observer(handle);
        }

        self.float().await;
        debug!(
            "goto arrived at {} {}",
            self.position().get(),
            self.orientation().get()
        );
    }
}

impl RoverShared {
    fn wheel(&self, direction: TurnDirection) -> &WheelCtrl {
        match direction {
            TurnDirection::Left => &self.left,
            TurnDirection::Right => &self.right,
        }
    }

    /// The (lower, higher) throttle pair for a turn around the current
    /// average commanded throttle.
    fn turn_throttles(&self) -> (f64, f64) {
        let current = (self.left.throttle() + self.right.throttle()) / 2.0;
        if current.abs() < 50.0 {
            (-50.0, 50.0)
        } else {
            let higher = (current + 25.0).min(100.0);
            let lower = (higher - 50.0).max(-100.0);
            (lower, higher)
        }
    }

    /// One heading-control step towards `target`.
    fn steer_towards(&self, orientation: Orientation, target: Position) {
        let position = self.position.get();
        let distance = position.distance_to(target);

        // Inside the arrival dead-band stop driving instead of steering, so
        // that a close pass cannot turn into a hard turn around the target
        if distance < self.params.min_distance_ticks {
            let _ = self.left.set_throttle(0.0);
            let _ = self.right.set_throttle(0.0);
            return;
        }

        let heading = Orientation::from_radians(position.angle_to(target));
        let error = orientation.difference_to(heading).radians();

        // Rejections from a blocked wheel are dropped, the surrounding race
        // ends on the state channel instead
        if error.abs() > self.params.hard_turn_threshold_rad {
            let direction = if error > 0.0 {
                TurnDirection::Right
            } else {
                TurnDirection::Left
            };
            let (lower, higher) = self.turn_throttles();
            let _ = self.wheel(direction).set_throttle(lower);
            let _ = self.wheel(direction.other()).set_throttle(higher);
        } else {
            let throttle = maths::clamp(
                &distance.sqrt(),
                &self.params.min_goto_throttle,
                &self.params.max_goto_throttle,
            );
            let _ = self
                .left
                .set_throttle(throttle + error * self.params.heading_gain);
            let _ = self
                .right
                .set_throttle(throttle - error * self.params.heading_gain);
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Mix joystick deflections (percent, y ahead, x to the right) into a
/// (left, right) wheel throttle pair.
///
/// Pure y drives straight, pure x rotates on the spot, combined deflections
/// are shifted so that neither wheel is commanded beyond ±100.
pub fn throttle_from_joystick(x: f64, y: f64) -> (f64, f64) {
    let offset = (y + x - 100.0).max(0.0) + (y + x + 100.0).min(0.0);
    (y + x - offset, y - x - offset)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
