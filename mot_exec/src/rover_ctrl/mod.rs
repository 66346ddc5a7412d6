//! # Rover control module
//!
//! Composes the two wheel controllers into one rover: integrates their
//! encoder deltas into a pose estimate (position, orientation, speed) and
//! implements the navigation algorithms on top of it. When either wheel
//! trips stall detection the rover floats both wheels, switches to the
//! Blocked state and emits an event naming the offending wheel.
//!
//! Positions are measured in encoder ticks in the odometry frame, headings
//! in radians accumulated without normalisation.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod nav;
mod params;
mod pose;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use nav::{throttle_from_joystick, TurnDirection};
pub use params::Params;
pub use pose::{meters, MetricCoordinates, Orientation, Position};
pub use state::{RoverCtrl, RoverEvent, RoverState};
