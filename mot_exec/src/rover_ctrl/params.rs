//! Parameters for the rover control module.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::f64::consts::PI;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Rover control parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Distance between the two wheel contact points (mm).
    pub axis_width_mm: f64,

    /// Wheel diameter (mm).
    pub wheel_diameter_mm: f64,

    /// Encoder ticks per wheel revolution.
    pub ticks_per_rev: f64,

    /// Turns smaller than this are treated as already satisfied (rad).
    pub min_turn_angle_rad: f64,

    /// Moves shorter than this are treated as already satisfied (ticks).
    pub min_distance_ticks: f64,

    /// Heading error above which `goto` switches from proportional steering
    /// to a hard turn (rad).
    pub hard_turn_threshold_rad: f64,

    /// Throttle bias applied per radian of heading error while driving
    /// towards a target.
    pub heading_gain: f64,

    /// Throttle limits for the distance-scaled `goto` drive.
    pub min_goto_throttle: f64,
    pub max_goto_throttle: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Encoder ticks per millimetre of wheel travel.
    pub fn ticks_per_mm(&self) -> f64 {
        self.ticks_per_rev / (self.wheel_diameter_mm * PI)
    }

    /// The axis width expressed in encoder ticks.
    pub fn axis_width_ticks(&self) -> f64 {
        self.axis_width_mm * self.ticks_per_mm()
    }

    /// The wheel perimeter in metres.
    pub fn wheel_perimeter_m(&self) -> f64 {
        self.wheel_diameter_mm * PI / 1000.0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            axis_width_mm: 270.0,
            wheel_diameter_mm: 120.0,
            ticks_per_rev: 544.0,
            min_turn_angle_rad: PI / 180.0,
            min_distance_ticks: 20.0,
            hard_turn_threshold_rad: 1.0,
            heading_gain: 40.0,
            min_goto_throttle: 40.0,
            max_goto_throttle: 100.0,
        }
    }
}
