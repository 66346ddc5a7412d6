//! Pose primitives: tick-space position and accumulated orientation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use std::f64::consts::{PI, TAU};
use std::fmt;

// Internal
use util::maths;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A position in the odometry frame, in encoder ticks.
///
/// The frame is fixed at whatever pose the rover had when odometry started
/// (or was last reset): x ahead, orientation angles growing clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A position converted to metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricCoordinates {
    pub x: f64,
    pub y: f64,
}

/// A heading angle in radians.
///
/// The stored angle is not normalised, it accumulates across full turns so
/// that odometry and turn targets never jump across the ±π seam.
/// [`Orientation::normalized`] and [`Orientation::degrees`] are pure views.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    pub fn origin() -> Self {
        Position { x: 0.0, y: 0.0 }
    }

    /// This position translated by the given tick deltas.
    pub fn add(&self, dx: f64, dy: f64) -> Self {
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Straight-line distance to another position, in ticks.
    pub fn distance_to(&self, other: Position) -> f64 {
        Vector2::new(other.x - self.x, other.y - self.y).norm()
    }

    /// Heading from this position towards another, in radians.
    pub fn angle_to(&self, other: Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        // atan2 of a negative zero flips straight-behind to -pi
        if dy == 0.0 {
            return if dx < 0.0 { PI } else { 0.0 };
        }
        (-dy).atan2(dx)
    }

    /// This position in metres.
    pub fn metric(&self, ticks_per_mm: f64) -> MetricCoordinates {
        MetricCoordinates {
            x: self.x / ticks_per_mm / 1000.0,
            y: self.y / ticks_per_mm / 1000.0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.0}, {:.0})", self.x, self.y)
    }
}

impl Orientation {
    pub fn from_radians(rad: f64) -> Self {
        Orientation { rad }
    }

    pub fn from_degrees(deg: f64) -> Self {
        Orientation {
            rad: deg.to_radians(),
        }
    }

    /// The raw accumulated angle in radians.
    pub fn radians(&self) -> f64 {
        self.rad
    }

    /// The raw accumulated angle in degrees.
    pub fn degrees(&self) -> f64 {
        self.rad.to_degrees()
    }

    /// The angle wrapped into (-π, π].
    pub fn normalized(&self) -> Self {
        Orientation {
            rad: maths::wrap_to_pi(self.rad),
        }
    }

    pub fn add(&self, other: Orientation) -> Self {
        Orientation {
            rad: self.rad + other.rad,
        }
    }

    /// The smallest signed rotation taking this orientation to `other`, in
    /// [-π, π).
    pub fn difference_to(&self, other: Orientation) -> Self {
        let diff = other.rad - self.rad;
        Orientation {
            rad: diff - TAU * ((diff + PI) / TAU).floor(),
        }
    }

    /// True if the raw angles differ by no more than `epsilon`.
    pub fn is_close_to(&self, other: Orientation, epsilon: Orientation) -> bool {
        (self.rad - other.rad).abs() <= epsilon.rad
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.1}°", self.normalized().degrees())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a length in metres to encoder ticks.
pub fn meters(m: f64, ticks_per_mm: f64) -> f64 {
    m * 1000.0 * ticks_per_mm
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn test_angle_to_cardinal_directions() {
        let origin = Position::origin();

        assert!((origin.angle_to(Position::new(10.0, 0.0)) - 0.0).abs() < EPSILON);
        assert!((origin.angle_to(Position::new(-10.0, 0.0)) - PI).abs() < EPSILON);
        // y grows to the rover's left, so a positive y target is behind a
        // negative heading
        assert!((origin.angle_to(Position::new(0.0, 10.0)) + FRAC_PI_2).abs() < EPSILON);
        assert!((origin.angle_to(Position::new(0.0, -10.0)) - FRAC_PI_2).abs() < EPSILON);
    }

    #[test]
    fn test_angle_to_directly_behind_is_positive_pi() {
        let here = Position::new(5.0, -3.0);
        let behind = Position::new(-5.0, -3.0);
        assert_eq!(here.angle_to(behind), PI);
    }

    #[test]
    fn test_distance_is_euclidean() {
        let a = Position::new(3.0, 0.0);
        let b = Position::new(0.0, 4.0);
        assert!((a.distance_to(b) - 5.0).abs() < EPSILON);
        assert!((b.distance_to(a) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_orientation_accumulates_unnormalized() {
        let o = Orientation::from_degrees(350.0).add(Orientation::from_degrees(20.0));
        assert!((o.degrees() - 370.0).abs() < 1e-9);
        assert!((o.normalized().degrees() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_difference_wraps_to_shortest_rotation() {
        let from = Orientation::from_degrees(170.0);
        let to = Orientation::from_degrees(-170.0);
        assert!((from.difference_to(to).degrees() - 20.0).abs() < 1e-9);
        assert!((to.difference_to(from).degrees() + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_close_to_uses_raw_angles() {
        let eps = Orientation::from_degrees(1.0);
        let a = Orientation::from_degrees(360.0);
        let b = Orientation::from_degrees(0.0);

        // Same normalized heading, but a full turn apart
        assert!(!a.is_close_to(b, eps));
        assert!(a.is_close_to(Orientation::from_degrees(359.5), eps));
    }

    #[test]
    fn test_metric_conversion() {
        let ticks_per_mm = 544.0 / (120.0 * PI);
        let pos = Position::new(meters(1.0, ticks_per_mm), 0.0);
        let metric = pos.metric(ticks_per_mm);
        assert!((metric.x - 1.0).abs() < EPSILON);
        assert!((metric.y - 0.0).abs() < EPSILON);
    }
}
