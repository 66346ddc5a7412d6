//! # Wheel control module
//!
//! One `WheelCtrl` owns an encoder and the motor driver pins of a single
//! wheel. It ramps the actual throttle towards the commanded value with a
//! bounded per-tick acceleration, derives the drive mode from the ramped
//! throttle, and watches for stalls: a wheel which is commanded to move but
//! measures no speed for a threshold number of samples is declared blocked,
//! dropped to float and refuses further commands until released.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::Params;
pub use state::{WheelCtrl, WheelPins};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Which side of the rover a wheel sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelSide {
    Left,
    Right,
}

/// Drive mode of a wheel.
///
/// Forward/Backwards actively drive, Float lets the wheel spin freely and
/// Brake shorts the motor windings. Brake is only ever entered explicitly by
/// [`WheelCtrl::stop`], the throttle ramp never overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelMode {
    Forward,
    Backwards,
    Float,
    Brake,
}

/// Possible errors during wheel control operation.
#[derive(Debug, thiserror::Error)]
pub enum WheelCtrlError {
    #[error("Cannot command the {0} wheel: motor is blocked")]
    Blocked(WheelSide),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl std::fmt::Display for WheelSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WheelSide::Left => write!(f, "left"),
            WheelSide::Right => write!(f, "right"),
        }
    }
}

impl std::fmt::Display for WheelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WheelMode::Forward => write!(f, "forward"),
            WheelMode::Backwards => write!(f, "backwards"),
            WheelMode::Float => write!(f, "float"),
            WheelMode::Brake => write!(f, "brake"),
        }
    }
}
