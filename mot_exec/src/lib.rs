//! # Diffbot motion-control library
//!
//! This library is the motion-control core of a two-wheeled differential
//! drive rover. It converts throttle, turn and goto commands into per-wheel
//! drive signals, reconstructs the rover's pose from wheel rotation feedback
//! and detects when a wheel has stalled.
//!
//! The module layering is strictly bottom up:
//!
//!     - `event` - broadcast channels, observable values and event races,
//!       the concurrency primitives everything else is built on
//!     - `elec_driver` - pin capabilities consumed by the core, plus the
//!       simulation implementation
//!     - `enc_driver` - quadrature encoder decoding and speed estimation
//!     - `wheel_ctrl` - per-wheel throttle ramping and stall detection
//!     - `rover_ctrl` - two-wheel kinematic composition: odometry and the
//!       turn/align/goto navigation algorithms

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod elec_driver;
pub mod enc_driver;
pub mod event;
pub mod rover_ctrl;
pub mod wheel_ctrl;
