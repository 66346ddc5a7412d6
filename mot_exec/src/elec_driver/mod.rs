//! # Electronics driver module
//!
//! This module defines the pin capabilities the motion-control core consumes:
//! digital direction outputs and the PWM enable output of the motor driver
//! bridge. The capabilities are handed out by a [`PinFactory`], which also
//! reports whether it is simulated. On simulated factories the encoders
//! synthesise their own ticks instead of decoding a live quadrature stream.
//!
//! The physical (memory-mapped GPIO) implementation lives with the process
//! wiring, outside this crate. The [`sim`] implementation is used by the
//! simulation executable and by tests.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use sim::{PinLevels, SimPinFactory};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors when acquiring a pin capability.
#[derive(Debug, Error)]
pub enum PinError {
    #[error("Pin {0} is already in use")]
    AlreadyInUse(u8),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A digital output pin.
pub trait DigitalOutput: Send {
    /// Drive the pin high or low.
    fn write(&mut self, high: bool);
}

/// A PWM output pin.
pub trait PwmOutput: Send {
    /// Set the duty cycle, 0 (off) to 255 (fully on).
    fn write(&mut self, duty: u8);
}

/// Factory handing out pin capabilities.
pub trait PinFactory {
    /// True if this factory is simulated rather than real hardware.
    fn simulated(&self) -> bool;

    /// Acquire a digital output capability for the given pin.
    fn digital_output(&mut self, pin: u8) -> Result<Box<dyn DigitalOutput>, PinError>;

    /// Acquire a PWM output capability for the given pin.
    fn pwm_output(&mut self, pin: u8) -> Result<Box<dyn PwmOutput>, PinError>;
}
