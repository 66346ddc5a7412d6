//! Simulated pin implementations
//!
//! The simulated factory records the last value written to every pin in a
//! shared level map, which the simulation executable and the tests read back
//! to check what the core actually drove onto the pins.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

// Internal
use super::{DigitalOutput, PinError, PinFactory, PwmOutput};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Map of pin number to last written level (0/1 for digital pins, the duty
/// cycle for PWM pins).
pub type PinLevels = Arc<Mutex<HashMap<u8, u8>>>;

/// Simulated pin factory.
pub struct SimPinFactory {
    levels: PinLevels,
    claimed: Vec<u8>,
}

struct SimDigitalOutput {
    pin: u8,
    levels: PinLevels,
}

struct SimPwmOutput {
    pin: u8,
    levels: PinLevels,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimPinFactory {
    /// Create a new simulated factory with all pins free and low.
    pub fn new() -> Self {
        SimPinFactory {
            levels: Arc::new(Mutex::new(HashMap::new())),
            claimed: Vec::new(),
        }
    }

    /// Shared handle onto the recorded pin levels.
    pub fn levels(&self) -> PinLevels {
        self.levels.clone()
    }

    fn claim(&mut self, pin: u8) -> Result<(), PinError> {
        if self.claimed.contains(&pin) {
            return Err(PinError::AlreadyInUse(pin));
        }
        self.claimed.push(pin);
        self.levels.lock().insert(pin, 0);
        Ok(())
    }
}

impl Default for SimPinFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PinFactory for SimPinFactory {
    fn simulated(&self) -> bool {
        true
    }

    fn digital_output(&mut self, pin: u8) -> Result<Box<dyn DigitalOutput>, PinError> {
        self.claim(pin)?;
        Ok(Box::new(SimDigitalOutput {
            pin,
            levels: self.levels.clone(),
        }))
    }

    fn pwm_output(&mut self, pin: u8) -> Result<Box<dyn PwmOutput>, PinError> {
        self.claim(pin)?;
        Ok(Box::new(SimPwmOutput {
            pin,
            levels: self.levels.clone(),
        }))
    }
}

impl DigitalOutput for SimDigitalOutput {
    fn write(&mut self, high: bool) {
        trace!("Sim pin {} <- {}", self.pin, high as u8);
        self.levels.lock().insert(self.pin, high as u8);
    }
}

impl PwmOutput for SimPwmOutput {
    fn write(&mut self, duty: u8) {
        trace!("Sim pin {} <- pwm {}", self.pin, duty);
        self.levels.lock().insert(self.pin, duty);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_levels_record_writes() {
        let mut factory = SimPinFactory::new();
        assert!(factory.simulated());

        let mut digital = factory.digital_output(4).unwrap();
        let mut pwm = factory.pwm_output(5).unwrap();

        digital.write(true);
        pwm.write(128);

        let levels = factory.levels();
        assert_eq!(levels.lock().get(&4), Some(&1));
        assert_eq!(levels.lock().get(&5), Some(&128));
    }

    #[test]
    fn test_pins_cannot_be_claimed_twice() {
        let mut factory = SimPinFactory::new();
        factory.digital_output(4).unwrap();
        assert!(factory.digital_output(4).is_err());
    }
}
