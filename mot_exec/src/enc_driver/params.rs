//! Parameters structure for the encoder driver

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the encoder driver.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Params {
    /// Number of encoder ticks per wheel revolution.
    pub ticks_per_rev: f64,

    /// Time without a tick after which the measured speed is considered zero.
    ///
    /// Units: milliseconds
    pub zero_speed_timeout_ms: u64,

    /// Sampling period of the synthetic tick generator.
    ///
    /// Units: milliseconds
    pub sim_sample_period_ms: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Params {
            ticks_per_rev: 544.0,
            zero_speed_timeout_ms: 50,
            sim_sample_period_ms: 3,
        }
    }
}
