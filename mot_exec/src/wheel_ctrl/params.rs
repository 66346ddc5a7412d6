//! Parameters for the wheel control module.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Wheel control parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Maximum change in actual throttle per ramp step (percentage points).
    pub max_acceleration: f64,

    /// Number of consecutive zero-speed samples (while a non-zero throttle is
    /// applied) after which the wheel is declared blocked.
    pub max_block_count: u32,

    /// Simulated tick rate of the encoder at 100% throttle (ticks/s). Only
    /// used when the wheel is driving a simulated pin set.
    pub sim_full_rate_tps: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            max_acceleration: 40.0,
            max_block_count: 5,
            sim_full_rate_tps: 2725.0,
        }
    }
}
