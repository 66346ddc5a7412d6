//! # Encoder driver module
//!
//! Decodes quadrature pulses (or synthesises them in simulation) into a
//! position counter and an instantaneous speed, both exposed as observable
//! values for the wheel controller and the odometry above.
//!
//! The decoding state machine consumes the notification stream of a pigpio
//! style level notifier: fixed-size little-endian sample records carrying a
//! flag word, a microsecond timestamp and a GPIO level bitmask. The two pin
//! bits form a 4-state Gray code whose transitions map to a per-sample
//! direction delta.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod decode;
mod params;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::Params;
pub use state::Encoder;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Size of one notifier sample record in bytes.
pub const SAMPLE_SIZE: usize = 12;

/// Flag bit marking a keepalive sample, which carries no level information.
pub const KEEPALIVE_FLAG: u16 = 1 << 6;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors when decoding a quadrature sample chunk.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Sample record truncated: expected {} bytes, got {0}", SAMPLE_SIZE)]
    TruncatedRecord(usize),
}
