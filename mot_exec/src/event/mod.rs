//! # Event primitives
//!
//! Named broadcast channels, observable values and event races. These are the
//! cooperative concurrency primitives which glue asynchronous sensor feedback
//! to command completion:
//!
//!     - [`Channel`] - one-to-many notification, synchronous fan-out in
//!       registration order
//!     - [`Observable`] - a channel wrapping a current value, notifying only
//!       on change
//!     - [`EventRace`] - a one-shot wait over several (channel, predicate)
//!       pairs, resolving with the name of whichever fires first

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod channel;
mod observable;
mod race;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use channel::{Channel, ObserverHandle};
pub use observable::Observable;
pub use race::EventRace;
