//! Services implemented in-process

mod clock;
mod unknown;

pub use self::clock::{Clock, CLOCK_TYPE_KEY, DEFAULT_INTERVAL_MS};
pub use self::unknown::{Unknown, UNKNOWN_TYPE_KEY};
