pub mod bus;
pub mod clock;

pub use bus::{ExpanderBus, PinDirection};
pub use clock::{Clock, MonotonicClock};

/// Error type crossing the hardware trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
