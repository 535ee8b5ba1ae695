//! Maps `Box<dyn Error>` from trait boundaries to typed `BusError`.
//!
//! The traits in `chronos_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `chronos_hardware::HwError`
//! downcasting.

use crate::error::BusError;

/// Map a trait-boundary error to a typed `BusError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BusError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<chronos_hardware::error::HwError>() {
            return match hw {
                chronos_hardware::error::HwError::Timeout => BusError::Timeout,
                other => BusError::Device(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        BusError::Timeout
    } else {
        BusError::Device(s)
    }
}
