use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `is_ready` every `poll_interval` until it answers or `timeout` runs out.
///
/// Returns how many attempts it took; the first attempt happens immediately.
pub fn wait_until_ready_with_timeout(
    mut is_ready: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<u32> {
    let deadline = Instant::now() + timeout;
    let mut attempts = 1;
    while !is_ready() {
        if Instant::now() >= deadline {
            tracing::debug!(attempts, "expander never answered");
            return Err(HwError::NotReady);
        }
        std::thread::sleep(poll_interval);
        attempts += 1;
    }
    Ok(attempts)
}
