//! Common time helpers for chronos_core.

/// Number of microseconds in one millisecond.
pub const MICROS_PER_MS: u64 = 1_000;

/// Microseconds to fractional milliseconds.
#[inline]
pub fn us_to_ms(us: u64) -> f64 {
    us as f64 / MICROS_PER_MS as f64
}

/// `HH:MM:SS.mmm` since boot. Hours keep counting past 99.
pub fn format_uptime(ms: u64) -> String {
    let h = ms / 3_600_000;
    let m = (ms / 60_000) % 60;
    let s = (ms / 1000) % 60;
    let milli = ms % 1000;
    format!("{h:02}:{m:02}:{s:02}.{milli:03}")
}
