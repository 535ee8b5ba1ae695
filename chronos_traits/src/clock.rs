use std::thread;
use std::time::{Duration, Instant};

/// Time source for gate timestamps and tick pacing.
///
/// Gate timestamps are microsecond offsets from an epoch taken once at
/// startup; `micros_since` is the only conversion the timing path needs.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `d`. Simulated clocks move their own time instead.
    fn sleep(&self, d: Duration);

    /// Microseconds from `epoch` to now; 0 if `epoch` lies in the future.
    fn micros_since(&self, epoch: Instant) -> u64 {
        let us = self.now().saturating_duration_since(epoch).as_micros();
        u64::try_from(us).unwrap_or(u64::MAX)
    }

    /// Whole milliseconds from `epoch` to now; 0 if `epoch` lies in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        self.micros_since(epoch) / 1_000
    }
}

/// Wall-independent clock backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that stands still until a test moves it, at µs resolution.
    ///
    /// Clones share one elapsed counter, so a clone handed to the gate
    /// engine follows every `advance` made through the original.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        elapsed_us: Arc<AtomicU64>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                elapsed_us: Arc::new(AtomicU64::new(0)),
            }
        }

        /// The instant this clock reports before any advance.
        pub fn origin(&self) -> Instant {
            self.origin
        }

        pub fn advance_us(&self, us: u64) {
            let _ = self
                .elapsed_us
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                    Some(cur.saturating_add(us))
                });
        }

        pub fn advance(&self, d: Duration) {
            self.advance_us(u64::try_from(d.as_micros()).unwrap_or(u64::MAX));
        }

        /// Jump to an absolute position after `origin`.
        pub fn set_elapsed(&self, d: Duration) {
            self.elapsed_us.store(
                u64::try_from(d.as_micros()).unwrap_or(u64::MAX),
                Ordering::SeqCst,
            );
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_micros(self.elapsed_us.load(Ordering::SeqCst))
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn micros_since_tracks_manual_advance() {
            let clock = ManualClock::new();
            let epoch = clock.origin();
            clock.advance_us(1_500);
            assert_eq!(clock.micros_since(epoch), 1_500);
            assert_eq!(clock.ms_since(epoch), 1);
        }

        #[test]
        fn clones_share_time() {
            let a = ManualClock::new();
            let b = a.clone();
            a.sleep(Duration::from_millis(3));
            assert_eq!(b.ms_since(b.origin()), 3);
            b.set_elapsed(Duration::from_micros(10));
            assert_eq!(a.micros_since(a.origin()), 10);
        }

        #[test]
        fn epoch_after_now_saturates() {
            let clock = ManualClock::new();
            let later = clock.origin() + Duration::from_secs(1);
            assert_eq!(clock.micros_since(later), 0);
            assert_eq!(clock.ms_since(later), 0);
        }
    }
}
