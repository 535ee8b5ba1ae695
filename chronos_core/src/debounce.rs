//! Per-channel counting debouncer.

/// A committed change of the debounced gate level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Beam interrupted (falling edge on an active-low gate).
    Blocked,
    /// Beam restored.
    Unblocked,
}

/// Debounces one gate channel.
///
/// `feed` takes the raw "blocked" sample of one tick. A level change commits
/// once the same raw value has been seen `threshold` ticks in a row.
#[derive(Debug, Clone)]
pub struct ChannelDebouncer {
    last_raw: bool,
    stable_count: u8,
    level: bool,
    threshold: u8,
}

impl ChannelDebouncer {
    pub fn new(threshold: u8) -> Self {
        Self {
            last_raw: false,
            stable_count: 0,
            level: false,
            threshold: threshold.max(1),
        }
    }

    /// Adopt `blocked` as the settled level without emitting a transition.
    pub fn seed(&mut self, blocked: bool) {
        self.last_raw = blocked;
        self.level = blocked;
        self.stable_count = self.threshold;
    }

    pub fn feed(&mut self, blocked: bool) -> Option<Transition> {
        if blocked == self.last_raw {
            self.stable_count = self.stable_count.saturating_add(1);
        } else {
            self.last_raw = blocked;
            self.stable_count = 1;
        }

        if self.stable_count >= self.threshold && self.level != self.last_raw {
            self.level = self.last_raw;
            Some(if self.level {
                Transition::Blocked
            } else {
                Transition::Unblocked
            })
        } else {
            None
        }
    }

    /// Debounced level: `true` while blocked.
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }
}
