//! Runtime configuration for the timing core.
//!
//! These are the structs the serializer, poller and experiment engine are
//! built from. They are separate from the TOML-deserialized config in
//! `chronos_config`; see `conversions` for the bridge.
use std::time::Duration;

/// Bus serializer configuration.
#[derive(Debug, Clone)]
pub struct ExecutorCfg {
    /// Bounded request queue depth.
    pub queue_len: usize,
    /// Default wait for a synchronous result.
    pub sync_timeout: Duration,
    /// Wait for queue space before reporting `QueueFull` (zero = fail fast).
    pub enqueue_wait: Duration,
    /// A sync timeout while one op has run this long is logged as a stuck worker.
    pub stall_warn: Duration,
}

impl Default for ExecutorCfg {
    fn default() -> Self {
        Self {
            queue_len: 16,
            sync_timeout: Duration::from_millis(50),
            enqueue_wait: Duration::ZERO,
            stall_warn: Duration::from_millis(1000),
        }
    }
}

/// Which expander bits the gates are wired to.
#[derive(Debug, Clone, Copy)]
pub struct GateWiring {
    pub gate_a_bit: u8,
    pub gate_b_bit: u8,
    /// Input reads low while the beam is interrupted.
    pub active_low: bool,
}

impl Default for GateWiring {
    fn default() -> Self {
        Self {
            gate_a_bit: 0,
            gate_b_bit: 5,
            active_low: true,
        }
    }
}

impl GateWiring {
    pub fn mask(&self) -> u32 {
        (1u32 << self.gate_a_bit) | (1u32 << self.gate_b_bit)
    }
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerCfg {
    pub period: Duration,
    /// Identical consecutive samples before a level change commits. 1 = commit on first differing sample.
    pub debounce_threshold: u8,
    /// Outward gate events buffered before new ones are dropped.
    pub event_queue_len: usize,
}

impl Default for PollerCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            debounce_threshold: 1,
            event_queue_len: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryCfg {
    /// Runs retained per mode.
    pub capacity: usize,
    pub display_rows: usize,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            capacity: 50,
            display_rows: 10,
        }
    }
}
