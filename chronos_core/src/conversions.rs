//! `From` implementations bridging `chronos_config` types to runtime types.

use std::time::Duration;

use crate::config::{ExecutorCfg, GateWiring, HistoryCfg, PollerCfg};

// ── ExecutorCfg ──────────────────────────────────────────────────────────────

impl From<&chronos_config::BusCfg> for ExecutorCfg {
    fn from(c: &chronos_config::BusCfg) -> Self {
        Self {
            queue_len: c.queue_len,
            sync_timeout: Duration::from_millis(c.sync_timeout_ms),
            enqueue_wait: Duration::from_millis(c.enqueue_wait_ms),
            ..Self::default()
        }
    }
}

// ── GateWiring ───────────────────────────────────────────────────────────────

impl From<&chronos_config::GatesCfg> for GateWiring {
    fn from(c: &chronos_config::GatesCfg) -> Self {
        Self {
            gate_a_bit: c.gate_a_bit,
            gate_b_bit: c.gate_b_bit,
            active_low: c.active_low,
        }
    }
}

// ── PollerCfg ────────────────────────────────────────────────────────────────

impl From<&chronos_config::Config> for PollerCfg {
    fn from(c: &chronos_config::Config) -> Self {
        Self {
            period: Duration::from_millis(c.poller.period_ms),
            debounce_threshold: c.poller.debounce_threshold,
            event_queue_len: c.events.queue_len,
        }
    }
}

// ── HistoryCfg ───────────────────────────────────────────────────────────────

impl From<&chronos_config::HistoryCfg> for HistoryCfg {
    fn from(c: &chronos_config::HistoryCfg) -> Self {
        Self {
            capacity: c.capacity,
            display_rows: c.display_rows,
        }
    }
}
