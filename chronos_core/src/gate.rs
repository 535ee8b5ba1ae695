//! Per-gate timestamp capture.
//!
//! Two independent kinds of experiment state live here: single trigger
//! timestamps (consumed by linear motion and the tachometer) and block
//! ranges (consumed by photogate, acceleration, free fall and incline).
//! Live "currently blocked" flags are display state and survive both clears.
//!
//! Every critical section is a handful of loads/stores; no lock is held
//! across anything slower than that.
use chronos_traits::clock::Clock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateId {
    A,
    B,
    /// Legacy third slot; no physical gate is wired to it.
    C,
}

impl GateId {
    pub const ALL: [GateId; 3] = [GateId::A, GateId::B, GateId::C];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            GateId::A => 0,
            GateId::B => 1,
            GateId::C => 2,
        }
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateId::A => "A",
            GateId::B => "B",
            GateId::C => "C",
        };
        f.write_str(s)
    }
}

/// A completed block interval on one gate. Always `end_us > start_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start_us: u64,
    pub end_us: u64,
}

impl BlockRange {
    #[inline]
    pub fn duration_us(&self) -> u64 {
        self.end_us - self.start_us
    }
}

#[derive(Debug, Default)]
struct Slots {
    edges: [Option<u64>; 3],
    starts: [Option<u64>; 3],
    ends: [Option<u64>; 3],
}

/// Shared gate state, injected into the poller and the experiment engine.
pub struct GateEngine {
    clock: Box<dyn Clock + Send + Sync>,
    epoch: Instant,
    slots: Mutex<Slots>,
    live: [AtomicBool; 3],
}

impl GateEngine {
    /// Timestamps are microseconds since construction.
    pub fn new<C: Clock + Send + Sync + 'static>(clock: C) -> Self {
        let epoch = clock.now();
        Self {
            clock: Box::new(clock),
            epoch,
            slots: Mutex::new(Slots::default()),
            live: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }

    #[inline]
    pub fn now_us(&self) -> u64 {
        self.clock.micros_since(self.epoch)
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slots hold plain integers; a panicked writer cannot leave them torn.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_edge(&self, gate: GateId) {
        self.record_edge_at(gate, self.now_us());
    }

    pub fn record_edge_at(&self, gate: GateId, t_us: u64) {
        self.lock().edges[gate.index()] = Some(t_us);
        tracing::debug!(%gate, t_us, "gate trigger");
    }

    pub fn read_edge(&self, gate: GateId) -> Option<u64> {
        self.lock().edges[gate.index()]
    }

    pub fn record_block_start(&self, gate: GateId) {
        self.record_block_start_at(gate, self.now_us());
    }

    /// A new start drops a stored end that is not newer than it.
    pub fn record_block_start_at(&self, gate: GateId, t_us: u64) {
        let mut s = self.lock();
        let i = gate.index();
        s.starts[i] = Some(t_us);
        if s.ends[i].is_some_and(|end| end <= t_us) {
            s.ends[i] = None;
        }
        drop(s);
        tracing::debug!(%gate, t_us, "block start");
    }

    pub fn record_block_end(&self, gate: GateId) {
        self.record_block_end_at(gate, self.now_us());
    }

    /// No-op without a start or when `t_us` is not after it.
    pub fn record_block_end_at(&self, gate: GateId, t_us: u64) {
        let mut s = self.lock();
        let i = gate.index();
        match s.starts[i] {
            Some(start) if t_us > start => {
                s.ends[i] = Some(t_us);
                drop(s);
                tracing::debug!(%gate, t_us, dur_us = t_us - start, "block end");
            }
            _ => {
                drop(s);
                tracing::debug!(%gate, t_us, "block end ignored (no valid start)");
            }
        }
    }

    pub fn read_block_start(&self, gate: GateId) -> Option<u64> {
        self.lock().starts[gate.index()]
    }

    /// Present only when both ends exist and `end > start`.
    pub fn read_block_range(&self, gate: GateId) -> Option<BlockRange> {
        let s = self.lock();
        let i = gate.index();
        match (s.starts[i], s.ends[i]) {
            (Some(start_us), Some(end_us)) if end_us > start_us => {
                Some(BlockRange { start_us, end_us })
            }
            _ => None,
        }
    }

    /// Read one gate's trigger and clear it under a single lock.
    pub fn take_edge(&self, gate: GateId) -> Option<u64> {
        self.lock().edges[gate.index()].take()
    }

    /// Clear triggers that still hold the consumed timestamp. A trigger
    /// recorded after the read is kept.
    pub fn consume_edges(&self, taken: &[(GateId, u64)]) {
        let mut s = self.lock();
        for &(gate, t_us) in taken {
            let slot = &mut s.edges[gate.index()];
            if *slot == Some(t_us) {
                *slot = None;
            }
        }
    }

    /// Clear ranges whose start still matches the consumed one. A block
    /// start committed after the read is kept.
    pub fn consume_ranges(&self, taken: &[(GateId, BlockRange)]) {
        let mut s = self.lock();
        for &(gate, range) in taken {
            let i = gate.index();
            if s.starts[i] == Some(range.start_us) {
                s.starts[i] = None;
                s.ends[i] = None;
            }
        }
    }

    pub fn clear_edges(&self) {
        self.lock().edges = [None; 3];
    }

    pub fn clear_block_ranges(&self) {
        let mut s = self.lock();
        s.starts = [None; 3];
        s.ends = [None; 3];
    }

    /// Clear everything, live flags included.
    pub fn reset(&self) {
        *self.lock() = Slots::default();
        for l in &self.live {
            l.store(false, Ordering::Relaxed);
        }
    }

    pub fn set_live(&self, gate: GateId, blocked: bool) {
        self.live[gate.index()].store(blocked, Ordering::Relaxed);
    }

    pub fn is_live(&self, gate: GateId) -> bool {
        self.live[gate.index()].load(Ordering::Relaxed)
    }

    // Simulation helpers for UI test buttons.

    pub fn simulate_trigger(&self, gate: GateId) {
        self.record_edge(gate);
    }

    pub fn simulate_block(&self, gate: GateId) {
        self.record_block_start(gate);
    }

    pub fn simulate_unblock(&self, gate: GateId) {
        self.record_block_end(gate);
    }
}
