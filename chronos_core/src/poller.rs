//! Debounced gate poller.
//!
//! One `tick` reads every gate bit in a single serializer transaction,
//! debounces each channel, and turns committed level changes into gate
//! engine updates and outward [`GateEvent`]s.
use crossbeam_channel as xch;
use chronos_traits::{ExpanderBus, PinDirection};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{GateWiring, PollerCfg};
use crate::debounce::{ChannelDebouncer, Transition};
use crate::error::BusError;
use crate::executor::{BusHandle, ExpanderOp};
use crate::gate::{GateEngine, GateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Beam blocked.
    Fall,
    /// Beam restored.
    Rise,
}

/// Outward notification of a committed gate transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateEvent {
    pub gate: GateId,
    pub edge: Edge,
    pub at_us: u64,
    /// False when the transition only updated live state (experiment not armed).
    pub recorded: bool,
}

/// Per-tick inputs from whoever coordinates the UI and the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSignals {
    /// Screen transition or hardware hold: do not touch the bus.
    pub hold: bool,
    /// Experiment is armed or running: commits may mutate gate timestamps.
    pub permitted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Held,
    /// No update this tick.
    BusUnavailable(BusError),
    Sampled(Vec<GateEvent>),
}

/// Hold flags owned by the UI side.
///
/// `paused` covers long holds (screensaver, export); `transition_active`
/// brackets a screen change.
#[derive(Debug, Default)]
pub struct Coordinator {
    paused: AtomicBool,
    transition_active: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::Relaxed) {
            tracing::info!("gate polling paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::Relaxed) {
            tracing::info!("gate polling resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_transition_active(&self, active: bool) {
        self.transition_active.store(active, Ordering::Relaxed);
    }

    pub fn is_held(&self) -> bool {
        self.paused.load(Ordering::Relaxed) || self.transition_active.load(Ordering::Relaxed)
    }
}

struct Channel {
    gate: GateId,
    bit: u8,
    debouncer: ChannelDebouncer,
}

pub struct GatePoller<B> {
    channels: [Channel; 2],
    active_low: bool,
    engine: Arc<GateEngine>,
    bus: BusHandle<B>,
    timeout: Duration,
    events: xch::Sender<GateEvent>,
    dropped_events: AtomicU64,
    configured: bool,
}

impl<B: ExpanderBus + 'static> GatePoller<B> {
    /// Returns the poller and the receiving end of its event channel.
    pub fn new(
        wiring: GateWiring,
        cfg: &PollerCfg,
        engine: Arc<GateEngine>,
        bus: BusHandle<B>,
    ) -> (Self, xch::Receiver<GateEvent>) {
        let (tx, rx) = xch::bounded(cfg.event_queue_len.max(1));
        let timeout = bus.sync_timeout();
        let channels = [
            Channel {
                gate: GateId::A,
                bit: wiring.gate_a_bit,
                debouncer: ChannelDebouncer::new(cfg.debounce_threshold),
            },
            Channel {
                gate: GateId::B,
                bit: wiring.gate_b_bit,
                debouncer: ChannelDebouncer::new(cfg.debounce_threshold),
            },
        ];
        let poller = Self {
            channels,
            active_low: wiring.active_low,
            engine,
            bus,
            timeout,
            events: tx,
            dropped_events: AtomicU64::new(0),
            configured: false,
        };
        (poller, rx)
    }

    fn mask(&self) -> u32 {
        self.channels.iter().fold(0, |m, c| m | (1u32 << c.bit))
    }

    fn blocked(&self, levels: u32, bit: u8) -> bool {
        let high = levels & (1u32 << bit) != 0;
        high != self.active_low
    }

    /// Set gate pins to input and seed the debouncers from one snapshot.
    pub fn configure(&mut self) -> Result<(), BusError> {
        let mask = self.mask();
        self.bus.submit_sync(
            ExpanderOp::SetDirection {
                mask,
                dir: PinDirection::Input,
            },
            self.timeout,
        )?;
        let levels = self.bus.read_levels(mask, self.timeout)?;
        for i in 0..self.channels.len() {
            let blocked = self.blocked(levels, self.channels[i].bit);
            let ch = &mut self.channels[i];
            ch.debouncer.seed(blocked);
            self.engine.set_live(ch.gate, blocked);
        }
        self.configured = true;
        tracing::info!(
            gate_a_bit = self.channels[0].bit,
            gate_b_bit = self.channels[1].bit,
            active_low = self.active_low,
            levels,
            "gate inputs configured"
        );
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn tick(&mut self, signals: PollSignals) -> PollOutcome {
        if signals.hold {
            return PollOutcome::Held;
        }
        if !self.configured {
            if let Err(e) = self.configure() {
                tracing::warn!(error = %e, "gate input bring-up failed");
                return PollOutcome::BusUnavailable(e);
            }
        }

        let levels = match self.bus.read_levels(self.mask(), self.timeout) {
            Ok(l) => l,
            Err(e) => {
                if e.is_transient() {
                    tracing::debug!(error = %e, "gate snapshot skipped");
                } else {
                    tracing::warn!(error = %e, "gate snapshot failed");
                }
                return PollOutcome::BusUnavailable(e);
            }
        };

        let mut committed = Vec::new();
        for i in 0..self.channels.len() {
            let blocked = self.blocked(levels, self.channels[i].bit);
            let ch = &mut self.channels[i];
            let Some(transition) = ch.debouncer.feed(blocked) else {
                continue;
            };
            let gate = ch.gate;
            let at_us = self.engine.now_us();
            let edge = match transition {
                Transition::Blocked => {
                    if signals.permitted {
                        self.engine.record_edge_at(gate, at_us);
                        self.engine.record_block_start_at(gate, at_us);
                    }
                    Edge::Fall
                }
                Transition::Unblocked => {
                    if signals.permitted {
                        self.engine.record_block_end_at(gate, at_us);
                    }
                    Edge::Rise
                }
            };
            self.engine.set_live(gate, transition == Transition::Blocked);
            let ev = GateEvent {
                gate,
                edge,
                at_us,
                recorded: signals.permitted,
            };
            tracing::debug!(%gate, ?edge, at_us, recorded = ev.recorded, "gate transition");
            if self.events.try_send(ev).is_err() {
                let n = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped = n, "gate event queue full, dropping event");
            }
            committed.push(ev);
        }
        PollOutcome::Sampled(committed)
    }

    /// Events discarded because the consumer lagged.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}
