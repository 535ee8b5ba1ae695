//! Wires the serializer, poller and tick scheduler into one running unit.
use crossbeam_channel as xch;
use chronos_traits::ExpanderBus;
use chronos_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{ExecutorCfg, GateWiring, PollerCfg};
use crate::error::Result;
use crate::executor::{BusExecutor, BusHandle};
use crate::experiment::state::RunState;
use crate::gate::GateEngine;
use crate::poller::{Coordinator, GateEvent, GatePoller, PollOutcome, PollSignals};
use crate::scheduler::{SchedulerThread, TickScheduler};

/// Everything needed to start polling.
#[derive(Debug, Clone, Default)]
pub struct RuntimeCfg {
    pub executor: ExecutorCfg,
    pub wiring: GateWiring,
    pub poller: PollerCfg,
}

impl From<&chronos_config::Config> for RuntimeCfg {
    fn from(c: &chronos_config::Config) -> Self {
        Self {
            executor: ExecutorCfg::from(&c.bus),
            wiring: GateWiring::from(&c.gates),
            poller: PollerCfg::from(c),
        }
    }
}

/// Poll loop counters.
#[derive(Debug, Default)]
pub struct PollStats {
    ticks: AtomicU64,
    held: AtomicU64,
    bus_errors: AtomicU64,
    transitions: AtomicU64,
}

impl PollStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
    pub fn held(&self) -> u64 {
        self.held.load(Ordering::Relaxed)
    }
    pub fn bus_errors(&self) -> u64 {
        self.bus_errors.load(Ordering::Relaxed)
    }
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    fn note(&self, outcome: &PollOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        match outcome {
            PollOutcome::Held => {
                self.held.fetch_add(1, Ordering::Relaxed);
            }
            PollOutcome::BusUnavailable(_) => {
                self.bus_errors.fetch_add(1, Ordering::Relaxed);
            }
            PollOutcome::Sampled(events) => {
                self.transitions
                    .fetch_add(events.len() as u64, Ordering::Relaxed);
            }
        }
    }
}

/// Running gate timer: bus worker plus periodic poll thread.
///
/// Dropping it stops the poll thread first, then the bus worker.
pub struct GateTimer<B> {
    // Field order is drop order.
    ticker: Option<SchedulerThread>,
    executor: BusExecutor<B>,
    coordinator: Arc<Coordinator>,
    stats: Arc<PollStats>,
    events: xch::Receiver<GateEvent>,
}

impl<B: ExpanderBus + Send + 'static> GateTimer<B> {
    /// Start the worker, bring up the gate inputs and begin polling.
    ///
    /// A failed bring-up is logged and retried by the poll loop.
    pub fn start<C>(
        bus: B,
        cfg: &RuntimeCfg,
        gates: Arc<GateEngine>,
        run_state: RunState,
        clock: C,
    ) -> Result<Self>
    where
        C: Clock + Clone + Send + Sync + 'static,
    {
        let executor = BusExecutor::spawn(bus, cfg.executor.clone(), clock.clone());
        let (mut poller, events) =
            GatePoller::new(cfg.wiring, &cfg.poller, gates, executor.handle());
        if let Err(e) = poller.configure() {
            tracing::warn!(error = %e, "gate input bring-up failed; poll loop will retry");
        }

        let coordinator = Arc::new(Coordinator::new());
        let stats = Arc::new(PollStats::default());

        let mut sched = TickScheduler::new();
        let coord = coordinator.clone();
        let st = stats.clone();
        sched.register("gate-poll", cfg.poller.period, move |_now_ms| {
            let signals = PollSignals {
                hold: coord.is_held(),
                permitted: run_state.should_poll(),
            };
            let outcome = poller.tick(signals);
            st.note(&outcome);
        });
        let ticker = sched.spawn(cfg.poller.period, clock)?;

        tracing::info!(
            period_ms = cfg.poller.period.as_millis() as u64,
            debounce_threshold = cfg.poller.debounce_threshold,
            "gate timer started"
        );
        Ok(Self {
            ticker: Some(ticker),
            executor,
            coordinator,
            stats,
            events,
        })
    }
}

impl<B> GateTimer<B> {
    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Outward gate events; lagging consumers lose the newest ones.
    pub fn events(&self) -> &xch::Receiver<GateEvent> {
        &self.events
    }

    /// Submission handle for other subsystems sharing the bus.
    pub fn bus(&self) -> BusHandle<B> {
        self.executor.handle()
    }

    /// Stop the poll thread, leaving the bus worker running.
    pub fn stop_polling(&mut self) {
        if let Some(t) = self.ticker.take() {
            t.stop();
        }
    }
}
