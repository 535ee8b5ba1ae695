//! Experiment engine: arm/run state, settings, on-demand computation and
//! bounded run history.
//!
//! The engine pulls timestamps from the shared [`GateEngine`], computes a
//! result for the requested mode, appends it to that mode's history and then
//! clears exactly the gate state the mode consumed. History is written only
//! from here; [`HistoryReader`] clones give concurrent read access for display.
pub mod compute;
pub mod export;
pub mod history;
pub mod mode;
pub mod settings;
pub mod state;

use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::HistoryCfg;
use crate::error::{ChronosError, Rejected, Result};
use crate::gate::{BlockRange, GateEngine, GateId};
use crate::util::format_uptime;

use compute::Measurement;
use history::{History, RunRecord};
use mode::ExperimentMode;
use settings::{ExperimentSettings, SettingsStore};
use state::{ExperimentState, RunState};

type TimestampSource = Box<dyn Fn() -> String + Send + Sync>;

/// Gate state a successful computation was built from.
#[derive(Debug)]
enum Consumed {
    Edges(Vec<(GateId, u64)>),
    Ranges(Vec<(GateId, BlockRange)>),
    /// Already taken while computing.
    Nothing,
}

impl Consumed {
    fn edges<const N: usize>(read: [(GateId, Option<u64>); N]) -> Self {
        Consumed::Edges(read.into_iter().filter_map(|(g, t)| Some((g, t?))).collect())
    }

    fn ranges<const N: usize>(read: [(GateId, Option<BlockRange>); N]) -> Self {
        Consumed::Ranges(read.into_iter().filter_map(|(g, r)| Some((g, r?))).collect())
    }
}

/// Read-only view of the run history, safe to use from a display thread.
#[derive(Clone)]
pub struct HistoryReader {
    inner: Arc<RwLock<History>>,
    display_rows: usize,
}

impl HistoryReader {
    fn read(&self) -> RwLockReadGuard<'_, History> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest runs of `mode` as display lines, oldest first.
    pub fn last_lines(&self, mode: ExperimentMode) -> Vec<String> {
        self.read().ring(mode).last_lines(self.display_rows)
    }

    pub fn records(&self, mode: ExperimentMode) -> Vec<RunRecord> {
        self.read().ring(mode).records().cloned().collect()
    }

    pub fn latest(&self, mode: ExperimentMode) -> Option<RunRecord> {
        self.read().ring(mode).latest().cloned()
    }

    pub fn len(&self, mode: ExperimentMode) -> usize {
        self.read().ring(mode).len()
    }

    /// Write the full history table; returns the number of rows.
    pub fn export_csv<W: Write>(&self, out: W) -> Result<usize> {
        export::write_csv(&self.read(), out)
    }
}

pub struct ExperimentEngine {
    gates: Arc<GateEngine>,
    state: RunState,
    settings: ExperimentSettings,
    store: Option<Box<dyn SettingsStore>>,
    history: HistoryReader,
    tacho_prev_us: Option<u64>,
    timestamp: TimestampSource,
}

impl ExperimentEngine {
    /// Run timestamps default to gate-clock uptime, `HH:MM:SS.mmm`.
    pub fn new(gates: Arc<GateEngine>, cfg: &HistoryCfg) -> Self {
        let clock_gates = gates.clone();
        Self {
            gates,
            state: RunState::new(),
            settings: ExperimentSettings::default(),
            store: None,
            history: HistoryReader {
                inner: Arc::new(RwLock::new(History::new(cfg.capacity))),
                display_rows: cfg.display_rows.max(1),
            },
            tacho_prev_us: None,
            timestamp: Box::new(move || format_uptime(clock_gates.now_us() / 1000)),
        }
    }

    /// Replace the run timestamp source, e.g. with wall-clock time from an RTC.
    pub fn with_timestamp_source<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.timestamp = Box::new(f);
        self
    }

    /// Attach a settings store and adopt what it holds.
    ///
    /// Invalid or unknown persisted values are skipped; defaults stay in place.
    pub fn with_store<S: SettingsStore + 'static>(mut self, store: S) -> Result<Self> {
        let applied = self.settings.apply_pairs(store.load()?);
        tracing::debug!(applied, "persisted settings adopted");
        self.store = Some(Box::new(store));
        Ok(self)
    }

    fn history_mut(&self) -> RwLockWriteGuard<'_, History> {
        self.history
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── state ───────────────────────────────────────────────────────────────

    /// Shared handle for the poll loop's "may record" predicate.
    pub fn run_state(&self) -> RunState {
        self.state.clone()
    }

    pub fn state(&self) -> ExperimentState {
        self.state.get()
    }

    pub fn should_poll(&self) -> bool {
        self.state.should_poll()
    }

    /// Arming starts from clean gate state.
    pub fn arm(&mut self) -> std::result::Result<(), ChronosError> {
        self.state.arm()?;
        self.clear_timestamps();
        Ok(())
    }

    pub fn start(&self) -> std::result::Result<(), ChronosError> {
        self.state.start()
    }

    pub fn finish(&self) -> std::result::Result<(), ChronosError> {
        self.state.finish()
    }

    pub fn disarm(&self) {
        self.state.disarm();
    }

    // ── settings ────────────────────────────────────────────────────────────

    pub fn settings(&self) -> &ExperimentSettings {
        &self.settings
    }

    pub fn get_setting(&self, key: &str) -> Option<f64> {
        self.settings.get(key)
    }

    /// Validate, apply and persist. A rejected value leaves the prior one in place.
    pub fn set_setting(&mut self, key: &str, value: f64) -> Result<()> {
        self.settings.set(key, value)?;
        tracing::info!(key, value, "setting updated");
        if let Some(store) = &self.store {
            store.save(&self.settings.to_pairs())?;
        }
        Ok(())
    }

    // ── measurement ─────────────────────────────────────────────────────────

    /// Compute `mode` and report the gate state the result was built from.
    fn compute(
        &mut self,
        mode: ExperimentMode,
    ) -> std::result::Result<(Measurement, Consumed), Rejected> {
        let s = &self.settings;
        let g = &self.gates;
        match mode {
            ExperimentMode::LinearMotion => {
                let (a, b) = (g.read_edge(GateId::A), g.read_edge(GateId::B));
                let m = compute::linear_motion(s.cv_distance_mm(), a, b)?;
                Ok((m, Consumed::edges([(GateId::A, a), (GateId::B, b)])))
            }
            ExperimentMode::Photogate => {
                let a = g.read_block_range(GateId::A);
                let m = compute::photogate(s.pg_flag_mm(), a)?;
                Ok((m, Consumed::ranges([(GateId::A, a)])))
            }
            ExperimentMode::UniformAccel => {
                let (a, b) = (g.read_block_range(GateId::A), g.read_block_range(GateId::B));
                let m = compute::uniform_accel(s.ua_length_mm(), a, b)?;
                Ok((m, Consumed::ranges([(GateId::A, a), (GateId::B, b)])))
            }
            ExperimentMode::FreeFall => {
                let a = g.read_block_range(GateId::A);
                let m = compute::free_fall(s.ff_length_mm(), s.ff_drop_mm(), a)?;
                Ok((m, Consumed::ranges([(GateId::A, a)])))
            }
            ExperimentMode::Incline => {
                let (a, b) = (g.read_block_range(GateId::A), g.read_block_range(GateId::B));
                let m = compute::incline(
                    s.in_length_mm(),
                    s.in_distance_mm(),
                    s.in_angle_deg(),
                    a,
                    b,
                )?;
                Ok((m, Consumed::ranges([(GateId::A, a), (GateId::B, b)])))
            }
            ExperimentMode::Tachometer => Ok((self.tacho_period()?, Consumed::Nothing)),
        }
    }

    /// Interval between consecutive gate A triggers. The first trigger after
    /// a reset only seeds the baseline.
    ///
    /// Each gate A trigger is taken as soon as it is seen, so it moves the
    /// baseline even when no result comes of it. Other gates are untouched.
    fn tacho_period(&mut self) -> std::result::Result<Measurement, Rejected> {
        let t = self.gates.take_edge(GateId::A).ok_or(Rejected::NotReady)?;
        match self.tacho_prev_us.replace(t) {
            None => {
                tracing::debug!(t_us = t, "tachometer baseline seeded");
                Err(Rejected::NotReady)
            }
            Some(p) if t <= p => Err(Rejected::InvalidOrdering(
                "tachometer trigger not after baseline",
            )),
            Some(p) => compute::tachometer(self.settings.tacho_slots(), t - p),
        }
    }

    /// Compute `mode` from current gate state; on success store the run and
    /// clear the gate state it consumed. A rejected computation leaves gate
    /// state as it was.
    pub fn record(&mut self, mode: ExperimentMode) -> std::result::Result<Measurement, Rejected> {
        let (m, consumed) = match self.compute(mode) {
            Ok(v) => v,
            Err(Rejected::NotReady) => return Err(Rejected::NotReady),
            Err(e) => {
                tracing::debug!(%mode, reason = %e, "measurement discarded");
                return Err(e);
            }
        };

        let ts = (self.timestamp)();
        let run = self.history_mut().ring_mut(mode).push(&m, ts);
        match consumed {
            Consumed::Edges(taken) => self.gates.consume_edges(&taken),
            Consumed::Ranges(taken) => self.gates.consume_ranges(&taken),
            Consumed::Nothing => {}
        }
        tracing::info!(
            %mode,
            run,
            speed_mps = m.speed_mps,
            acc_mps2 = m.acc_mps2,
            rpm = m.rpm,
            "run recorded"
        );
        Ok(m)
    }

    /// Clear all experiment timestamps and the tachometer baseline. Live gate state is kept.
    pub fn clear_timestamps(&mut self) {
        self.gates.clear_edges();
        self.gates.clear_block_ranges();
        self.tacho_prev_us = None;
    }

    // ── history ─────────────────────────────────────────────────────────────

    pub fn history(&self) -> HistoryReader {
        self.history.clone()
    }

    pub fn last_lines(&self, mode: ExperimentMode) -> Vec<String> {
        self.history.last_lines(mode)
    }

    /// Drop all runs of `mode` and restart its run numbering.
    pub fn clear_history(&mut self, mode: ExperimentMode) {
        self.history_mut().ring_mut(mode).clear();
        if mode == ExperimentMode::Tachometer {
            self.tacho_prev_us = None;
        }
        tracing::info!(%mode, "history cleared");
    }

    pub fn export_csv<W: Write>(&self, out: W) -> Result<usize> {
        self.history.export_csv(out)
    }
}
