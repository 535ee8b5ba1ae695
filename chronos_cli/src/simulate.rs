//! Scripted experiment runs on the simulated expander.
//!
//! The script moves pin levels on a [`SimulatedPins`] handle while the real
//! poll loop, bus worker and experiment engine run unchanged, so a run here
//! exercises the same path as one on the bench.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chronos_core::error::{ChronosError, Rejected, Result as CoreResult};
use chronos_core::{
    CsvStore, ExperimentEngine, ExperimentMode, GateEngine, GateTimer, HistoryCfg, MemoryStore,
    RunRecord, RuntimeCfg,
};
use chronos_hardware::{SimulatedExpander, SimulatedPins};
use chronos_traits::MonotonicClock;
use eyre::WrapErr;

/// Polls to wait for a result before giving up on a run.
const RECORD_ATTEMPTS: u32 = 20;

pub struct SimulateArgs {
    pub mode: ExperimentMode,
    pub runs: u32,
    pub pass: Duration,
    pub gap: Duration,
    pub export: Option<PathBuf>,
    pub settings: Option<PathBuf>,
}

/// Beam control for the two wired gates.
struct Bench {
    pins: SimulatedPins,
    a_bit: u8,
    b_bit: u8,
    active_low: bool,
}

impl Bench {
    fn beam(&self, bit: u8, blocked: bool) {
        self.pins.set_pin(bit, blocked != self.active_low);
    }

    fn pass(&self, bit: u8, dwell: Duration) {
        self.beam(bit, true);
        thread::sleep(dwell);
        self.beam(bit, false);
    }

    /// Move the object through the apparatus once.
    fn drive(&self, mode: ExperimentMode, pass: Duration, gap: Duration) {
        match mode {
            ExperimentMode::Photogate | ExperimentMode::FreeFall => self.pass(self.a_bit, pass),
            ExperimentMode::Tachometer => {
                self.pass(self.a_bit, pass);
                thread::sleep(gap);
            }
            ExperimentMode::LinearMotion
            | ExperimentMode::UniformAccel
            | ExperimentMode::Incline => {
                self.pass(self.a_bit, pass);
                thread::sleep(gap);
                self.pass(self.b_bit, pass);
            }
        }
    }
}

/// Outcome of a completed simulation, for the caller to print.
pub struct SimulationReport {
    pub mode: ExperimentMode,
    pub records: Vec<RunRecord>,
    pub ticks: u64,
    pub bus_errors: u64,
    pub exported_rows: Option<usize>,
}

fn wait_for_run(
    engine: &mut ExperimentEngine,
    mode: ExperimentMode,
    period: Duration,
) -> CoreResult<()> {
    for _ in 0..RECORD_ATTEMPTS {
        match engine.record(mode) {
            Ok(m) => {
                tracing::debug!(formula = %m.formula, "run computed");
                return Ok(());
            }
            Err(Rejected::NotReady) => thread::sleep(period),
            Err(e) => return Err(e.into()),
        }
    }
    Err(Rejected::NotReady).wrap_err("no gate transitions were recorded for this run")
}

pub fn run_simulation(
    cfg: &chronos_config::Config,
    args: &SimulateArgs,
    shutdown: &Arc<AtomicBool>,
) -> CoreResult<SimulationReport> {
    let rcfg = RuntimeCfg::from(cfg);
    let period = rcfg.poller.period;
    let settle = period * (u32::from(rcfg.poller.debounce_threshold) + 2);
    if args.pass < settle {
        return Err(ChronosError::ConfigurationInvalid {
            key: "pass-ms".into(),
            reason: "must outlast the poll period times the debounce threshold",
        }
        .into());
    }

    let expander = SimulatedExpander::new();
    let bench = Bench {
        pins: expander.pins(),
        a_bit: rcfg.wiring.gate_a_bit,
        b_bit: rcfg.wiring.gate_b_bit,
        active_low: rcfg.wiring.active_low,
    };
    // Idle beams: open on both gates whatever the polarity.
    bench.beam(bench.a_bit, false);
    bench.beam(bench.b_bit, false);

    let gates = Arc::new(GateEngine::new(MonotonicClock::new()));
    let engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::from(&cfg.history));
    let mut engine = match &args.settings {
        Some(path) => engine.with_store(CsvStore::new(path))?,
        None => engine.with_store(MemoryStore::new())?,
    };

    let mut timer = GateTimer::start(
        expander,
        &rcfg,
        gates,
        engine.run_state(),
        MonotonicClock::new(),
    )?;

    engine.arm()?;
    engine.start()?;
    tracing::info!(mode = %args.mode, runs = args.runs, "simulation started");

    if args.mode == ExperimentMode::Tachometer {
        // The first revolution only sets the baseline.
        bench.drive(args.mode, args.pass, args.gap);
        thread::sleep(settle);
        let _ = engine.record(args.mode);
    }

    for run in 1..=args.runs {
        if shutdown.load(Ordering::Relaxed) {
            tracing::warn!(run, "interrupted; stopping early");
            break;
        }
        bench.drive(args.mode, args.pass, args.gap);
        thread::sleep(settle);
        wait_for_run(&mut engine, args.mode, period).wrap_err_with(|| format!("run {run}"))?;
    }

    engine.finish()?;
    timer.stop_polling();

    let exported_rows = match &args.export {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| ChronosError::Io(format!("create {}: {e}", path.display())))?;
            let rows = engine.export_csv(std::io::BufWriter::new(file))?;
            tracing::info!(path = %path.display(), rows, "history exported");
            Some(rows)
        }
        None => None,
    };

    Ok(SimulationReport {
        mode: args.mode,
        records: engine.history().records(args.mode),
        ticks: timer.stats().ticks(),
        bus_errors: timer.stats().bus_errors(),
        exported_rows,
    })
}
