#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Gate timing core (hardware-agnostic).
//!
//! All hardware access goes through `chronos_traits::ExpanderBus`, owned by a
//! single bus worker.
//!
//! ## Architecture
//!
//! - **Serializer**: one worker thread runs bus operations in FIFO order (`executor`)
//! - **Gate engine**: per-gate trigger timestamps, block ranges, live state (`gate`)
//! - **Poller**: one bus snapshot per tick, per-channel debounce, commits to the
//!   gate engine when the experiment permits (`poller`, `debounce`)
//! - **Scheduler**: shared tick with per-consumer intervals (`scheduler`)
//! - **Experiment engine**: state machine, settings, formulas, history (`experiment`)
//!
//! Timestamps are `u64` microseconds from the gate engine's clock; lengths
//! are millimetres, so mm/ms reads directly as m/s.

pub mod config;
pub mod conversions;
pub mod debounce;
pub mod error;
pub mod executor;
pub mod experiment;
pub mod gate;
pub mod hw_error;
pub mod mocks;
pub mod poller;
pub mod runner;
pub mod scheduler;
pub mod util;

pub use config::{ExecutorCfg, GateWiring, HistoryCfg, PollerCfg};
pub use error::{BusError, ChronosError, Rejected, Report, Result};
pub use executor::{BusExecutor, BusHandle, ExpanderOp, OpOutcome};
pub use experiment::compute::Measurement;
pub use experiment::history::RunRecord;
pub use experiment::mode::ExperimentMode;
pub use experiment::settings::{CsvStore, ExperimentSettings, MemoryStore, SettingsStore};
pub use experiment::state::{ExperimentState, RunState};
pub use experiment::{ExperimentEngine, HistoryReader};
pub use gate::{BlockRange, GateEngine, GateId};
pub use poller::{Coordinator, Edge, GateEvent, GatePoller, PollOutcome, PollSignals};
pub use runner::{GateTimer, PollStats, RuntimeCfg};
pub use scheduler::{SchedulerThread, TickScheduler};
