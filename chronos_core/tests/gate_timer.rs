//! Poll thread, bus worker and experiment engine running together in real time.

use chronos_core::{
    ExperimentEngine, ExperimentMode, GateEngine, GateId, GateTimer, HistoryCfg, PollerCfg,
    RuntimeCfg,
};
use chronos_hardware::SimulatedExpander;
use chronos_traits::clock::MonotonicClock;
use std::sync::Arc;
use std::time::Duration;

fn runtime_cfg() -> RuntimeCfg {
    RuntimeCfg {
        poller: PollerCfg {
            period: Duration::from_millis(2),
            ..PollerCfg::default()
        },
        ..RuntimeCfg::default()
    }
}

fn settle() {
    std::thread::sleep(Duration::from_millis(40));
}

#[test]
fn armed_run_produces_a_linear_motion_result() {
    let exp = SimulatedExpander::new();
    let pins = exp.pins();
    let gates = Arc::new(GateEngine::new(MonotonicClock::new()));
    let mut engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default());
    let timer = GateTimer::start(
        exp,
        &runtime_cfg(),
        gates.clone(),
        engine.run_state(),
        MonotonicClock::new(),
    )
    .unwrap();

    engine.arm().unwrap();
    pins.block(0);
    settle();
    pins.block(5);
    settle();

    let m = engine.record(ExperimentMode::LinearMotion).unwrap();
    assert!(m.time_ms > 0.0);
    assert!(m.speed_mps > 0.0);
    assert!(timer.stats().transitions() >= 2);
    assert!(timer.events().try_iter().count() >= 2);
}

#[test]
fn idle_experiment_tracks_live_state_only() {
    let exp = SimulatedExpander::new();
    let pins = exp.pins();
    let gates = Arc::new(GateEngine::new(MonotonicClock::new()));
    let engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default());
    let _timer = GateTimer::start(
        exp,
        &runtime_cfg(),
        gates.clone(),
        engine.run_state(),
        MonotonicClock::new(),
    )
    .unwrap();

    pins.block(5);
    settle();
    assert!(gates.is_live(GateId::B));
    assert_eq!(gates.read_edge(GateId::B), None);
}

#[test]
fn paused_polling_never_touches_the_bus() {
    let exp = SimulatedExpander::new();
    let pins = exp.pins();
    let gates = Arc::new(GateEngine::new(MonotonicClock::new()));
    let mut engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default());
    let timer = GateTimer::start(
        exp,
        &runtime_cfg(),
        gates.clone(),
        engine.run_state(),
        MonotonicClock::new(),
    )
    .unwrap();
    engine.arm().unwrap();

    timer.coordinator().pause();
    settle();
    let reads = pins.reads();
    pins.block(0);
    settle();
    assert_eq!(pins.reads(), reads);
    assert_eq!(gates.read_edge(GateId::A), None);
    assert!(timer.stats().held() > 0);

    timer.coordinator().resume();
    settle();
    assert!(gates.read_edge(GateId::A).is_some());
}

#[test]
fn screen_transition_holds_polling_until_cleared() {
    let exp = SimulatedExpander::new();
    let pins = exp.pins();
    let gates = Arc::new(GateEngine::new(MonotonicClock::new()));
    let mut engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default());
    let timer = GateTimer::start(
        exp,
        &runtime_cfg(),
        gates.clone(),
        engine.run_state(),
        MonotonicClock::new(),
    )
    .unwrap();
    engine.arm().unwrap();

    let coord = timer.coordinator();
    coord.set_transition_active(true);
    assert!(coord.is_held());
    settle();
    pins.block(5);
    settle();
    assert!(!gates.is_live(GateId::B));

    coord.set_transition_active(false);
    settle();
    assert!(gates.is_live(GateId::B));
    assert!(gates.read_block_start(GateId::B).is_some());
}

#[test]
fn shared_bus_handle_serves_other_subsystems() {
    let exp = SimulatedExpander::new();
    let gates = Arc::new(GateEngine::new(MonotonicClock::new()));
    let engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default());
    let mut timer = GateTimer::start(
        exp,
        &runtime_cfg(),
        gates,
        engine.run_state(),
        MonotonicClock::new(),
    )
    .unwrap();
    let bus = timer.bus();
    assert_eq!(bus.read_levels(0xFF, Duration::from_millis(200)), Ok(0xFF));
    timer.stop_polling();
    assert_eq!(bus.read_levels(0x01, Duration::from_millis(200)), Ok(0x01));
}
