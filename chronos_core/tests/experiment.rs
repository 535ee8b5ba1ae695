//! Experiment engine over a shared gate engine with a manual clock.

use chronos_core::{
    ExperimentEngine, ExperimentMode, ExperimentState, GateEngine, GateId, HistoryCfg,
    MemoryStore, Rejected, SettingsStore,
};
use chronos_traits::clock::test_clock::ManualClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

struct Bench {
    clock: ManualClock,
    gates: Arc<GateEngine>,
    engine: ExperimentEngine,
}

#[fixture]
fn bench() -> Bench {
    let clock = ManualClock::new();
    let gates = Arc::new(GateEngine::new(clock.clone()));
    let engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default());
    Bench {
        clock,
        gates,
        engine,
    }
}

fn block(g: &GateEngine, gate: GateId, start_us: u64, end_us: u64) {
    g.record_edge_at(gate, start_us);
    g.record_block_start_at(gate, start_us);
    g.record_block_end_at(gate, end_us);
}

#[rstest]
fn linear_motion_records_and_clears_edges(mut bench: Bench) {
    bench.gates.record_edge_at(GateId::A, 1_000);
    bench.gates.record_edge_at(GateId::B, 6_000);
    bench.gates.record_block_start_at(GateId::A, 1_000);
    bench.gates.record_block_end_at(GateId::A, 2_000);

    let m = bench.engine.record(ExperimentMode::LinearMotion).unwrap();
    assert!((m.speed_mps - 100.0).abs() < 1e-9);
    assert_eq!(m.time_ms, 5.0);

    // Edges consumed, block ranges untouched.
    assert_eq!(bench.gates.read_edge(GateId::A), None);
    assert!(bench.gates.read_block_range(GateId::A).is_some());
    assert_eq!(
        bench.engine.record(ExperimentMode::LinearMotion),
        Err(Rejected::NotReady)
    );
}

#[rstest]
fn free_fall_and_ua_reference_values(mut bench: Bench) {
    block(&bench.gates, GateId::A, 0, 20_000);
    let m = bench.engine.record(ExperimentMode::FreeFall).unwrap();
    assert!((m.acc_mps2 - 6.579).abs() < 0.001);
    assert_eq!(bench.gates.read_block_range(GateId::A), None);

    block(&bench.gates, GateId::A, 1_000_000, 1_010_000);
    block(&bench.gates, GateId::B, 1_100_000, 1_105_000);
    let m = bench.engine.record(ExperimentMode::UniformAccel).unwrap();
    assert!((m.acc_mps2 - 51.28).abs() < 0.01);
    // Edges recorded alongside the ranges survive a block-range mode.
    assert!(bench.gates.read_edge(GateId::B).is_some());
}

#[rstest]
fn invalid_ordering_is_discarded_without_a_run(mut bench: Bench) {
    block(&bench.gates, GateId::B, 0, 5_000);
    block(&bench.gates, GateId::A, 100_000, 110_000);
    assert!(matches!(
        bench.engine.record(ExperimentMode::UniformAccel),
        Err(Rejected::InvalidOrdering(_))
    ));
    assert_eq!(bench.engine.history().len(ExperimentMode::UniformAccel), 0);

    // Rejected runs leave the gate state where it was.
    assert!(bench.gates.read_block_range(GateId::A).is_some());
    assert!(bench.gates.read_block_range(GateId::B).is_some());
    assert_eq!(bench.gates.read_edge(GateId::B), Some(0));
}

#[rstest]
fn incline_stores_distance_front_interval_and_exit_speed(mut bench: Bench) {
    block(&bench.gates, GateId::A, 1_000_000, 1_010_000);
    block(&bench.gates, GateId::B, 1_100_000, 1_105_000);
    let m = bench.engine.record(ExperimentMode::Incline).unwrap();

    assert_eq!(m.d_mm, 500.0);
    assert!((m.time_ms - 100.0).abs() < 1e-9);
    assert!((m.speed_mps - 10.0).abs() < 1e-9);
    assert!((m.v1_mps - 5.0).abs() < 1e-9);
    assert!((m.acc_mps2 - 51.28).abs() < 0.01);
    let theory = m.theory_acc_mps2.unwrap();
    assert!((theory - 1.7035).abs() < 1e-3);

    let rec = bench.engine.history().latest(ExperimentMode::Incline).unwrap();
    assert_eq!(rec.run, 1);
    assert_eq!(rec.d_mm, 500.0);

    // Block ranges consumed, single triggers kept.
    assert_eq!(bench.gates.read_block_range(GateId::A), None);
    assert_eq!(bench.gates.read_block_range(GateId::B), None);
    assert_eq!(bench.gates.read_edge(GateId::A), Some(1_000_000));
    assert_eq!(bench.gates.read_edge(GateId::B), Some(1_100_000));
}

#[rstest]
fn single_gate_mode_leaves_the_other_gate_alone(mut bench: Bench) {
    block(&bench.gates, GateId::A, 0, 20_000);
    block(&bench.gates, GateId::B, 30_000, 35_000);
    bench.engine.record(ExperimentMode::Photogate).unwrap();
    assert_eq!(bench.gates.read_block_range(GateId::A), None);
    assert!(bench.gates.read_block_range(GateId::B).is_some());
}

#[rstest]
fn tachometer_seeds_then_measures(mut bench: Bench) {
    bench.gates.record_edge_at(GateId::A, 1_000);
    assert_eq!(
        bench.engine.record(ExperimentMode::Tachometer),
        Err(Rejected::NotReady)
    );
    bench.gates.record_edge_at(GateId::A, 1_001_000);
    let m = bench.engine.record(ExperimentMode::Tachometer).unwrap();
    assert!((m.rpm - 60.0).abs() < 1e-9);

    bench.engine.set_setting("tacho_slots", 4.0).unwrap();
    bench.gates.record_edge_at(GateId::A, 1_251_000);
    let m = bench.engine.record(ExperimentMode::Tachometer).unwrap();
    assert!((m.rpm - 60.0).abs() < 1e-9);

    let rec = bench
        .engine
        .history()
        .latest(ExperimentMode::Tachometer)
        .unwrap();
    assert_eq!(rec.run, 2);
    assert_eq!(rec.sigma_speed, 0.0);
}

#[rstest]
fn tachometer_two_slots_at_half_second(mut bench: Bench) {
    bench.engine.set_setting("tacho_slots", 2.0).unwrap();
    bench.gates.record_edge_at(GateId::A, 1_000);
    assert_eq!(
        bench.engine.record(ExperimentMode::Tachometer),
        Err(Rejected::NotReady)
    );
    bench.gates.record_edge_at(GateId::A, 501_000);
    let m = bench.engine.record(ExperimentMode::Tachometer).unwrap();
    assert!((m.rpm - 60.0).abs() < 1e-9);
    assert_eq!(m.time_ms, 500.0);
}

#[rstest]
fn tachometer_seed_keeps_gate_b_trigger(mut bench: Bench) {
    bench.gates.record_edge_at(GateId::B, 7_000);
    bench.gates.record_edge_at(GateId::A, 1_000);
    assert_eq!(
        bench.engine.record(ExperimentMode::Tachometer),
        Err(Rejected::NotReady)
    );
    assert_eq!(bench.gates.read_edge(GateId::A), None);
    assert_eq!(bench.gates.read_edge(GateId::B), Some(7_000));

    // A stale trigger is discarded without touching gate B either.
    bench.gates.record_edge_at(GateId::A, 500);
    assert!(matches!(
        bench.engine.record(ExperimentMode::Tachometer),
        Err(Rejected::InvalidOrdering(_))
    ));
    assert_eq!(bench.gates.read_edge(GateId::B), Some(7_000));
}

#[rstest]
fn ring_evicts_oldest_and_keeps_numbering(mut bench: Bench) {
    for i in 0..51u64 {
        let t = i * 100_000;
        block(&bench.gates, GateId::A, t, t + 10_000 + i);
        bench.engine.record(ExperimentMode::Photogate).unwrap();
    }
    let reader = bench.engine.history();
    let runs: Vec<u32> = reader
        .records(ExperimentMode::Photogate)
        .iter()
        .map(|r| r.run)
        .collect();
    assert_eq!(runs.len(), 50);
    assert_eq!(runs[0], 2);
    assert_eq!(runs[49], 51);
    assert!(runs.windows(2).all(|w| w[1] == w[0] + 1));

    let sigma = reader.records(ExperimentMode::Photogate)[0].sigma_speed;
    assert!(sigma > 0.0);
    assert!(
        reader
            .records(ExperimentMode::Photogate)
            .iter()
            .all(|r| r.sigma_speed == sigma)
    );

    bench.engine.clear_history(ExperimentMode::Photogate);
    block(&bench.gates, GateId::A, 0, 10_000);
    bench.engine.record(ExperimentMode::Photogate).unwrap();
    assert_eq!(reader.latest(ExperimentMode::Photogate).unwrap().run, 1);
}

#[rstest]
fn last_lines_show_ten_newest(mut bench: Bench) {
    for i in 0..12u64 {
        let t = i * 1_000_000;
        block(&bench.gates, GateId::A, t, t + 20_000);
        bench.engine.record(ExperimentMode::FreeFall).unwrap();
    }
    let lines = bench.engine.last_lines(ExperimentMode::FreeFall);
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0], "3 v=2.500 m/s g=6.579 m/s² τ=20 ms");
}

#[rstest]
fn timestamps_default_to_uptime(mut bench: Bench) {
    bench.clock.advance_us(3_723_045_000);
    let now = bench.gates.now_us();
    block(&bench.gates, GateId::A, now - 20_000, now);
    bench.engine.record(ExperimentMode::Photogate).unwrap();
    let rec = bench
        .engine
        .history()
        .latest(ExperimentMode::Photogate)
        .unwrap();
    assert_eq!(rec.timestamp, "01:02:03.045");
}

#[test]
fn injected_timestamp_source_is_used() {
    let gates = Arc::new(GateEngine::new(ManualClock::new()));
    let mut engine = ExperimentEngine::new(gates.clone(), &HistoryCfg::default())
        .with_timestamp_source(|| "2026-10-15 12:00:00".to_string());
    block(&gates, GateId::A, 0, 20_000);
    engine.record(ExperimentMode::Photogate).unwrap();
    let rec = engine.history().latest(ExperimentMode::Photogate).unwrap();
    assert_eq!(rec.timestamp, "2026-10-15 12:00:00");
}

#[rstest]
fn arming_gates_polling_and_clears_stale_state(mut bench: Bench) {
    assert!(!bench.engine.should_poll());
    bench.gates.record_edge_at(GateId::A, 5);
    bench.gates.set_live(GateId::A, true);
    bench.engine.arm().unwrap();
    assert_eq!(bench.engine.state(), ExperimentState::Armed);
    assert!(bench.engine.run_state().should_poll());
    assert_eq!(bench.gates.read_edge(GateId::A), None);
    assert!(bench.gates.is_live(GateId::A));

    bench.engine.start().unwrap();
    bench.engine.finish().unwrap();
    assert!(!bench.engine.should_poll());
    assert!(bench.engine.start().is_err());
    bench.engine.disarm();
    assert_eq!(bench.engine.state(), ExperimentState::Idle);
}

#[test]
fn settings_load_from_and_persist_to_the_store() {
    let store = MemoryStore::with_pairs(vec![
        ("cv_d_mm".into(), 250.0),
        ("tacho_slots".into(), 0.0),
        ("bogus".into(), 1.0),
    ]);
    let gates = Arc::new(GateEngine::new(ManualClock::new()));
    let mut engine = ExperimentEngine::new(gates, &HistoryCfg::default())
        .with_store(store)
        .unwrap();
    assert_eq!(engine.get_setting("cv_d_mm"), Some(250.0));
    assert_eq!(engine.get_setting("tacho_slots"), Some(1.0));

    let err = engine.set_setting("ff_drop_mm", -1.0).unwrap_err();
    assert!(format!("{err}").contains("ff_drop_mm"));
    assert_eq!(engine.get_setting("ff_drop_mm"), Some(500.0));

    engine.set_setting("ff_drop_mm", 750.0).unwrap();
    assert_eq!(engine.settings().ff_drop_mm(), 750.0);
}

#[test]
fn memory_store_sees_saved_values() {
    let store = MemoryStore::new();
    store.save(&[("pg_flag_mm", 25.0)]).unwrap();
    assert_eq!(store.load().unwrap(), vec![("pg_flag_mm".to_string(), 25.0)]);
}

#[rstest]
fn export_lists_modes_in_fixed_order(mut bench: Bench) {
    bench.gates.record_edge_at(GateId::A, 0);
    bench.engine.record(ExperimentMode::Tachometer).ok();
    bench.gates.record_edge_at(GateId::A, 500_000);
    bench.engine.record(ExperimentMode::Tachometer).unwrap();
    bench.gates.record_edge_at(GateId::A, 1_000_000);
    bench.gates.record_edge_at(GateId::B, 1_005_000);
    bench.engine.record(ExperimentMode::LinearMotion).unwrap();

    let mut buf = Vec::new();
    assert_eq!(bench.engine.export_csv(&mut buf).unwrap(), 2);
    let text = String::from_utf8(buf).unwrap();
    let modes: Vec<&str> = text
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(modes, vec!["CV", "Tachometer"]);
}
