use chronos_core::debounce::{ChannelDebouncer, Transition};
use chronos_core::experiment::history::{HistoryRing, sample_std_dev};
use chronos_core::{ExperimentMode, GateEngine, GateId};
use chronos_traits::clock::test_clock::ManualClock;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum GateOp {
    Edge(u64),
    Start(u64),
    End(u64),
    ClearEdges,
    ClearRanges,
}

fn gate_op() -> impl Strategy<Value = GateOp> {
    prop_oneof![
        2 => (0u64..10_000).prop_map(GateOp::Edge),
        4 => (0u64..10_000).prop_map(GateOp::Start),
        4 => (0u64..10_000).prop_map(GateOp::End),
        1 => Just(GateOp::ClearEdges),
        1 => Just(GateOp::ClearRanges),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    // Whatever order starts, ends and clears arrive in, a reported range is well formed
    // and never older than the latest start. Triggers only change on their own record
    // and clear calls.
    #[test]
    fn block_range_is_always_well_formed(ops in proptest::collection::vec(gate_op(), 1..64)) {
        let g = GateEngine::new(ManualClock::new());
        let mut edge = None;
        for op in ops {
            match op {
                GateOp::Edge(t) => {
                    g.record_edge_at(GateId::A, t);
                    edge = Some(t);
                }
                GateOp::Start(t) => g.record_block_start_at(GateId::A, t),
                GateOp::End(t) => g.record_block_end_at(GateId::A, t),
                GateOp::ClearEdges => {
                    g.clear_edges();
                    edge = None;
                }
                GateOp::ClearRanges => g.clear_block_ranges(),
            }
            prop_assert_eq!(g.read_edge(GateId::A), edge);
            if let Some(r) = g.read_block_range(GateId::A) {
                prop_assert!(r.end_us > r.start_us);
                prop_assert_eq!(Some(r.start_us), g.read_block_start(GateId::A));
            }
        }
    }

    // Committed transitions alternate and end at the debounced level.
    #[test]
    fn debouncer_transitions_alternate(
        threshold in 1u8..5,
        samples in proptest::collection::vec(any::<bool>(), 0..200),
    ) {
        let mut d = ChannelDebouncer::new(threshold);
        d.seed(false);
        let mut level = false;
        for s in samples {
            if let Some(t) = d.feed(s) {
                match t {
                    Transition::Blocked => prop_assert!(!level),
                    Transition::Unblocked => prop_assert!(level),
                }
                level = !level;
            }
            prop_assert_eq!(d.level(), level);
        }
    }

    // Runs of length < threshold never commit.
    #[test]
    fn short_glitches_never_commit(threshold in 2u8..6, glitch in 1u8..6) {
        prop_assume!(glitch < threshold);
        let mut d = ChannelDebouncer::new(threshold);
        d.seed(false);
        for _ in 0..glitch {
            prop_assert_eq!(d.feed(true), None);
        }
        prop_assert_eq!(d.feed(false), None);
        prop_assert!(!d.level());
    }

    #[test]
    fn ring_never_exceeds_capacity(capacity in 1usize..60, pushes in 0usize..150) {
        let mut ring = HistoryRing::new(ExperimentMode::Photogate, capacity);
        let m = chronos_core::experiment::compute::tachometer(1, 1_000).unwrap();
        for _ in 0..pushes {
            ring.push(&m, String::new());
        }
        prop_assert_eq!(ring.len(), pushes.min(capacity));
        if let Some(last) = ring.latest() {
            prop_assert_eq!(last.run as usize, pushes);
        }
    }

    #[test]
    fn std_dev_is_shift_invariant(
        xs in proptest::collection::vec(-1e3f64..1e3, 2..40),
        shift in -1e3f64..1e3,
    ) {
        let shifted: Vec<f64> = xs.iter().map(|x| x + shift).collect();
        let a = sample_std_dev(&xs);
        let b = sample_std_dev(&shifted);
        prop_assert!(a >= 0.0);
        prop_assert!((a - b).abs() < 1e-6);
    }
}
