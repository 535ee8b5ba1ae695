//! Bus serializer: ordering, backpressure, reentrancy and worker lifecycle.

use chronos_core::mocks::FailingBus;
use chronos_core::{BusError, BusExecutor, ExecutorCfg, ExpanderOp, OpOutcome};
use chronos_hardware::SimulatedExpander;
use chronos_traits::clock::MonotonicClock;
use chronos_traits::{ExpanderBus, PinDirection};
use crossbeam_channel as xch;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_millis(500);

fn cfg(queue_len: usize) -> ExecutorCfg {
    ExecutorCfg {
        queue_len,
        ..ExecutorCfg::default()
    }
}

#[test]
fn sync_read_returns_levels() {
    let exp = SimulatedExpander::new();
    let pins = exp.pins();
    let ex = BusExecutor::spawn(exp, cfg(16), MonotonicClock::new());
    let h = ex.handle();

    pins.block(5);
    assert_eq!(h.read_levels(0b10_0001, WAIT), Ok(0b00_0001));
    assert_eq!(
        h.submit_sync(
            ExpanderOp::SetDirection {
                mask: 0b10,
                dir: PinDirection::Output
            },
            WAIT
        ),
        Ok(OpOutcome::Done)
    );
    assert!(pins.is_output(1));
    assert_eq!(h.completed(), 2);
}

#[test]
fn operations_run_in_submission_order() {
    let exp = SimulatedExpander::new();
    let ex = BusExecutor::spawn(exp, cfg(64), MonotonicClock::new());
    let h = ex.handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = xch::bounded(64);

    for i in 0..32u32 {
        let seen = seen.clone();
        let done_tx = done_tx.clone();
        let queued = h.call_async(
            move |_bus: &mut SimulatedExpander| {
                seen.lock().unwrap().push(i);
                Ok(OpOutcome::Done)
            },
            move |res| {
                done_tx.send(res).unwrap();
            },
        );
        assert!(queued);
    }
    for _ in 0..32 {
        assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), Ok(OpOutcome::Done));
    }
    assert_eq!(*seen.lock().unwrap(), (0..32).collect::<Vec<_>>());
}

#[test]
fn slow_operation_times_out_the_caller() {
    let exp = SimulatedExpander::new();
    exp.pins().set_latency(Duration::from_millis(200));
    let ex = BusExecutor::spawn(exp, cfg(4), MonotonicClock::new());
    let h = ex.handle();

    let res = h.read_levels(1, Duration::from_millis(20));
    assert_eq!(res, Err(BusError::Timeout));
    assert!(res.unwrap_err().is_transient());
    // The worker is still busy with the abandoned read.
    assert!(h.stalled_for_ms() > 0);
}

#[test]
fn full_queue_is_reported_not_blocked_on() {
    let exp = SimulatedExpander::new();
    exp.pins().set_latency(Duration::from_millis(200));
    let ex = BusExecutor::spawn(exp, cfg(1), MonotonicClock::new());
    let h = ex.handle();

    // First op occupies the worker, second fills the single slot.
    assert!(h.submit_async(ExpanderOp::ReadLevels { mask: 1 }, |_| {}));
    std::thread::sleep(Duration::from_millis(50));
    assert!(h.submit_async(ExpanderOp::ReadLevels { mask: 1 }, |_| {}));

    assert!(!h.submit_async(ExpanderOp::ReadLevels { mask: 1 }, |_| {}));
    assert_eq!(h.read_levels(1, WAIT), Err(BusError::QueueFull));
    assert_eq!(h.high_water(), 1);
}

#[test]
fn sync_call_from_the_worker_is_rejected() {
    let ex = BusExecutor::spawn(SimulatedExpander::new(), cfg(4), MonotonicClock::new());
    let h = ex.handle();
    let inner = h.clone();
    let (tx, rx) = xch::bounded(1);

    assert!(h.submit_async(ExpanderOp::ReadLevels { mask: 1 }, move |_| {
        tx.send(inner.read_levels(1, WAIT)).unwrap();
    }));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Err(BusError::Reentrant));
}

#[test]
fn device_errors_are_typed() {
    let ex = BusExecutor::spawn(FailingBus::default(), cfg(4), MonotonicClock::new());
    let h = ex.handle();
    assert_eq!(
        h.read_levels(1, WAIT),
        Err(BusError::Device("bus not responding".into()))
    );

    let exp = SimulatedExpander::new();
    exp.pins().fail_next(1);
    let ex = BusExecutor::spawn(exp, cfg(4), MonotonicClock::new());
    let h = ex.handle();
    assert!(matches!(h.read_levels(1, WAIT), Err(BusError::Device(_))));
    assert_eq!(h.read_levels(1, WAIT), Ok(1));
}

#[test]
fn panicking_operation_does_not_kill_the_worker() {
    let ex = BusExecutor::spawn(SimulatedExpander::new(), cfg(4), MonotonicClock::new());
    let h = ex.handle();
    let res = h.call_sync(
        |_bus: &mut SimulatedExpander| -> Result<OpOutcome, chronos_traits::BoxError> {
            panic!("driver bug")
        },
        WAIT,
    );
    assert!(matches!(res, Err(BusError::Device(_))));
    assert_eq!(h.read_levels(1, WAIT), Ok(1));
}

#[test]
fn closures_get_exclusive_bus_access() {
    let ex = BusExecutor::spawn(SimulatedExpander::new(), cfg(4), MonotonicClock::new());
    let h = ex.handle();
    let res = h.call_sync(
        |bus: &mut SimulatedExpander| {
            bus.set_direction(0b100, PinDirection::Output)?;
            bus.write_level(0b100, false)?;
            bus.read_levels(0xFF).map(OpOutcome::Levels)
        },
        WAIT,
    );
    assert_eq!(res, Ok(OpOutcome::Levels(0xFB)));
}

#[test]
fn typed_write_drives_only_output_pins() {
    let exp = SimulatedExpander::new();
    let pins = exp.pins();
    let ex = BusExecutor::spawn(exp, cfg(4), MonotonicClock::new());
    let h = ex.handle();
    let out = ExpanderOp::SetDirection {
        mask: 0b1000_0000,
        dir: PinDirection::Output,
    };
    assert_eq!(h.submit_sync(out, WAIT), Ok(OpOutcome::Done));
    let low = ExpanderOp::WriteLevel {
        mask: 0b1000_0001,
        high: false,
    };
    assert_eq!(h.submit_sync(low, WAIT), Ok(OpOutcome::Done));
    // bit 0 is still an input and keeps its pulled-up level
    assert_eq!(pins.levels(), 0x7F);
}

#[test]
fn closures_can_return_raw_bytes() {
    let ex = BusExecutor::spawn(SimulatedExpander::new(), cfg(4), MonotonicClock::new());
    let h = ex.handle();
    let res = h.call_sync(
        |bus: &mut SimulatedExpander| {
            let levels = bus.read_levels(0xFF)?;
            Ok(OpOutcome::Bytes(levels.to_le_bytes()[..1].to_vec()))
        },
        WAIT,
    );
    assert_eq!(res, Ok(OpOutcome::Bytes(vec![0xFF])));
}

#[test]
fn worker_exits_on_drop_and_handles_see_disconnect() {
    let exp = SimulatedExpander::new();
    let ex = BusExecutor::spawn(exp, cfg(4), MonotonicClock::new());
    let h = ex.handle();
    assert!(ex.is_running());
    drop(ex);
    assert_eq!(h.read_levels(1, WAIT), Err(BusError::Disconnected));
    assert!(!h.submit_async(ExpanderOp::ReadLevels { mask: 1 }, |_| {}));
}

#[test]
fn many_executors_dont_leak_threads() {
    for _ in 0..10 {
        let ex = BusExecutor::spawn(SimulatedExpander::new(), cfg(4), MonotonicClock::new());
        assert_eq!(ex.handle().read_levels(1, WAIT), Ok(1));
        drop(ex);
    }
}
