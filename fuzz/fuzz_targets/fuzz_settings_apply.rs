#![no_main]
use chronos_core::{BlockRange, ExperimentSettings};
use chronos_core::experiment::compute;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: Vec<(String, f64)>| {
    let mut s = ExperimentSettings::default();
    for (key, value) in &input {
        let before = s.clone();
        if s.set(key, *value).is_err() {
            assert_eq!(s, before, "rejected value must not change settings");
        }
    }
    // Whatever got accepted must keep the formulas panic-free.
    let _ = compute::tachometer(s.tacho_slots(), 1_000);
    let _ = compute::free_fall(
        s.ff_length_mm(),
        s.ff_drop_mm(),
        Some(BlockRange { start_us: 0, end_us: 20_000 }),
    );
});
