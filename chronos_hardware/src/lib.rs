#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod ch422g;
pub mod error;
pub mod util;

use chronos_traits::{BoxError, ExpanderBus, PinDirection};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use ch422g::Ch422g;

use crate::error::HwError;

/// Pins the simulated expander exposes (one 8-bit bank, like the CH422G).
pub const SIM_PINS: u32 = 0xFF;

#[derive(Debug)]
struct SimState {
    levels: u32,
    outputs: u32,
    fail_next: u32,
    latency: Duration,
    reads: u64,
}

/// Simulated expander implementation.
///
/// All inputs idle high (pulled up), which is "beam open" for active-low
/// photogates. Move the expander into the bus worker and keep a
/// [`SimulatedPins`] handle to drive levels from the outside.
pub struct SimulatedExpander {
    state: Arc<Mutex<SimState>>,
}

/// Test-side handle onto a [`SimulatedExpander`]'s pin levels.
#[derive(Clone)]
pub struct SimulatedPins {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl SimulatedExpander {
    pub fn new() -> Self {
        SimulatedExpander {
            state: Arc::new(Mutex::new(SimState {
                levels: SIM_PINS,
                outputs: 0,
                fail_next: 0,
                latency: Duration::ZERO,
                reads: 0,
            })),
        }
    }

    pub fn pins(&self) -> SimulatedPins {
        SimulatedPins {
            state: self.state.clone(),
        }
    }
}

impl Default for SimulatedExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPins {
    pub fn set_pin(&self, bit: u8, high: bool) {
        let mut st = lock(&self.state);
        if high {
            st.levels |= 1 << bit;
        } else {
            st.levels &= !(1 << bit);
        }
    }

    /// Interrupt the beam on an active-low gate input.
    pub fn block(&self, bit: u8) {
        self.set_pin(bit, false);
    }

    pub fn unblock(&self, bit: u8) {
        self.set_pin(bit, true);
    }

    pub fn levels(&self) -> u32 {
        lock(&self.state).levels
    }

    pub fn is_output(&self, bit: u8) -> bool {
        lock(&self.state).outputs & (1 << bit) != 0
    }

    /// Make the next `n` bus transactions fail.
    pub fn fail_next(&self, n: u32) {
        lock(&self.state).fail_next = n;
    }

    /// Add a fixed delay to every transaction, like a slow or contended bus.
    pub fn set_latency(&self, d: Duration) {
        lock(&self.state).latency = d;
    }

    /// Number of level reads served so far.
    pub fn reads(&self) -> u64 {
        lock(&self.state).reads
    }
}

impl SimulatedExpander {
    fn begin(&mut self) -> Result<(), HwError> {
        let latency = {
            let mut st = lock(&self.state);
            if st.fail_next > 0 {
                st.fail_next -= 1;
                return Err(HwError::InjectedFault);
            }
            st.latency
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        Ok(())
    }
}

impl ExpanderBus for SimulatedExpander {
    fn read_levels(&mut self, mask: u32) -> Result<u32, BoxError> {
        self.begin()?;
        let mut st = lock(&self.state);
        st.reads += 1;
        Ok(st.levels & mask & SIM_PINS)
    }

    fn set_direction(&mut self, mask: u32, dir: PinDirection) -> Result<(), BoxError> {
        if mask & !SIM_PINS != 0 {
            return Err(Box::new(HwError::PinOutOfRange(
                (mask & !SIM_PINS).trailing_zeros() as u8,
            )));
        }
        self.begin()?;
        let mut st = lock(&self.state);
        match dir {
            PinDirection::Output => st.outputs |= mask,
            PinDirection::Input => st.outputs &= !mask,
        }
        tracing::debug!(mask, ?dir, "simulated expander direction");
        Ok(())
    }

    fn write_level(&mut self, mask: u32, high: bool) -> Result<(), BoxError> {
        self.begin()?;
        let mut st = lock(&self.state);
        let writable = mask & st.outputs;
        if high {
            st.levels |= writable;
        } else {
            st.levels &= !writable;
        }
        Ok(())
    }
}
