//! Test and helper buses for chronos_core.
use chronos_traits::{BoxError, ExpanderBus, PinDirection};
use std::collections::VecDeque;

/// A bus on which every transaction fails; useful to exercise the
/// "no update this tick" path.
pub struct FailingBus {
    pub message: &'static str,
}

impl Default for FailingBus {
    fn default() -> Self {
        Self {
            message: "bus not responding",
        }
    }
}

impl ExpanderBus for FailingBus {
    fn read_levels(&mut self, _mask: u32) -> Result<u32, BoxError> {
        Err(Box::new(std::io::Error::other(self.message)))
    }

    fn set_direction(&mut self, _mask: u32, _dir: PinDirection) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other(self.message)))
    }

    fn write_level(&mut self, _mask: u32, _high: bool) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other(self.message)))
    }
}

/// Replays a fixed sequence of level snapshots, then repeats the last one.
///
/// Direction and level writes succeed and do nothing.
pub struct ScriptedBus {
    script: VecDeque<u32>,
    last: u32,
}

impl ScriptedBus {
    /// `idle` is returned before the script starts and while it is empty.
    pub fn new(idle: u32, script: impl IntoIterator<Item = u32>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: idle,
        }
    }
}

impl ExpanderBus for ScriptedBus {
    fn read_levels(&mut self, mask: u32) -> Result<u32, BoxError> {
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        Ok(self.last & mask)
    }

    fn set_direction(&mut self, _mask: u32, _dir: PinDirection) -> Result<(), BoxError> {
        Ok(())
    }

    fn write_level(&mut self, _mask: u32, _high: bool) -> Result<(), BoxError> {
        Ok(())
    }
}
