//! Access primitives for the I/O expander that reports gate levels.
//!
//! Implementations talk to the shared low-speed bus directly and are therefore
//! owned by exactly one worker (see `chronos_core::executor`). Nothing else
//! should hold one.

use crate::BoxError;

/// Direction of an expander pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

pub trait ExpanderBus {
    /// Read the levels of every pin selected by `mask` in one bus transaction.
    ///
    /// Returned bits outside `mask` are zero. A set bit means the pin is high.
    fn read_levels(&mut self, mask: u32) -> Result<u32, BoxError>;

    fn set_direction(&mut self, mask: u32, dir: PinDirection) -> Result<(), BoxError>;

    /// Drive every output pin in `mask` high or low.
    fn write_level(&mut self, mask: u32, high: bool) -> Result<(), BoxError>;
}

impl<B: ExpanderBus + ?Sized> ExpanderBus for Box<B> {
    fn read_levels(&mut self, mask: u32) -> Result<u32, BoxError> {
        (**self).read_levels(mask)
    }

    fn set_direction(&mut self, mask: u32, dir: PinDirection) -> Result<(), BoxError> {
        (**self).set_direction(mask, dir)
    }

    fn write_level(&mut self, mask: u32, high: bool) -> Result<(), BoxError> {
        (**self).write_level(mask, high)
    }
}
