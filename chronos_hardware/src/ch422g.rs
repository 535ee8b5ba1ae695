//! CH422G I/O expander over Linux I2C.
//!
//! The chip has no register map: the 7-bit I2C address selects the function.
//! IO0..IO7 share one direction bit (`IO_OE`), so a mask that asks for any
//! output switches the whole bank.
use std::time::Duration;
use tracing::{debug, trace};

use chronos_traits::{BoxError, ExpanderBus, PinDirection};
use rppal::i2c::I2c;

use crate::error::{HwError, Result};
use crate::util::wait_until_ready_with_timeout;

const ADDR_SYSTEM: u16 = 0x24;
const ADDR_READ_IO: u16 = 0x26;
const ADDR_WRITE_IO: u16 = 0x38;

const SYS_IO_OE: u8 = 0x01;

const IO_PINS: u32 = 0xFF;

pub struct Ch422g {
    i2c: I2c,
    system: u8,
    out_latch: u8,
}

impl Ch422g {
    /// Open `/dev/i2c-<bus>` and wait until the expander acknowledges a read.
    pub fn open(bus: u8, ready_timeout: Duration) -> Result<Self> {
        let i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        let mut dev = Self {
            i2c,
            system: 0,
            out_latch: 0xFF,
        };
        let attempts = wait_until_ready_with_timeout(
            || dev.read_io().is_ok(),
            ready_timeout,
            Duration::from_millis(5),
        )?;
        dev.write_system(0)?;
        debug!(bus, attempts, "ch422g ready, IO0..7 as inputs");
        Ok(dev)
    }

    fn read_io(&mut self) -> Result<u8> {
        self.i2c
            .set_slave_address(ADDR_READ_IO)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        let mut buf = [0u8; 1];
        self.i2c
            .read(&mut buf)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        trace!(levels = buf[0], "ch422g io read");
        Ok(buf[0])
    }

    fn write_system(&mut self, value: u8) -> Result<()> {
        self.i2c
            .set_slave_address(ADDR_SYSTEM)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.i2c
            .write(&[value])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.system = value;
        Ok(())
    }

    fn write_io(&mut self, value: u8) -> Result<()> {
        self.i2c
            .set_slave_address(ADDR_WRITE_IO)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.i2c
            .write(&[value])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.out_latch = value;
        Ok(())
    }
}

fn check_mask(mask: u32) -> Result<u8> {
    if mask & !IO_PINS != 0 {
        let first_bad = (mask & !IO_PINS).trailing_zeros() as u8;
        return Err(HwError::PinOutOfRange(first_bad));
    }
    Ok(mask as u8)
}

impl ExpanderBus for Ch422g {
    fn read_levels(&mut self, mask: u32) -> std::result::Result<u32, BoxError> {
        let mask = check_mask(mask)?;
        Ok(u32::from(self.read_io()? & mask))
    }

    fn set_direction(&mut self, mask: u32, dir: PinDirection) -> std::result::Result<(), BoxError> {
        check_mask(mask)?;
        let next = match dir {
            PinDirection::Output => self.system | SYS_IO_OE,
            PinDirection::Input => self.system & !SYS_IO_OE,
        };
        if next != self.system {
            self.write_system(next)?;
        }
        Ok(())
    }

    fn write_level(&mut self, mask: u32, high: bool) -> std::result::Result<(), BoxError> {
        let mask = check_mask(mask)?;
        let next = if high {
            self.out_latch | mask
        } else {
            self.out_latch & !mask
        };
        self.write_io(next)?;
        Ok(())
    }
}
