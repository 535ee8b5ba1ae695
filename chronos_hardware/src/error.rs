use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("expander read timeout")]
    Timeout,
    #[error("expander not ready before timeout")]
    NotReady,
    #[error("pin {0} is out of range for the expander")]
    PinOutOfRange(u8),
    #[error("simulated fault")]
    InjectedFault,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
