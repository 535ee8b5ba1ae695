use thiserror::Error;

/// Failures of a submitted bus operation.
///
/// `Timeout` and `QueueFull` are backpressure: retry on the next tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("bus request timed out")]
    Timeout,
    #[error("bus request queue is full")]
    QueueFull,
    #[error("bus device error: {0}")]
    Device(String),
    #[error("synchronous bus request from the bus worker itself")]
    Reentrant,
    #[error("bus worker is not running")]
    Disconnected,
}

impl BusError {
    /// True for conditions expected under load that clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Timeout | BusError::QueueFull)
    }
}

/// Why a compute request produced no measurement.
///
/// None of these are failures; waiting for the next trigger is the normal
/// state of an armed experiment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("measurement not ready")]
    NotReady,
    #[error("invalid edge ordering: {0}")]
    InvalidOrdering(&'static str),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum ChronosError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("invalid setting {key}: {reason}")]
    ConfigurationInvalid { key: String, reason: &'static str },
    #[error("invalid experiment transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("unknown experiment mode: {0}")]
    UnknownMode(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
