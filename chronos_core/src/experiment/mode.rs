use std::fmt;
use std::str::FromStr;

use crate::error::ChronosError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExperimentMode {
    /// Constant velocity between gate A and gate B triggers.
    LinearMotion,
    Photogate,
    UniformAccel,
    FreeFall,
    Incline,
    Tachometer,
}

impl ExperimentMode {
    /// Export order.
    pub const ALL: [ExperimentMode; 6] = [
        ExperimentMode::LinearMotion,
        ExperimentMode::Photogate,
        ExperimentMode::UniformAccel,
        ExperimentMode::FreeFall,
        ExperimentMode::Incline,
        ExperimentMode::Tachometer,
    ];

    /// Tag written to history rows and exports.
    pub fn tag(self) -> &'static str {
        match self {
            ExperimentMode::LinearMotion => "CV",
            ExperimentMode::Photogate => "Photogate",
            ExperimentMode::UniformAccel => "UA",
            ExperimentMode::FreeFall => "FreeFall",
            ExperimentMode::Incline => "Incline",
            ExperimentMode::Tachometer => "Tachometer",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ExperimentMode::LinearMotion => 0,
            ExperimentMode::Photogate => 1,
            ExperimentMode::UniformAccel => 2,
            ExperimentMode::FreeFall => 3,
            ExperimentMode::Incline => 4,
            ExperimentMode::Tachometer => 5,
        }
    }

    /// Which sigmas are stamped: (speed, acceleration).
    pub fn sigma_fields(self) -> (bool, bool) {
        match self {
            ExperimentMode::LinearMotion | ExperimentMode::Photogate => (true, false),
            ExperimentMode::UniformAccel | ExperimentMode::FreeFall | ExperimentMode::Incline => {
                (true, true)
            }
            ExperimentMode::Tachometer => (false, false),
        }
    }
}

impl fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ExperimentMode {
    type Err = ChronosError;

    /// Accepts the tag or a short alias, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.trim().to_ascii_lowercase().as_str() {
            "cv" | "linear" | "linear-motion" => ExperimentMode::LinearMotion,
            "photogate" | "pg" => ExperimentMode::Photogate,
            "ua" | "uniform-accel" => ExperimentMode::UniformAccel,
            "freefall" | "free-fall" | "ff" => ExperimentMode::FreeFall,
            "incline" | "in" => ExperimentMode::Incline,
            "tachometer" | "tacho" => ExperimentMode::Tachometer,
            _ => return Err(ChronosError::UnknownMode(s.to_string())),
        };
        Ok(mode)
    }
}
