//! Per-mode experiment settings.
//!
//! Persisted as flat key/value numeric pairs. The key names match what
//! existing instruments already have stored.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::{ChronosError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    CvDistance,
    PgFlag,
    UaLength,
    UaP0,
    UaP1,
    UaP2,
    FfLength,
    FfDrop,
    InLength,
    InDistance,
    InAngle,
    TachoSlots,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::CvDistance,
        SettingKey::PgFlag,
        SettingKey::UaLength,
        SettingKey::UaP0,
        SettingKey::UaP1,
        SettingKey::UaP2,
        SettingKey::FfLength,
        SettingKey::FfDrop,
        SettingKey::InLength,
        SettingKey::InDistance,
        SettingKey::InAngle,
        SettingKey::TachoSlots,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::CvDistance => "cv_d_mm",
            SettingKey::PgFlag => "pg_flag_mm",
            SettingKey::UaLength => "ua_len_mm",
            SettingKey::UaP0 => "ua_p0",
            SettingKey::UaP1 => "ua_p1",
            SettingKey::UaP2 => "ua_p2",
            SettingKey::FfLength => "ff_len_mm",
            SettingKey::FfDrop => "ff_drop_mm",
            SettingKey::InLength => "in_len_mm",
            SettingKey::InDistance => "in_dist_mm",
            SettingKey::InAngle => "in_ang_deg",
            SettingKey::TachoSlots => "tacho_slots",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ChronosError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ChronosError::ConfigurationInvalid {
                key: s.to_string(),
                reason: "unknown setting",
            })
    }
}

/// Working copy of the per-mode settings. Lengths in mm, angle in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSettings {
    cv_distance_mm: f64,
    pg_flag_mm: f64,
    ua_length_mm: f64,
    /// Gate positions of the retired three-gate setup; stored, not used.
    ua_positions_mm: [f64; 3],
    ff_length_mm: f64,
    ff_drop_mm: f64,
    in_length_mm: f64,
    in_distance_mm: f64,
    in_angle_deg: f64,
    tacho_slots: u16,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            cv_distance_mm: 500.0,
            pg_flag_mm: 50.0,
            ua_length_mm: 50.0,
            ua_positions_mm: [0.0, 500.0, 1000.0],
            ff_length_mm: 50.0,
            ff_drop_mm: 500.0,
            in_length_mm: 50.0,
            in_distance_mm: 500.0,
            in_angle_deg: 10.0,
            tacho_slots: 1,
        }
    }
}

fn invalid(key: SettingKey, reason: &'static str) -> ChronosError {
    ChronosError::ConfigurationInvalid {
        key: key.as_str().to_string(),
        reason,
    }
}

impl ExperimentSettings {
    pub fn cv_distance_mm(&self) -> f64 {
        self.cv_distance_mm
    }
    pub fn pg_flag_mm(&self) -> f64 {
        self.pg_flag_mm
    }
    pub fn ua_length_mm(&self) -> f64 {
        self.ua_length_mm
    }
    pub fn ua_positions_mm(&self) -> [f64; 3] {
        self.ua_positions_mm
    }
    pub fn ff_length_mm(&self) -> f64 {
        self.ff_length_mm
    }
    pub fn ff_drop_mm(&self) -> f64 {
        self.ff_drop_mm
    }
    pub fn in_length_mm(&self) -> f64 {
        self.in_length_mm
    }
    pub fn in_distance_mm(&self) -> f64 {
        self.in_distance_mm
    }
    pub fn in_angle_deg(&self) -> f64 {
        self.in_angle_deg
    }
    pub fn tacho_slots(&self) -> u16 {
        self.tacho_slots
    }

    pub fn get_key(&self, key: SettingKey) -> f64 {
        match key {
            SettingKey::CvDistance => self.cv_distance_mm,
            SettingKey::PgFlag => self.pg_flag_mm,
            SettingKey::UaLength => self.ua_length_mm,
            SettingKey::UaP0 => self.ua_positions_mm[0],
            SettingKey::UaP1 => self.ua_positions_mm[1],
            SettingKey::UaP2 => self.ua_positions_mm[2],
            SettingKey::FfLength => self.ff_length_mm,
            SettingKey::FfDrop => self.ff_drop_mm,
            SettingKey::InLength => self.in_length_mm,
            SettingKey::InDistance => self.in_distance_mm,
            SettingKey::InAngle => self.in_angle_deg,
            SettingKey::TachoSlots => f64::from(self.tacho_slots),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        key.parse::<SettingKey>().ok().map(|k| self.get_key(k))
    }

    /// Validate and store one value. On error the prior value is kept.
    pub fn set_key(&mut self, key: SettingKey, value: f64) -> std::result::Result<(), ChronosError> {
        if !value.is_finite() {
            return Err(invalid(key, "must be a finite number"));
        }
        match key {
            SettingKey::UaP0 | SettingKey::UaP1 | SettingKey::UaP2 => {
                if value < 0.0 {
                    return Err(invalid(key, "must be >= 0"));
                }
            }
            SettingKey::InAngle => {
                if !(0.0..90.0).contains(&value) {
                    return Err(invalid(key, "must be in [0, 90) degrees"));
                }
            }
            SettingKey::TachoSlots => {
                if value < 1.0 || value.fract() != 0.0 || value > f64::from(u16::MAX) {
                    return Err(invalid(key, "must be a whole number >= 1"));
                }
            }
            _ => {
                if value <= 0.0 {
                    return Err(invalid(key, "must be > 0"));
                }
            }
        }

        match key {
            SettingKey::CvDistance => self.cv_distance_mm = value,
            SettingKey::PgFlag => self.pg_flag_mm = value,
            SettingKey::UaLength => self.ua_length_mm = value,
            SettingKey::UaP0 => self.ua_positions_mm[0] = value,
            SettingKey::UaP1 => self.ua_positions_mm[1] = value,
            SettingKey::UaP2 => self.ua_positions_mm[2] = value,
            SettingKey::FfLength => self.ff_length_mm = value,
            SettingKey::FfDrop => self.ff_drop_mm = value,
            SettingKey::InLength => self.in_length_mm = value,
            SettingKey::InDistance => self.in_distance_mm = value,
            SettingKey::InAngle => self.in_angle_deg = value,
            SettingKey::TachoSlots => self.tacho_slots = value as u16,
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: f64) -> std::result::Result<(), ChronosError> {
        self.set_key(key.parse()?, value)
    }

    /// Adopt persisted pairs. Unknown keys and invalid values are skipped
    /// with a warning and leave the current value in place.
    ///
    /// Returns how many pairs were applied.
    pub fn apply_pairs<I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut applied = 0;
        for (key, value) in pairs {
            match self.set(&key, value) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!(%key, value, error = %e, "ignoring persisted setting"),
            }
        }
        applied
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, f64)> {
        SettingKey::ALL
            .into_iter()
            .map(|k| (k.as_str(), self.get_key(k)))
            .collect()
    }
}

/// Where settings live between power cycles.
pub trait SettingsStore: Send {
    fn load(&self) -> Result<Vec<(String, f64)>>;
    fn save(&self, pairs: &[(&'static str, f64)]) -> Result<()>;
}

/// Volatile store, for tests and runs without a settings file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pairs: Mutex<Vec<(String, f64)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs(pairs: Vec<(String, f64)>) -> Self {
        Self {
            pairs: Mutex::new(pairs),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Vec<(String, f64)>> {
        Ok(self
            .pairs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save(&self, pairs: &[(&'static str, f64)]) -> Result<()> {
        *self
            .pairs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) =
            pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect();
        Ok(())
    }
}

/// Settings CSV (`key,value`) on disk.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for CsvStore {
    /// A missing file is an empty store.
    fn load(&self) -> Result<Vec<(String, f64)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let rows = chronos_config::load_settings_csv(&self.path)?;
        Ok(rows.into_iter().map(|r| (r.key, r.value)).collect())
    }

    fn save(&self, pairs: &[(&'static str, f64)]) -> Result<()> {
        let rows: Vec<chronos_config::SettingRow> = pairs
            .iter()
            .map(|(k, v)| chronos_config::SettingRow {
                key: (*k).to_string(),
                value: *v,
            })
            .collect();
        chronos_config::save_settings_csv(&self.path, &rows)
    }
}
