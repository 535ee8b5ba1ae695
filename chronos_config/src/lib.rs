#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and persisted experiment settings for the gate timer.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The settings CSV is the key/value store behind per-mode experiment
//!   settings (flag length, drop height, ...). Loading enforces headers and
//!   saving replaces the file atomically.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Number of IO pins on the gate expander bank.
pub const EXPANDER_PINS: u8 = 8;

/// Settings CSV schema.
///
/// Expected headers:
/// key,value
///
/// Example:
/// key,value
/// cv_d_mm,500
/// ff_drop_mm,750
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SettingRow {
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusCfg {
    /// Depth of the serializer request queue
    pub queue_len: usize,
    /// How long a synchronous caller waits for its result
    pub sync_timeout_ms: u64,
    /// How long a synchronous caller waits for queue space (0 = fail fast)
    pub enqueue_wait_ms: u64,
    /// Linux I2C bus number for the hardware backend
    pub i2c_bus: u8,
    /// Bring-up wait for the expander to acknowledge
    pub ready_timeout_ms: u64,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            queue_len: 16,
            sync_timeout_ms: 50,
            enqueue_wait_ms: 0,
            i2c_bus: 1,
            ready_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatesCfg {
    /// Expander bit wired to gate A
    pub gate_a_bit: u8,
    /// Expander bit wired to gate B
    pub gate_b_bit: u8,
    /// Photogates pull low while the beam is interrupted
    pub active_low: bool,
}

impl Default for GatesCfg {
    fn default() -> Self {
        Self {
            gate_a_bit: 0,
            gate_b_bit: 5,
            active_low: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollerCfg {
    /// Time between bus snapshots
    pub period_ms: u64,
    /// Consecutive identical samples required before a level change commits
    pub debounce_threshold: u8,
}

impl Default for PollerCfg {
    fn default() -> Self {
        Self {
            period_ms: 10,
            debounce_threshold: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryCfg {
    /// Runs retained per experiment mode
    pub capacity: usize,
    /// Rows shown by the history list
    pub display_rows: usize,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            capacity: 50,
            display_rows: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EventsCfg {
    /// Gate events buffered for the UI before new ones are dropped
    pub queue_len: usize,
}

impl Default for EventsCfg {
    fn default() -> Self {
        Self { queue_len: 32 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SettingsCfg {
    /// Key/value CSV holding per-mode experiment settings
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub bus: BusCfg,
    pub gates: GatesCfg,
    pub poller: PollerCfg,
    pub history: HistoryCfg,
    pub events: EventsCfg,
    pub logging: Logging,
    pub settings: SettingsCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Bus
        if self.bus.queue_len == 0 {
            eyre::bail!("bus.queue_len must be >= 1");
        }
        if self.bus.sync_timeout_ms == 0 {
            eyre::bail!("bus.sync_timeout_ms must be >= 1");
        }
        if self.bus.enqueue_wait_ms > self.bus.sync_timeout_ms.saturating_mul(10) {
            eyre::bail!("bus.enqueue_wait_ms is unreasonably large (>10x sync_timeout_ms)");
        }

        // Gates
        if self.gates.gate_a_bit >= EXPANDER_PINS {
            eyre::bail!("gates.gate_a_bit must be < {EXPANDER_PINS}");
        }
        if self.gates.gate_b_bit >= EXPANDER_PINS {
            eyre::bail!("gates.gate_b_bit must be < {EXPANDER_PINS}");
        }
        if self.gates.gate_a_bit == self.gates.gate_b_bit {
            eyre::bail!("gates.gate_a_bit and gates.gate_b_bit must differ");
        }

        // Poller
        if self.poller.period_ms == 0 {
            eyre::bail!("poller.period_ms must be >= 1");
        }
        if self.poller.period_ms > 1000 {
            eyre::bail!("poller.period_ms is unreasonably large (>1s)");
        }
        if self.poller.debounce_threshold == 0 {
            eyre::bail!("poller.debounce_threshold must be >= 1");
        }

        // History
        if self.history.capacity == 0 {
            eyre::bail!("history.capacity must be >= 1");
        }
        if self.history.display_rows == 0 {
            eyre::bail!("history.display_rows must be >= 1");
        }

        // Events
        if self.events.queue_len == 0 {
            eyre::bail!("events.queue_len must be >= 1");
        }

        Ok(())
    }
}

pub fn load_settings_csv(path: &Path) -> eyre::Result<Vec<SettingRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open settings CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["key", "value"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "settings CSV must have headers 'key,value', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<SettingRow>().enumerate() {
        match rec {
            Ok(row) => {
                if row.key.is_empty() {
                    eyre::bail!("invalid CSV row {}: empty key", idx + 2);
                }
                if !row.value.is_finite() {
                    eyre::bail!("invalid CSV row {}: non-finite value", idx + 2);
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

/// Write all rows to `path`, replacing the previous file only once the new
/// contents are on disk.
pub fn save_settings_csv(path: &Path, rows: &[SettingRow]) -> eyre::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(["key", "value"])
        .map_err(|e| eyre::eyre!("encode settings header: {}", e))?;
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("encode setting {}: {}", row.key, e))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| eyre::eyre!("flush settings CSV: {}", e))?;
    write_atomic(path, &bytes).map_err(|e| eyre::eyre!("write settings CSV {:?}: {}", path, e))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(tmp, path)
}
