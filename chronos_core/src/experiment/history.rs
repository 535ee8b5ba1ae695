//! Bounded per-mode run history with run-to-run statistics.
use std::collections::VecDeque;

use crate::experiment::compute::Measurement;
use crate::experiment::mode::ExperimentMode;

/// One stored run. Derived data: everything but `run` and `timestamp` can be
/// recomputed from gate timestamps and settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub mode: ExperimentMode,
    pub run: u32,
    pub d_mm: f64,
    pub time_ms: f64,
    pub speed_mps: f64,
    pub acc_mps2: f64,
    pub rpm: f64,
    pub v1_mps: f64,
    pub v2_mps: f64,
    pub sigma_speed: f64,
    pub sigma_acc: f64,
    pub timestamp: String,
}

impl RunRecord {
    /// One display line, in the layout each mode's history list uses.
    pub fn display_line(&self) -> String {
        match self.mode {
            ExperimentMode::UniformAccel => format!(
                "{} Acceleration={:.3} m/s² Time={:.0} ms",
                self.run, self.acc_mps2, self.time_ms
            ),
            ExperimentMode::Incline => format!(
                "{} v1={:.3} m/s v2={:.3} m/s Time={:.0} ms Acceleration={:.3} m/s²",
                self.run, self.v1_mps, self.v2_mps, self.time_ms, self.acc_mps2
            ),
            ExperimentMode::FreeFall => format!(
                "{} v={:.3} m/s g={:.3} m/s² τ={:.0} ms",
                self.run, self.speed_mps, self.acc_mps2, self.time_ms
            ),
            ExperimentMode::Tachometer => format!("{} RPM={:.1}", self.run, self.rpm),
            ExperimentMode::LinearMotion | ExperimentMode::Photogate => format!(
                "{} Speed={:.3} m/s Time={:.0} ms",
                self.run, self.speed_mps, self.time_ms
            ),
        }
    }
}

/// Sample standard deviation, `sqrt(Σ(x - mean)² / (n - 1))`; 0 below two samples.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|x| (x - mean) * (x - mean)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Ring of runs for one mode. Run numbers keep counting across evictions and
/// restart only after `clear`.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    mode: ExperimentMode,
    records: VecDeque<RunRecord>,
    capacity: usize,
    last_run: u32,
}

impl HistoryRing {
    pub fn new(mode: ExperimentMode, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            mode,
            records: VecDeque::with_capacity(capacity),
            capacity,
            last_run: 0,
        }
    }

    /// Append a run and restamp sigma; returns the new run number.
    pub fn push(&mut self, m: &Measurement, timestamp: String) -> u32 {
        self.last_run = self.last_run.wrapping_add(1);
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(RunRecord {
            mode: self.mode,
            run: self.last_run,
            d_mm: m.d_mm,
            time_ms: m.time_ms,
            speed_mps: m.speed_mps,
            acc_mps2: m.acc_mps2,
            rpm: m.rpm,
            v1_mps: m.v1_mps,
            v2_mps: m.v2_mps,
            sigma_speed: 0.0,
            sigma_acc: 0.0,
            timestamp,
        });
        self.restamp_sigma();
        self.last_run
    }

    /// Recompute sigmas over the whole retained window and stamp every record.
    fn restamp_sigma(&mut self) {
        let (speed, acc) = self.mode.sigma_fields();
        let s_speed = if speed {
            let v: Vec<f64> = self.records.iter().map(|r| r.speed_mps).collect();
            sample_std_dev(&v)
        } else {
            0.0
        };
        let s_acc = if acc {
            let v: Vec<f64> = self.records.iter().map(|r| r.acc_mps2).collect();
            sample_std_dev(&v)
        } else {
            0.0
        };
        for r in &mut self.records {
            r.sigma_speed = s_speed;
            r.sigma_acc = s_acc;
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.last_run = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&RunRecord> {
        self.records.back()
    }

    /// Display lines for the newest `n` runs, oldest first.
    pub fn last_lines(&self, n: usize) -> Vec<String> {
        let skip = self.records.len().saturating_sub(n);
        self.records
            .iter()
            .skip(skip)
            .map(RunRecord::display_line)
            .collect()
    }
}

/// All six rings.
#[derive(Debug, Clone)]
pub struct History {
    rings: [HistoryRing; 6],
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: ExperimentMode::ALL.map(|m| HistoryRing::new(m, capacity)),
        }
    }

    pub fn ring(&self, mode: ExperimentMode) -> &HistoryRing {
        &self.rings[mode.index()]
    }

    pub fn ring_mut(&mut self, mode: ExperimentMode) -> &mut HistoryRing {
        &mut self.rings[mode.index()]
    }

    /// Every record, modes in export order.
    pub fn all_records(&self) -> impl Iterator<Item = &RunRecord> {
        self.rings.iter().flat_map(HistoryRing::records)
    }
}
