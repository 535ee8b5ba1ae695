//! Flat CSV table of every stored run.
use std::io::Write;

use eyre::WrapErr;

use crate::experiment::history::{History, RunRecord};

/// Column order of the history table.
pub const HISTORY_COLUMNS: [&str; 12] = [
    "mode",
    "run",
    "d_mm",
    "time_ms",
    "speed_mps",
    "acc_mps2",
    "rpm",
    "v1_mps",
    "v2_mps",
    "sigma_speed",
    "sigma_acc",
    "timestamp",
];

fn row(r: &RunRecord) -> [String; 12] {
    [
        r.mode.tag().to_string(),
        r.run.to_string(),
        format!("{:.1}", r.d_mm),
        format!("{:.3}", r.time_ms),
        format!("{:.6}", r.speed_mps),
        format!("{:.6}", r.acc_mps2),
        format!("{:.2}", r.rpm),
        format!("{:.6}", r.v1_mps),
        format!("{:.6}", r.v2_mps),
        format!("{:.6}", r.sigma_speed),
        format!("{:.6}", r.sigma_acc),
        r.timestamp.clone(),
    ]
}

/// Header plus every record, modes in fixed order, oldest run first.
pub fn write_csv<W: Write>(history: &History, out: W) -> eyre::Result<usize> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    w.write_record(HISTORY_COLUMNS)
        .wrap_err("write history header")?;
    let mut n = 0;
    for r in history.all_records() {
        w.write_record(row(r))
            .wrap_err_with(|| format!("write {} run {}", r.mode, r.run))?;
        n += 1;
    }
    w.flush().wrap_err("flush history CSV")?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::compute::{linear_motion, tachometer};
    use crate::experiment::mode::ExperimentMode;

    #[test]
    fn header_only_when_empty() {
        let mut buf = Vec::new();
        let n = write_csv(&History::new(50), &mut buf).unwrap();
        assert_eq!(n, 0);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "mode,run,d_mm,time_ms,speed_mps,acc_mps2,rpm,v1_mps,v2_mps,sigma_speed,sigma_acc,timestamp\n"
        );
    }

    #[test]
    fn rows_use_fixed_precision_and_mode_order() {
        let mut h = History::new(50);
        let tacho = tachometer(1, 1_000_000).unwrap();
        h.ring_mut(ExperimentMode::Tachometer)
            .push(&tacho, "00:00:02.000".into());
        let cv = linear_motion(500.0, Some(1_000), Some(6_000)).unwrap();
        h.ring_mut(ExperimentMode::LinearMotion)
            .push(&cv, "00:00:01.000".into());

        let mut buf = Vec::new();
        assert_eq!(write_csv(&h, &mut buf).unwrap(), 2);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[1],
            "CV,1,500.0,5.000,100.000000,0.000000,0.00,0.000000,0.000000,0.000000,0.000000,00:00:01.000"
        );
        assert!(lines[2].starts_with("Tachometer,1,1.0,1000.000,"));
        assert!(lines[2].contains(",60.00,"));
    }
}
