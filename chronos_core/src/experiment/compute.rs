//! Pure measurement formulas.
//!
//! Inputs are gate timestamps in µs and lengths in mm; mm/ms is m/s so no
//! unit conversion is needed for speeds. Each function either produces a
//! [`Measurement`] or says why not.
use crate::error::Rejected;
use crate::experiment::mode::ExperimentMode;
use crate::gate::BlockRange;
use crate::util::us_to_ms;

/// Standard gravity used for the incline theory value.
pub const G_STANDARD: f64 = 9.81;

/// One computed result, before it gets a run number.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub mode: ExperimentMode,
    /// Mode-specific distance column (slot count for the tachometer).
    pub d_mm: f64,
    pub time_ms: f64,
    pub speed_mps: f64,
    pub acc_mps2: f64,
    pub rpm: f64,
    pub v1_mps: f64,
    pub v2_mps: f64,
    /// Frictionless `g·sin(θ)`; incline only, never stored in history.
    pub theory_acc_mps2: Option<f64>,
    /// Human-readable inputs, intermediates and result.
    pub formula: String,
}

impl Measurement {
    fn new(mode: ExperimentMode) -> Self {
        Self {
            mode,
            d_mm: 0.0,
            time_ms: 0.0,
            speed_mps: 0.0,
            acc_mps2: 0.0,
            rpm: 0.0,
            v1_mps: 0.0,
            v2_mps: 0.0,
            theory_acc_mps2: None,
            formula: String::new(),
        }
    }
}

/// Linear motion: one trigger per gate, `speed = distance / (tB - tA)`.
pub fn linear_motion(
    distance_mm: f64,
    t_a: Option<u64>,
    t_b: Option<u64>,
) -> Result<Measurement, Rejected> {
    let (Some(t_a), Some(t_b)) = (t_a, t_b) else {
        return Err(Rejected::NotReady);
    };
    if t_b <= t_a {
        return Err(Rejected::InvalidOrdering("gate B triggered before gate A"));
    }
    let time_ms = us_to_ms(t_b - t_a);
    let speed = distance_mm / time_ms;

    let mut m = Measurement::new(ExperimentMode::LinearMotion);
    m.d_mm = distance_mm;
    m.time_ms = time_ms;
    m.speed_mps = speed;
    m.formula = format!(
        "Speed = Distance / Time\nDistance = {distance_mm:.0} mm\nTime = {} ms\nSpeed = {speed:.3} m/s",
        time_ms as i64
    );
    Ok(m)
}

/// Single-gate flag: `speed = flag / τ` over gate A's block range.
pub fn photogate(flag_mm: f64, a: Option<BlockRange>) -> Result<Measurement, Rejected> {
    let a = a.ok_or(Rejected::NotReady)?;
    let tau_ms = us_to_ms(a.duration_us());
    let speed = flag_mm / tau_ms;

    let mut m = Measurement::new(ExperimentMode::Photogate);
    m.d_mm = flag_mm;
    m.time_ms = tau_ms;
    m.speed_mps = speed;
    m.formula = format!(
        "Speed = Distance / Time\nFlag length = {flag_mm:.0} mm\nBlock time = {} ms\nSpeed = {speed:.3} m/s",
        tau_ms as i64
    );
    Ok(m)
}

/// Two-gate speeds and acceleration shared by UA and incline.
#[derive(Debug, Clone, Copy)]
struct TwoGate {
    tau_a_ms: f64,
    tau_b_ms: f64,
    dt_front_ms: f64,
    dt_mid_ms: f64,
    v1: f64,
    v2: f64,
    acc: f64,
}

fn two_gate(
    length_mm: f64,
    a: Option<BlockRange>,
    b: Option<BlockRange>,
) -> Result<TwoGate, Rejected> {
    let (Some(a), Some(b)) = (a, b) else {
        return Err(Rejected::NotReady);
    };
    if b.start_us <= a.start_us {
        return Err(Rejected::InvalidOrdering(
            "gate B front edge not after gate A front edge",
        ));
    }
    let tau_a_ms = us_to_ms(a.duration_us());
    let tau_b_ms = us_to_ms(b.duration_us());
    let dt_front_ms = us_to_ms(b.start_us - a.start_us);
    let dt_mid_ms = dt_front_ms + (tau_b_ms - tau_a_ms) / 2.0;
    if dt_mid_ms <= 0.0 {
        return Err(Rejected::InvalidOrdering("midpoint interval not positive"));
    }
    let v1 = length_mm / tau_a_ms;
    let v2 = length_mm / tau_b_ms;
    let acc = (v2 - v1) / (dt_mid_ms / 1000.0);
    Ok(TwoGate {
        tau_a_ms,
        tau_b_ms,
        dt_front_ms,
        dt_mid_ms,
        v1,
        v2,
        acc,
    })
}

fn two_gate_lines(t: &TwoGate) -> String {
    format!(
        "τA={:.3} ms, τB={:.3} ms, Δt_front={:.3} ms, Δt_mid={:.3} ms\n\
         v1 = L / τA = {:.3}\nv2 = L / τB = {:.3}\na = (v2 - v1) / Δt_mid = {:.3} m/s²",
        t.tau_a_ms, t.tau_b_ms, t.dt_front_ms, t.dt_mid_ms, t.v1, t.v2, t.acc
    )
}

/// Uniform acceleration from the block ranges of both gates.
///
/// Stored speed is the midpoint speed `(v1 + v2) / 2`.
pub fn uniform_accel(
    length_mm: f64,
    a: Option<BlockRange>,
    b: Option<BlockRange>,
) -> Result<Measurement, Rejected> {
    let t = two_gate(length_mm, a, b)?;
    let mid = 0.5 * (t.v1 + t.v2);

    let mut m = Measurement::new(ExperimentMode::UniformAccel);
    m.d_mm = length_mm;
    m.time_ms = t.dt_front_ms;
    m.speed_mps = mid;
    m.acc_mps2 = t.acc;
    m.v1_mps = t.v1;
    m.v2_mps = t.v2;
    m.formula = format!(
        "UA (two-gate): L={length_mm:.0} mm\n{}, v(mid)={mid:.3} m/s",
        two_gate_lines(&t)
    );
    Ok(m)
}

/// Free fall through gate A: `g = v² / (2·h_eff)` with `h_eff` to the object's midpoint.
pub fn free_fall(
    length_mm: f64,
    drop_mm: f64,
    a: Option<BlockRange>,
) -> Result<Measurement, Rejected> {
    let a = a.ok_or(Rejected::NotReady)?;
    let h_eff_m = (drop_mm - length_mm / 2.0) / 1000.0;
    if h_eff_m <= 0.0 {
        return Err(Rejected::InvalidGeometry(
            "drop height must exceed half the object length",
        ));
    }
    let tau_ms = us_to_ms(a.duration_us());
    let v = length_mm / tau_ms;
    let g = (v * v) / (2.0 * h_eff_m);

    let mut m = Measurement::new(ExperimentMode::FreeFall);
    m.d_mm = drop_mm;
    m.time_ms = tau_ms;
    m.speed_mps = v;
    m.acc_mps2 = g;
    m.formula = format!(
        "Free Fall: v = L / τ, g ≈ v² / (2 h_eff)\nL={length_mm:.0} mm, h={drop_mm:.0} mm, h_eff={:.1} mm\nτ={} ms\nv={v:.3} m/s, g={g:.3} m/s²",
        h_eff_m * 1000.0,
        tau_ms as i64
    );
    Ok(m)
}

/// Inclined plane: UA method, plus the frictionless theory value for comparison.
///
/// Stores gate distance as `d_mm` and v2 as the run's speed.
pub fn incline(
    length_mm: f64,
    distance_mm: f64,
    angle_deg: f64,
    a: Option<BlockRange>,
    b: Option<BlockRange>,
) -> Result<Measurement, Rejected> {
    let t = two_gate(length_mm, a, b)?;
    let theory = G_STANDARD * (angle_deg * std::f64::consts::PI / 180.0).sin();

    let mut m = Measurement::new(ExperimentMode::Incline);
    m.d_mm = distance_mm;
    m.time_ms = t.dt_front_ms;
    m.speed_mps = t.v2;
    m.acc_mps2 = t.acc;
    m.v1_mps = t.v1;
    m.v2_mps = t.v2;
    m.theory_acc_mps2 = Some(theory);
    m.formula = format!(
        "Inclined Plane: L={length_mm:.0} mm, D={distance_mm:.0} mm, angle={angle_deg:.0}°\n{}\nTheory: a ≈ g·sin(θ) = {theory:.3} m/s² (g=9.81)",
        two_gate_lines(&t)
    );
    Ok(m)
}

/// Tachometer: `rpm = 60000 / (period_ms · slots)`.
pub fn tachometer(slots: u16, period_us: u64) -> Result<Measurement, Rejected> {
    if period_us == 0 {
        return Err(Rejected::InvalidOrdering("zero tachometer period"));
    }
    let slots = slots.max(1);
    let period_ms = us_to_ms(period_us);
    let rpm = 60_000.0 / (period_ms * f64::from(slots));

    let mut m = Measurement::new(ExperimentMode::Tachometer);
    m.d_mm = f64::from(slots);
    m.time_ms = period_ms;
    m.rpm = rpm;
    m.formula = format!(
        "Tachometer: RPM = 60,000 / (Period_ms × Slots)\nSlots={slots}, Time={} ms\nRPM={rpm:.1}",
        period_ms as i64
    );
    Ok(m)
}
