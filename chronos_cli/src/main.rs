mod cli;
mod error_fmt;
mod settings;
mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chronos_core::{BusExecutor, ExpanderOp, GateId, RuntimeCfg};
use chronos_traits::{ExpanderBus, MonotonicClock, PinDirection};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::settings::run_settings;
use crate::simulate::{SimulateArgs, SimulationReport, run_simulation};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn load_config(path: Option<&Path>) -> Result<chronos_config::Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            chronos_config::load_toml(&text)
                .wrap_err_with(|| format!("parse config {}", p.display()))?
        }
        None => chronos_config::Config::default(),
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, logging: &chronos_config::Logging) -> Result<()> {
    let level = cli
        .log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .wrap_err_with(|| format!("invalid log level '{level}'"))
    };

    // Console logs go to stderr so stdout stays machine-readable.
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if cli.json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(filter()?)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter()?)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            "never" => tracing_appender::rolling::never(dir, name),
            other => eyre::bail!("logging.rotation must be never, daily or hourly, got {other}"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter()?)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cli, &cfg.logging)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let settings_path: Option<PathBuf> = cli
        .settings
        .clone()
        .or_else(|| cfg.settings.path.as_ref().map(PathBuf::from));

    match &cli.cmd {
        Commands::Simulate {
            mode,
            runs,
            pass_ms,
            gap_ms,
            export,
        } => {
            let args = SimulateArgs {
                mode: mode.parse()?,
                runs: *runs,
                pass: Duration::from_millis(*pass_ms),
                gap: Duration::from_millis(*gap_ms),
                export: export.clone(),
                settings: settings_path,
            };
            let report = run_simulation(&cfg, &args, &shutdown)?;
            print_report(&report, cli.json);
        }
        Commands::SelfCheck => {
            let levels = open_and_check(&cfg)?;
            print_self_check(&levels, cli.json);
        }
        Commands::Settings { action } => {
            let out = run_settings(settings_path, action)?;
            if cli.json {
                let obj: serde_json::Map<String, serde_json::Value> = out
                    .pairs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), serde_json::json!(v)))
                    .collect();
                println!("{}", serde_json::Value::Object(obj));
            } else {
                for (k, v) in &out.pairs {
                    println!("{k}={v}");
                }
            }
        }
    }
    Ok(())
}

fn print_report(report: &SimulationReport, json: bool) {
    let last = report.records.last();
    if json {
        for r in &report.records {
            println!(
                "{}",
                serde_json::json!({
                    "event": "run",
                    "mode": report.mode.tag(),
                    "run": r.run,
                    "d_mm": r.d_mm,
                    "time_ms": r.time_ms,
                    "speed_mps": r.speed_mps,
                    "acc_mps2": r.acc_mps2,
                    "rpm": r.rpm,
                    "v1_mps": r.v1_mps,
                    "v2_mps": r.v2_mps,
                    "sigma_speed": r.sigma_speed,
                    "sigma_acc": r.sigma_acc,
                    "timestamp": r.timestamp,
                })
            );
        }
        println!(
            "{}",
            serde_json::json!({
                "event": "complete",
                "mode": report.mode.tag(),
                "runs": report.records.len(),
                "ticks": report.ticks,
                "bus_errors": report.bus_errors,
                "exported_rows": report.exported_rows,
            })
        );
        return;
    }

    for r in &report.records {
        println!("{}", r.display_line());
    }
    if let Some(r) = last {
        println!(
            "{}: {} runs, sigma speed {:.4} m/s, sigma acc {:.4} m/s²",
            report.mode,
            report.records.len(),
            r.sigma_speed,
            r.sigma_acc
        );
    }
    if let Some(rows) = report.exported_rows {
        println!("exported {rows} rows");
    }
    println!("simulation complete");
}

/// Gate levels read during self-check; `true` is beam blocked.
struct GateLevels {
    raw: u32,
    a_blocked: bool,
    b_blocked: bool,
}

fn print_self_check(levels: &GateLevels, json: bool) {
    let word = |blocked: bool| if blocked { "blocked" } else { "open" };
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "ok",
                "levels": levels.raw,
                "gate_a": word(levels.a_blocked),
                "gate_b": word(levels.b_blocked),
            })
        );
    } else {
        println!("gate {}: {}", GateId::A, word(levels.a_blocked));
        println!("gate {}: {}", GateId::B, word(levels.b_blocked));
        println!("self-check ok");
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_and_check(cfg: &chronos_config::Config) -> Result<GateLevels> {
    let dev = chronos_hardware::Ch422g::open(
        cfg.bus.i2c_bus,
        Duration::from_millis(cfg.bus.ready_timeout_ms),
    )
    .wrap_err("open CH422G expander")?;
    self_check(dev, cfg)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_and_check(cfg: &chronos_config::Config) -> Result<GateLevels> {
    let sim = chronos_hardware::SimulatedExpander::new();
    // Test hook: fail the first N bus transactions
    if let Some(n) = std::env::var("CHRONOS_TEST_SIM_FAIL")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
    {
        sim.pins().fail_next(n);
    }
    self_check(sim, cfg)
}

fn self_check<B: ExpanderBus + Send + 'static>(
    bus: B,
    cfg: &chronos_config::Config,
) -> Result<GateLevels> {
    let rcfg = RuntimeCfg::from(cfg);
    let mask = rcfg.wiring.mask();
    let timeout = rcfg.executor.sync_timeout;
    let exec = BusExecutor::spawn(bus, rcfg.executor.clone(), MonotonicClock::new());
    let bus = exec.handle();

    bus.submit_sync(
        ExpanderOp::SetDirection {
            mask,
            dir: PinDirection::Input,
        },
        timeout,
    )?;
    let raw = bus.read_levels(mask, timeout)?;
    let blocked = |bit: u8| ((raw >> bit) & 1 == 1) != rcfg.wiring.active_low;
    let levels = GateLevels {
        raw,
        a_blocked: blocked(rcfg.wiring.gate_a_bit),
        b_blocked: blocked(rcfg.wiring.gate_b_bit),
    };
    tracing::info!(levels = raw, completed = bus.completed(), "self-check passed");
    Ok(levels)
}
