//! Human-readable error descriptions and structured JSON error formatting.

use chronos_core::error::{BusError, ChronosError, Rejected};

/// Find a typed bus error whether it was raised bare or wrapped in `ChronosError`.
fn bus_error(err: &eyre::Report) -> Option<&BusError> {
    err.downcast_ref::<BusError>().or_else(|| match err.downcast_ref::<ChronosError>() {
        Some(ChronosError::Bus(b)) => Some(b),
        _ => None,
    })
}

fn humanize_bus(be: &BusError) -> String {
    match be {
        BusError::Timeout => "What happened: The gate expander did not answer in time.\nLikely causes: I2C bus contention, a slow expander, or bus.sync_timeout_ms set too low.\nHow to fix: Check the expander wiring and raise bus.sync_timeout_ms in the config.".to_string(),
        BusError::QueueFull => "What happened: Too many bus requests were waiting.\nLikely causes: A stalled bus worker or a poll period shorter than the bus can serve.\nHow to fix: Raise bus.queue_len or poller.period_ms in the config.".to_string(),
        BusError::Device(msg) => format!(
            "What happened: The gate expander reported an error ({msg}).\nLikely causes: Loose I2C wiring, no power to the expander, or the wrong bus number.\nHow to fix: Verify SDA/SCL and 3V3/GND, and check bus.i2c_bus in the config."
        ),
        BusError::Reentrant | BusError::Disconnected => format!(
            "What happened: {be}.\nLikely causes: The bus worker stopped before the request was served.\nHow to fix: Re-run with --log-level=debug and report the log."
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = bus_error(err) {
        return humanize_bus(be);
    }

    if let Some(ce) = err.downcast_ref::<ChronosError>() {
        return match ce {
            ChronosError::ConfigurationInvalid { key, reason } => format!(
                "What happened: Setting '{key}' was rejected ({reason}).\nLikely causes: A typo in the key or a value outside its allowed range.\nHow to fix: Run `chronos settings list` to see valid keys and current values."
            ),
            ChronosError::UnknownMode(mode) => format!(
                "What happened: Unknown experiment mode '{mode}'.\nLikely causes: A typo in --mode.\nHow to fix: Use one of CV, Photogate, UA, FreeFall, Incline, Tachometer."
            ),
            ChronosError::InvalidTransition { from, to } => format!(
                "What happened: The experiment cannot go from {from} to {to}.\nLikely causes: A run was started without arming first.\nHow to fix: Arm the experiment, then start it."
            ),
            ChronosError::Bus(be) => humanize_bus(be),
            ChronosError::Io(msg) => format!(
                "What happened: File access failed ({msg}).\nLikely causes: Missing directory or no write permission.\nHow to fix: Check the path and its permissions."
            ),
        };
    }

    if let Some(rj) = err.downcast_ref::<Rejected>() {
        return format!(
            "What happened: No measurement was produced ({rj}).\nLikely causes: The gates were passed in the wrong order or a setting does not match the apparatus.\nHow to fix: Check the gate wiring order and the mode's settings, then run again."
        );
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid TOML.\nLikely causes: A typo or a value of the wrong type.\nHow to fix: Fix the file and rerun. Parser said: {}",
            te.message()
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    let root = err.root_cause().to_string();

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({root}).\nLikely causes: Zero periods or capacities, a gate bit >= 8, or both gates on the same bit.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Settings CSV header special-case
    if root.to_ascii_lowercase().contains("settings csv must have headers") {
        return "Invalid headers in settings CSV. Expected 'key,value'.".to_string();
    }

    if lower.contains("no settings file") {
        return "What happened: No settings file is configured.\nLikely causes: Neither --settings nor [settings].path was given.\nHow to fix: Pass --settings <FILE> or set [settings].path in the config.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the JSON `reason` field.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = bus_error(err) {
        return match be {
            BusError::Timeout => "BusTimeout",
            BusError::QueueFull => "BusQueueFull",
            BusError::Device(_) => "BusDevice",
            BusError::Reentrant => "BusReentrant",
            BusError::Disconnected => "BusDisconnected",
        };
    }
    match err.downcast_ref::<ChronosError>() {
        Some(ChronosError::ConfigurationInvalid { .. }) => "ConfigurationInvalid",
        Some(ChronosError::UnknownMode(_)) => "UnknownMode",
        Some(ChronosError::InvalidTransition { .. }) => "InvalidTransition",
        Some(ChronosError::Io(_)) => "Io",
        Some(ChronosError::Bus(_)) | None => {
            if err.downcast_ref::<Rejected>().is_some() {
                "Rejected"
            } else {
                "Error"
            }
        }
    }
}

/// Stable exit codes; clap's own usage errors exit with 2.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if bus_error(err).is_some() {
        return 3;
    }
    match err.downcast_ref::<ChronosError>() {
        Some(ChronosError::ConfigurationInvalid { .. }) => 4,
        Some(ChronosError::UnknownMode(_)) => 5,
        Some(ChronosError::InvalidTransition { .. }) => 6,
        _ if err.downcast_ref::<Rejected>().is_some() => 7,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    match err.downcast_ref::<ChronosError>() {
        Some(ChronosError::ConfigurationInvalid { key, reason }) => json!({
            "reason": reason_name(err),
            "details": { "key": key, "constraint": reason },
            "message": msg,
        })
        .to_string(),
        _ => json!({ "reason": reason_name(err), "message": msg }).to_string(),
    }
}
