//! `settings` subcommand: list, read and change persisted experiment settings.

use std::path::PathBuf;

use chronos_core::error::Result as CoreResult;
use chronos_core::experiment::settings::{SettingKey, SettingsStore};
use chronos_core::{CsvStore, ExperimentSettings};

use crate::cli::SettingsAction;

/// Resolved settings for printing, in persisted key order.
pub struct SettingsOutput {
    pub pairs: Vec<(&'static str, f64)>,
}

pub fn run_settings(path: Option<PathBuf>, action: &SettingsAction) -> CoreResult<SettingsOutput> {
    let Some(path) = path else {
        eyre::bail!("no settings file configured");
    };
    let store = CsvStore::new(&path);
    let mut settings = ExperimentSettings::default();
    settings.apply_pairs(store.load()?);

    let pairs = match action {
        SettingsAction::List => settings.to_pairs(),
        SettingsAction::Get { key } => {
            let key: SettingKey = key.parse()?;
            vec![(key.as_str(), settings.get_key(key))]
        }
        SettingsAction::Set { key, value } => {
            let key: SettingKey = key.parse()?;
            settings.set_key(key, *value)?;
            store.save(&settings.to_pairs())?;
            tracing::info!(key = key.as_str(), value, path = %path.display(), "setting saved");
            vec![(key.as_str(), settings.get_key(key))]
        }
    };
    Ok(SettingsOutput { pairs })
}
