use std::env;
use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

use crate::cli::{Cli, IngestArgs};
use crate::paths::database_file_path;
use crate::progress::{DEFAULT_NAMESPACE, TrackerConfig};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Settings {
    pub(crate) tracker: TrackerConfig,
    pub(crate) namespace: String,
    pub(crate) database_path: Option<PathBuf>,
    pub(crate) remote_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database_path: None,
            remote_url: None,
        }
    }
}

impl Settings {
    pub(crate) fn resolve(cli: &Cli) -> Self {
        let mut settings = Self::from_lookup(|key| env::var(key).ok());
        settings.apply_cli(cli);
        settings
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = value("PLAYMARK_DB") {
            settings.database_path = Some(PathBuf::from(path));
        }
        if let Some(namespace) = value("PLAYMARK_NAMESPACE") {
            settings.namespace = namespace.trim().to_string();
        }
        if let Some(url) = value("PLAYMARK_REMOTE_URL") {
            settings.remote_url = Some(url.trim().to_string());
        }
        if let Some(raw) = value("PLAYMARK_SAVE_INTERVAL") {
            match raw.trim().parse::<u64>() {
                Ok(interval) if interval > 0 => settings.tracker.save_interval_secs = interval,
                _ => warn!("ignoring invalid PLAYMARK_SAVE_INTERVAL `{raw}`"),
            }
        }
        if let Some(raw) = value("PLAYMARK_COMPLETION_THRESHOLD") {
            match parse_threshold(&raw) {
                Some(threshold) => settings.tracker.completion_threshold = threshold,
                None => warn!("ignoring invalid PLAYMARK_COMPLETION_THRESHOLD `{raw}`"),
            }
        }
        settings
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(path) = &cli.db {
            self.database_path = Some(path.clone());
        }
        if cli.quiet {
            self.tracker.enable_console_logging = false;
        }
    }

    pub(crate) fn apply_ingest(&mut self, args: &IngestArgs) {
        if let Some(interval) = args.save_interval {
            self.tracker.save_interval_secs = interval.max(1);
        }
        if let Some(threshold) = args.completion_threshold {
            match valid_threshold(threshold) {
                Some(threshold) => self.tracker.completion_threshold = threshold,
                None => warn!("ignoring out-of-range completion threshold {threshold}"),
            }
        }
        if let Some(url) = &args.remote_url {
            self.remote_url = Some(url.clone());
        }
        if args.no_local {
            self.tracker.enable_local_storage = false;
        }
    }

    pub(crate) fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => database_file_path(),
        }
    }
}

fn parse_threshold(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().and_then(valid_threshold)
}

fn valid_threshold(value: f64) -> Option<f64> {
    (value.is_finite() && (0.0..=100.0).contains(&value)).then_some(value)
}
