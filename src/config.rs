use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::metrics::{
    DEFAULT_COLLABORATION_LIMIT, DEFAULT_PROJECT_LIMIT, DEFAULT_RECENT_LIMIT, DEFAULT_TREND_DAYS,
    MAX_TREND_DAYS,
};

/// Runtime settings layered from defaults, an optional TOML file and
/// `DASHBOARD_*` environment variables (highest precedence).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub trend_days: u32,
    pub collaboration_limit: usize,
    pub recent_limit: usize,
    pub project_limit: usize,
    pub max_connections: u32,
    pub snapshot_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Settings {
    /// Reads `path` when given (it must exist), otherwise `./dashboard.toml` if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("dashboard").required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("trend_days", i64::from(DEFAULT_TREND_DAYS))?
            .set_default("collaboration_limit", DEFAULT_COLLABORATION_LIMIT as i64)?
            .set_default("recent_limit", DEFAULT_RECENT_LIMIT as i64)?
            .set_default("project_limit", DEFAULT_PROJECT_LIMIT as i64)?
            .set_default("max_connections", 5_i64)?
            .set_default("log_level", "info")?
            .set_default("log_json", false)?
            .add_source(file)
            .add_source(Environment::with_prefix("DASHBOARD").try_parsing(true))
            .build()?
            .try_deserialize()?;

        if !(1..=MAX_TREND_DAYS).contains(&settings.trend_days) {
            return Err(ConfigError::Message(format!(
                "trend_days must be between 1 and {MAX_TREND_DAYS}, got {}",
                settings.trend_days
            )));
        }

        Ok(settings)
    }
}
