use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_LOG_BASE_NAME: &str = "file_rename_log";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// IANA name of the zone every resolved date is normalized into.
    pub timezone: String,
    /// Lowercase file-name suffixes never offered for renaming.
    pub excluded_extensions: Vec<String>,
    pub ffprobe_path: PathBuf,
    /// Unset means the probe may run indefinitely.
    pub probe_timeout_secs: Option<u64>,
    pub log_base_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            excluded_extensions: vec![".txt".to_string()],
            ffprobe_path: PathBuf::from("ffprobe"),
            probe_timeout_secs: None,
            log_base_name: DEFAULT_LOG_BASE_NAME.to_string(),
        }
    }
}

impl AppConfig {
    pub fn target_zone(&self) -> Result<Tz> {
        parse_zone(&self.timezone)
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_secs.map(Duration::from_secs)
    }
}

pub fn parse_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|err| anyhow::anyhow!("unknown time zone `{name}`: {err}"))
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_path: PathBuf,
    pub log_dir: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "media-date-renamer", "media-date-renamer")
        .context("could not determine the OS configuration directory")?;
    Ok(AppPaths {
        config_path: proj.config_dir().join("config.toml"),
        log_dir: proj.data_local_dir().join("logs"),
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    if !paths.config_path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(&paths.config_path).with_context(|| {
        format!(
            "could not read config file: {}",
            paths.config_path.display()
        )
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<AppConfig> {
    let config = toml::from_str::<AppConfig>(raw).context("could not parse config file")?;
    config.target_zone()?;
    Ok(config)
}
