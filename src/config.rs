use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::insight::cohort::MatchOptions;
use crate::insight::energy::EnergyOptions;
use crate::insight::intervention::InterventionOptions;
use crate::insight::traits::ExtractOptions;
use crate::service::InsightOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// IANA name, e.g. "Asia/Tokyo"
    pub timezone: String,

    /// Defaults to `<data_dir>/lifelens.db`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    /// Only the most recent N entries feed the profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trait_window_entries: Option<usize>,

    pub min_profile_entries: usize,
    pub match_top_k: usize,
    pub min_match_signal: u32,
    pub energy_window_days: i64,
    pub intervention_window_days: i64,
    pub min_intervention_entries: usize,

    /// Serialize pacing decide-and-write per user when importing answers
    pub strict_pacing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            timezone: "UTC".to_string(),
            database: None,
            trait_window_entries: None,
            min_profile_entries: 3,
            match_top_k: 5,
            min_match_signal: 5,
            energy_window_days: 14,
            intervention_window_days: 7,
            min_intervention_entries: 5,
            strict_pacing: false,
        }
    }
}

impl Config {
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lifelens")
    }

    /// Load `<data_dir>/config.json`, writing the defaults on first run
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(Self::default_dir);

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");
        if config_path.exists() {
            let mut config = Self::load_from(&config_path)?;
            config.data_dir = data_dir;
            return Ok(config);
        }

        let config = Config {
            data_dir,
            ..Config::default()
        };
        config.save()?;
        tracing::info!(path = %config_path.display(), "wrote default config");
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if config_str.trim().is_empty() {
            tracing::warn!(path = %path.display(), "config file is empty, using defaults");
            return Ok(Config::default());
        }

        let config: Config = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.tz()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.data_dir.join("config.json");
        let json_str = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, json_str).context("Failed to write config.json")?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown timezone {:?}: {}", self.timezone, e))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("lifelens.db"))
    }

    pub fn insight_options(&self) -> InsightOptions {
        InsightOptions {
            extract: ExtractOptions {
                window: self.trait_window_entries,
                min_entries: self.min_profile_entries,
            },
            matching: MatchOptions {
                top_k: self.match_top_k,
                min_signal: self.min_match_signal,
                ..MatchOptions::default()
            },
            energy: EnergyOptions {
                window_days: self.energy_window_days,
                ..EnergyOptions::default()
            },
            intervention: InterventionOptions {
                window_days: self.intervention_window_days,
                min_entries: self.min_intervention_entries,
            },
        }
    }
}
