use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::controller::{BatchSizeHeuristic, CollectionPlan};

pub const ENV_PREFIX: &str = "HARVEST";
const CONFIG_FILE: &str = "harvest";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime settings. Layered: defaults, then `harvest.toml`, then
/// `HARVEST_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub language: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub attempts_bound_multiplier: usize,
    pub overfetch_ratio: f64,
    pub min_margin: usize,
    pub max_batch: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://store.steampowered.com".to_string(),
            language: "english".to_string(),
            user_agent: concat!("review_harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            output_dir: PathBuf::from("data/exports"),
            ledger_path: PathBuf::from("data/harvest.sqlite"),
            attempts_bound_multiplier: 5,
            overfetch_ratio: 0.5,
            min_margin: 5,
            max_batch: 100,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(file: &Path) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.attempts_bound_multiplier == 0 {
            return Err(SettingsError::Invalid {
                key: "attempts_bound_multiplier",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_batch == 0 {
            return Err(SettingsError::Invalid {
                key: "max_batch",
                reason: "must be at least 1".into(),
            });
        }
        if !self.overfetch_ratio.is_finite() || self.overfetch_ratio < 0.0 {
            return Err(SettingsError::Invalid {
                key: "overfetch_ratio",
                reason: format!("must be a non-negative number (got {})", self.overfetch_ratio),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "request_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn batch_heuristic(&self) -> BatchSizeHeuristic {
        BatchSizeHeuristic {
            overfetch_ratio: self.overfetch_ratio,
            min_margin: self.min_margin,
            max_batch: self.max_batch,
        }
    }

    pub fn plan_for(&self, requested: usize) -> CollectionPlan {
        CollectionPlan {
            requested,
            attempts_bound_multiplier: self.attempts_bound_multiplier,
            batch: self.batch_heuristic(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        let plan = s.plan_for(10);
        assert_eq!(plan.attempts_bound(), 50);
        assert_eq!(plan.batch.max_batch, 100);
    }

    #[test]
    fn reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(
            &path,
            "max_batch = 25\nattempts_bound_multiplier = 3\noutput_dir = \"out\"\n",
        )
        .unwrap();

        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.max_batch, 25);
        assert_eq!(s.attempts_bound_multiplier, 3);
        assert_eq!(s.output_dir, PathBuf::from("out"));
        // untouched keys keep their defaults
        assert_eq!(s.min_margin, 5);
    }

    #[test]
    fn rejects_zero_multiplier() {
        let s = Settings {
            attempts_bound_multiplier: 0,
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::Invalid { key: "attempts_bound_multiplier", .. })
        ));
    }

    #[test]
    fn rejects_negative_overfetch() {
        let s = Settings {
            overfetch_ratio: -0.1,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}
