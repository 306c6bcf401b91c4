//! Engine configuration
//!
//! Read from TOML. Every field has a default so a missing or partial file is
//! fine; `validate` catches values that would make the engine misbehave.

use crate::alert::AlertPolicy;
use crate::error::EngineError;
use crate::reconcile::ReconciliationPolicy;
use crate::store::DEFAULT_LOG_KEY;
use crate::streak::{Adjacency, StreakCalculator, MAX_LOOKBACK_DAYS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable pointing at an alternate config file
pub const CONFIG_ENV_VAR: &str = "TRICHMIND_CONFIG";

/// Default score at or above which an elevated-risk alert fires
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub alerts: AlertConfig,
    pub streaks: StreakConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted log; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    pub log_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_key: DEFAULT_LOG_KEY.to_string(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("trichmind")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub summary_path: String,
    pub checkin_path: String,
    pub predict_path: String,
    pub alert_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 15,
            summary_path: "/api/relapse/overview".to_string(),
            checkin_path: "/api/relapse/checkin".to_string(),
            predict_path: "/predict_relapse_overview".to_string(),
            alert_path: "/api/alerts/high-risk".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Join the base URL and an endpoint path with exactly one slash
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub high_risk_threshold: f64,
    pub dispatch_timeout_secs: u64,
    pub supportive_title: String,
    pub supportive_message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            dispatch_timeout_secs: 10,
            supportive_title: "Be gentle with yourself today".to_string(),
            supportive_message: "Today might feel a little harder. A short pause, a fidget \
                                 or a coping strategy that worked before can help."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    pub adjacency: Adjacency,
    pub max_lookback_days: u32,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            adjacency: Adjacency::default(),
            max_lookback_days: MAX_LOOKBACK_DAYS,
        }
    }
}

impl EngineConfig {
    /// Config file location: `$TRICHMIND_CONFIG`, else the platform config dir
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|dir| dir.join("trichmind").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the default location, falling back to defaults on any problem
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let threshold = self.alerts.high_risk_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(EngineError::Config(format!(
                "alerts.high_risk_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.streaks.max_lookback_days == 0 {
            return Err(EngineError::Config(
                "streaks.max_lookback_days must be positive".to_string(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(EngineError::Config("api.base_url must not be empty".to_string()));
        }
        if self.storage.log_key.trim().is_empty() {
            return Err(EngineError::Config("storage.log_key must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn calculator(&self) -> StreakCalculator {
        StreakCalculator::new(self.streaks.adjacency, self.streaks.max_lookback_days)
    }

    pub fn reconciliation_policy(&self) -> ReconciliationPolicy {
        ReconciliationPolicy::new(self.calculator())
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy {
            high_risk_threshold: self.alerts.high_risk_threshold,
            dispatch_timeout: Duration::from_secs(self.alerts.dispatch_timeout_secs),
        }
    }
}
