use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for a single backoff sleep.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: Some(10_000),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn backoff_multiplier(&self) -> f64 {
        if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        }
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OrchestratorConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_min_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// Never below `min_delay`.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    6 * 60 * 60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub scraper: OrchestratorConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    "ratewatch/0.1".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "ratewatch", "ratewatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!(sources = config.sources.len(), "Successfully loaded config");
        Ok(config)
    }

    /// Source ids are used as metric keys, so they must be unique and non-empty.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                bail!("Source '{}' has an empty id", source.name);
            }
            if !seen.insert(source.id.as_str()) {
                bail!("Duplicate source id: {}", source.id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
sources:
  - id: "dbs"
    name: "DBS Bank"
    url: "https://example.com/dbs/rates"
  - id: "ocbc"
    name: "OCBC"
    url: "https://example.com/ocbc/rates"
scraper:
  min_delay_ms: 100
  max_delay_ms: 300
  request_timeout_secs: 10
  retry:
    max_attempts: 4
    base_delay_ms: 50
    backoff_multiplier: 1.5
    max_delay_ms: 400
schedule:
  interval_secs: 600
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].id, "dbs");
        assert_eq!(config.sources[1].name, "OCBC");
        assert_eq!(config.scraper.min_delay(), Duration::from_millis(100));
        assert_eq!(config.scraper.max_delay(), Duration::from_millis(300));
        assert_eq!(config.scraper.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.scraper.retry.max_attempts(), 4);
        assert_eq!(config.scraper.retry.backoff_multiplier(), 1.5);
        assert_eq!(
            config.scraper.retry.max_delay(),
            Some(Duration::from_millis(400))
        );
        assert!(!config.scraper.retry.jitter);
        assert_eq!(config.schedule.interval_secs, 600);
        assert_eq!(config.user_agent, "ratewatch/0.1");
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: AppConfig = serde_yaml::from_str("sources: []").unwrap();
        assert_eq!(config.scraper, OrchestratorConfig::default());
        assert_eq!(config.scraper.retry.max_attempts(), 3);
        assert_eq!(config.schedule.interval_secs, 6 * 60 * 60);
    }

    #[test]
    fn test_invalid_values_are_clamped() {
        let scraper = OrchestratorConfig {
            min_delay_ms: 500,
            max_delay_ms: 100,
            request_timeout_secs: 1,
            retry: RetryConfig {
                max_attempts: 0,
                base_delay_ms: 10,
                backoff_multiplier: 0.5,
                max_delay_ms: None,
                jitter: false,
            },
        };
        assert_eq!(scraper.max_delay(), Duration::from_millis(500));
        assert_eq!(scraper.retry.max_attempts(), 1);
        assert_eq!(scraper.retry.backoff_multiplier(), 1.0);
    }

    #[test]
    fn test_duplicate_source_ids_rejected() {
        let yaml_str = r#"
sources:
  - id: "dbs"
    name: "DBS Bank"
    url: "https://example.com/a"
  - id: "dbs"
    name: "DBS Again"
    url: "https://example.com/b"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate source id: dbs"));
    }

    #[test]
    fn test_load_from_path() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(
            file.path(),
            "sources:\n  - id: uob\n    name: UOB\n    url: http://localhost/uob\n",
        )?;
        let config = AppConfig::load_from_path(file.path())?;
        assert_eq!(config.sources[0].id, "uob");
        Ok(())
    }
}
