use chrono::Duration;
use serde::Deserialize;
use skintrack_core::PipelineSettings;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Upper bound on the scan interval, roughly a century.
pub const MAX_SCAN_INTERVAL_DAYS: i64 = 36_500;

/// Daemon configuration: defaults, then an optional TOML file named by
/// `SKINTRACK_CONFIG`, then `SKINTRACK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the ONNX models and the label file.
    pub model_dir: PathBuf,
    /// Directory watched for new photos.
    pub photo_dir: PathBuf,
    /// Reference face image of the tracked person.
    pub reference_path: PathBuf,
    /// Path to the SQLite history database.
    pub db_path: PathBuf,
    /// Embedding distance below which a face matches the reference.
    pub match_threshold: f32,
    /// Binary-model probability above which a face counts as clear skin.
    pub acne_threshold: f32,
    /// Minimum days between periodic scans.
    pub scan_interval_days: i64,
    /// Seconds between periodic scan checks.
    pub poll_secs: u64,
}

/// Optional overrides read from the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    photo_dir: Option<PathBuf>,
    reference_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    acne_threshold: Option<f32>,
    scan_interval_days: Option<i64>,
    poll_secs: Option<u64>,
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("SKINTRACK_CONFIG") {
            Ok(path) => Some(std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?),
            Err(_) => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build from TOML contents and an environment lookup.
    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::defaults(&env);

        if let Some(contents) = file {
            let file: FileConfig = toml::from_str(contents)?;
            config.apply_file(file);
        }

        config.apply_env(&env);
        config.scan_interval()?;
        Ok(config)
    }

    fn defaults(env: &impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("skintrack");
        let home = PathBuf::from(env("HOME").unwrap_or_else(|| "/tmp".to_string()));

        let settings = PipelineSettings::default();
        Self {
            model_dir: data_dir.join("models"),
            photo_dir: home.join("Pictures"),
            reference_path: data_dir.join("reference.jpg"),
            db_path: data_dir.join("history.db"),
            match_threshold: settings.match_threshold,
            acne_threshold: settings.acne_threshold,
            scan_interval_days: 20,
            poll_secs: 3600,
        }
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.photo_dir {
            self.photo_dir = v;
        }
        if let Some(v) = file.reference_path {
            self.reference_path = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.match_threshold {
            self.match_threshold = v;
        }
        if let Some(v) = file.acne_threshold {
            self.acne_threshold = v;
        }
        if let Some(v) = file.scan_interval_days {
            self.scan_interval_days = v;
        }
        if let Some(v) = file.poll_secs {
            self.poll_secs = v;
        }
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SKINTRACK_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env("SKINTRACK_PHOTO_DIR") {
            self.photo_dir = PathBuf::from(v);
        }
        if let Some(v) = env("SKINTRACK_REFERENCE") {
            self.reference_path = PathBuf::from(v);
        }
        if let Some(v) = env("SKINTRACK_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        self.match_threshold = parsed(env, "SKINTRACK_MATCH_THRESHOLD", self.match_threshold);
        self.acne_threshold = parsed(env, "SKINTRACK_ACNE_THRESHOLD", self.acne_threshold);
        self.scan_interval_days = parsed(env, "SKINTRACK_SCAN_INTERVAL_DAYS", self.scan_interval_days);
        self.poll_secs = parsed(env, "SKINTRACK_POLL_SECS", self.poll_secs);
    }

    /// Minimum time between periodic scans, `1..=MAX_SCAN_INTERVAL_DAYS` days.
    pub fn scan_interval(&self) -> Result<Duration, ConfigError> {
        let days = self.scan_interval_days;
        if !(1..=MAX_SCAN_INTERVAL_DAYS).contains(&days) {
            return Err(ConfigError::Invalid {
                key: "scan_interval_days",
                reason: format!("{days} is outside 1..={MAX_SCAN_INTERVAL_DAYS}"),
            });
        }
        Duration::try_days(days).ok_or_else(|| ConfigError::Invalid {
            key: "scan_interval_days",
            reason: format!("{days} days does not fit a duration"),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            match_threshold: self.match_threshold,
            acne_threshold: self.acne_threshold,
        }
    }
}

/// Parse an environment override, keeping `current` when unset or malformed.
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match env(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring malformed config value");
            current
        }),
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(None, env_of(&[("HOME", "/home/ana")])).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/home/ana/.local/share/skintrack/models"));
        assert_eq!(config.photo_dir, PathBuf::from("/home/ana/Pictures"));
        assert_eq!(config.match_threshold, 1.0);
        assert_eq!(config.acne_threshold, 0.45);
        assert_eq!(config.scan_interval_days, 20);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let toml = r#"
            photo_dir = "/srv/photos"
            match_threshold = 0.8
        "#;
        let config = Config::from_sources(Some(toml), env_of(&[])).unwrap();
        assert_eq!(config.photo_dir, PathBuf::from("/srv/photos"));
        assert_eq!(config.match_threshold, 0.8);
        assert_eq!(config.acne_threshold, 0.45);
    }

    #[test]
    fn test_env_overrides_file() {
        let toml = "match_threshold = 0.8\nscan_interval_days = 7\n";
        let env = env_of(&[
            ("SKINTRACK_MATCH_THRESHOLD", "0.6"),
            ("SKINTRACK_DB_PATH", "/var/lib/skintrack/h.db"),
        ]);
        let config = Config::from_sources(Some(toml), env).unwrap();
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.scan_interval_days, 7);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/skintrack/h.db"));
    }

    #[test]
    fn test_malformed_env_keeps_value() {
        let env = env_of(&[("SKINTRACK_ACNE_THRESHOLD", "high")]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(config.acne_threshold, 0.45);
    }

    #[test]
    fn test_scan_interval_out_of_range_rejected() {
        for days in ["1000000000", "0", "-3"] {
            let env = env_of(&[("SKINTRACK_SCAN_INTERVAL_DAYS", days)]);
            let result = Config::from_sources(None, env);
            assert!(
                matches!(result, Err(ConfigError::Invalid { key: "scan_interval_days", .. })),
                "{days} accepted"
            );
        }
        let result = Config::from_sources(Some("scan_interval_days = -1"), env_of(&[]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_scan_interval_duration() {
        let env = env_of(&[("SKINTRACK_SCAN_INTERVAL_DAYS", "36500")]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(config.scan_interval().unwrap(), Duration::days(MAX_SCAN_INTERVAL_DAYS));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let result = Config::from_sources(Some("thresold = 1.0"), env_of(&[]));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
