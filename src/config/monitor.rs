// src/config/monitor.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const DEFAULT_MONITOR_CONFIG_PATH: &str = "config/monitor.toml";
pub const ENV_MONITOR_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";

/// Upper bounds applied on load. Larger values overflow timestamp arithmetic.
pub const MAX_LOOKBACK_HOURS: i64 = 24 * 365;
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    600
}
fn default_group_size() -> usize {
    3
}
fn default_group_delay_ms() -> u64 {
    1_000
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_lookback_hours() -> i64 {
    24
}
fn default_feed_base_url() -> String {
    "https://api.twitterapi.io".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_env_marker() -> String {
    "ENV".to_string()
}
fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_database_url() -> String {
    "sqlite://data/monitor.db?mode=rwc".to_string()
}
fn default_fanout_capacity() -> usize {
    256
}
fn default_sources_path() -> PathBuf {
    PathBuf::from(super::sources::DEFAULT_SOURCES_PATH)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
        }
    }
}

impl ScheduleConfig {
    /// Tick period, kept within `1..=MAX_INTERVAL_SECS` seconds.
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }
}

/// Concurrency and pacing knobs for one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_group_delay_ms")]
    pub group_delay_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Watermark seeded for a never-seen source.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            group_delay_ms: default_group_delay_ms(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

impl PipelineConfig {
    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Seed window for never-seen sources. Out-of-range values use the default.
    pub fn lookback(&self) -> chrono::Duration {
        let hours = match self.lookback_hours {
            h if h <= 0 => default_lookback_hours(),
            h => h.min(MAX_LOOKBACK_HOURS),
        };
        chrono::Duration::try_hours(hours).unwrap_or_else(|| chrono::Duration::hours(24))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,
    /// "ENV" means: read from TWITTER_API_KEY
    #[serde(default = "default_env_marker")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            api_key: default_env_marker(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// "gemini" | "mock" | "disabled" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from GEMINI_API_KEY
    #[serde(default = "default_env_marker")]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_env_marker(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    #[serde(default = "default_fanout_capacity")]
    pub capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            capacity: default_fanout_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default = "default_sources_path")]
    pub sources_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            pipeline: PipelineConfig::default(),
            feed: FeedConfig::default(),
            classifier: ClassifierConfig::default(),
            storage: StorageConfig::default(),
            fanout: FanoutConfig::default(),
            sources_path: default_sources_path(),
        }
    }
}

impl MonitorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Parse, apply env overrides, resolve "ENV" credentials and sanitize.
    pub fn from_toml_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: MonitorConfig = toml::from_str(data)?;
        cfg.apply_env_overrides();
        cfg.resolve_credentials()?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// $MONITOR_CONFIG_PATH, then config/monitor.toml, then built-in defaults.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_MONITOR_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MONITOR_CONFIG_PATH));
        if path.exists() {
            return Self::load_from_file(&path);
        }
        Self::from_toml_str("")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("MONITOR_ENABLED") {
            self.schedule.enabled = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(secs) = env::var("MONITOR_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.schedule.interval_secs = secs;
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.storage.database_url = url;
            }
        }
        if env::var("CLASSIFIER_TEST_MODE").ok().as_deref() == Some("mock") {
            self.classifier.provider = "mock".to_string();
        }
    }

    fn resolve_credentials(&mut self) -> anyhow::Result<()> {
        self.classifier.provider = self.classifier.provider.to_lowercase();

        if self.classifier.api_key.trim().eq_ignore_ascii_case("env") {
            self.classifier.api_key = match self.classifier.provider.as_str() {
                "gemini" => env::var("GEMINI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing GEMINI_API_KEY env var"))?,
                "mock" | "disabled" => String::new(),
                other => anyhow::bail!("Unsupported classifier provider in config: {other}"),
            };
        }

        if self.feed.api_key.trim().eq_ignore_ascii_case("env") {
            self.feed.api_key = match env::var("TWITTER_API_KEY") {
                Ok(k) => k,
                // Credentials only matter when passes actually run.
                Err(_) if !self.schedule.enabled => String::new(),
                Err(_) => anyhow::bail!("Missing TWITTER_API_KEY env var"),
            };
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        let defaults = PipelineConfig::default();
        if self.pipeline.group_size == 0 {
            self.pipeline.group_size = defaults.group_size;
        }
        if self.pipeline.batch_size == 0 {
            self.pipeline.batch_size = defaults.batch_size;
        }
        if self.pipeline.lookback_hours <= 0 {
            self.pipeline.lookback_hours = defaults.lookback_hours;
        }
        self.pipeline.lookback_hours = self.pipeline.lookback_hours.min(MAX_LOOKBACK_HOURS);
        if self.schedule.interval_secs == 0 {
            self.schedule.interval_secs = default_interval_secs();
        }
        self.schedule.interval_secs = self.schedule.interval_secs.min(MAX_INTERVAL_SECS);
        if self.fanout.capacity == 0 {
            self.fanout.capacity = default_fanout_capacity();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn mock_provider_with_disabled_schedule_needs_no_keys() {
        env::remove_var("MONITOR_ENABLED");
        env::remove_var("MONITOR_INTERVAL_SECS");
        env::remove_var("DATABASE_URL");
        env::remove_var("CLASSIFIER_TEST_MODE");
        env::remove_var("TWITTER_API_KEY");
        let cfg = MonitorConfig::from_toml_str(
            r#"
[schedule]
enabled = false

[pipeline]
group_size = 0
batch_size = 4

[classifier]
provider = "Mock"
"#,
        )
        .unwrap();
        assert!(!cfg.schedule.enabled);
        assert_eq!(cfg.schedule.interval_secs, 600);
        assert_eq!(cfg.pipeline.group_size, 3, "zero falls back to default");
        assert_eq!(cfg.pipeline.batch_size, 4);
        assert_eq!(cfg.pipeline.batch_delay(), Duration::from_millis(500));
        assert_eq!(cfg.classifier.provider, "mock");
        assert!(cfg.classifier.api_key.is_empty());
        assert!(cfg.feed.api_key.is_empty());
    }

    #[serial_test::serial]
    #[test]
    fn literal_keys_are_kept_and_env_overrides_apply() {
        env::set_var("MONITOR_INTERVAL_SECS", "120");
        env::remove_var("MONITOR_ENABLED");
        env::remove_var("CLASSIFIER_TEST_MODE");
        let cfg = MonitorConfig::from_toml_str(
            r#"
[feed]
api_key = "feed-key"

[classifier]
api_key = "llm-key"
"#,
        )
        .unwrap();
        env::remove_var("MONITOR_INTERVAL_SECS");
        assert_eq!(cfg.schedule.interval_secs, 120);
        assert_eq!(cfg.feed.api_key, "feed-key");
        assert_eq!(cfg.classifier.api_key, "llm-key");
        assert_eq!(cfg.classifier.provider, "gemini");
    }

    #[serial_test::serial]
    #[test]
    fn huge_lookback_and_interval_are_clamped() {
        env::remove_var("MONITOR_ENABLED");
        env::remove_var("MONITOR_INTERVAL_SECS");
        env::remove_var("CLASSIFIER_TEST_MODE");
        let cfg = MonitorConfig::from_toml_str(
            r#"
[schedule]
enabled = false
interval_secs = 9223372036854775807

[pipeline]
lookback_hours = 9223372036854775807

[classifier]
provider = "mock"
"#,
        )
        .unwrap();
        assert_eq!(cfg.pipeline.lookback_hours, MAX_LOOKBACK_HOURS);
        assert_eq!(cfg.schedule.interval_secs, MAX_INTERVAL_SECS);
        assert_eq!(cfg.pipeline.lookback(), chrono::Duration::hours(MAX_LOOKBACK_HOURS));
    }

    #[test]
    fn unsanitized_values_still_yield_usable_durations() {
        let pipeline = PipelineConfig {
            lookback_hours: i64::MAX,
            ..PipelineConfig::default()
        };
        assert_eq!(pipeline.lookback(), chrono::Duration::hours(MAX_LOOKBACK_HOURS));
        let pipeline = PipelineConfig {
            lookback_hours: -5,
            ..PipelineConfig::default()
        };
        assert_eq!(pipeline.lookback(), chrono::Duration::hours(24));

        let schedule = ScheduleConfig {
            enabled: true,
            interval_secs: u64::MAX,
        };
        assert_eq!(schedule.period(), Duration::from_secs(MAX_INTERVAL_SECS));
        let schedule = ScheduleConfig {
            enabled: true,
            interval_secs: 0,
        };
        assert_eq!(schedule.period(), Duration::from_secs(1));
    }
}
