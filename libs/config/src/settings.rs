//! Settings model and YAML loader.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Configuration loading/validation errors. All are fatal at startup.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level settings for a Tidemark deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ingestion: IngestionConfig,
    pub storage: StorageConfig,
    pub features: FeaturesConfig,
    pub risk: RiskConfig,
    pub signals: SignalsConfig,
}

impl Settings {
    /// Parse and validate settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Cross-field validation; any violation is fatal.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.ingestion.validate()?;
        self.storage.validate()?;
        self.features.validate()?;
        self.risk.validate()?;
        self.signals.validate()?;
        Ok(())
    }
}

/// Ingestion pipeline options (spec §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub exchanges: Vec<String>,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub streams: Vec<String>,
    /// Primary events topic; the DLT is the `.DLT` sibling.
    pub topic: String,
    pub ws: WsConfig,
    pub retry_policy: RetryPolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            exchanges: vec!["binance".to_string()],
            symbols: vec!["BTCUSDT".to_string()],
            timeframes: vec!["1m".to_string()],
            streams: vec!["ohlcv".to_string()],
            topic: "events.v2".to_string(),
            ws: WsConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl IngestionConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.topic.is_empty() {
            return Err(SettingsError::Invalid("ingestion.topic is empty".into()));
        }
        if self.exchanges.is_empty() {
            return Err(SettingsError::Invalid(
                "ingestion.exchanges must name at least one venue".into(),
            ));
        }
        if self.symbols.is_empty() {
            return Err(SettingsError::Invalid(
                "ingestion.symbols must name at least one instrument".into(),
            ));
        }
        self.ws.validate()
    }
}

/// WebSocket session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub connect_timeout_sec: f64,
    pub ping_interval_sec: f64,
    pub pong_timeout_sec: f64,
    /// 0 means retry forever.
    pub max_retries: u32,
    pub subscribe_batch_size: usize,
    /// Bounded per-consumer channel; overflow drops oldest.
    pub max_queue: usize,
    pub backoff: BackoffConfig,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_sec: 10.0,
            ping_interval_sec: 20.0,
            pong_timeout_sec: 30.0,
            max_retries: 0,
            subscribe_batch_size: 20,
            max_queue: 10_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl WsConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.subscribe_batch_size == 0 {
            return Err(SettingsError::Invalid(
                "ws.subscribe_batch_size must be positive".into(),
            ));
        }
        if self.max_queue == 0 {
            return Err(SettingsError::Invalid("ws.max_queue must be positive".into()));
        }
        if self.backoff.initial_sec <= 0.0 || self.backoff.max_sec < self.backoff.initial_sec {
            return Err(SettingsError::Invalid(
                "ws.backoff requires 0 < initial_sec <= max_sec".into(),
            ));
        }
        Ok(())
    }
}

/// Exponential backoff shape for reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_sec: f64,
    pub max_sec: f64,
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_sec: 1.0,
            max_sec: 60.0,
            factor: 2.0,
        }
    }
}

/// Generic bounded-retry policy for one-shot operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_sec: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_sec: 1.0,
        }
    }
}

/// Partition granularity for the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Hourly,
}

/// Archive layout and retention options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dataset: String,
    pub granularity: Granularity,
    pub include_region: bool,
    pub retention: RetentionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dataset: "ohlcv".to_string(),
            granularity: Granularity::Daily,
            include_region: false,
            retention: RetentionConfig::default(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.dataset.is_empty() {
            return Err(SettingsError::Invalid("storage.dataset is empty".into()));
        }
        let tiers = &self.retention.tiers;
        if tiers.is_empty() {
            return Err(SettingsError::Invalid(
                "storage.retention.tiers must not be empty".into(),
            ));
        }
        let mut prev = -1i64;
        for tier in tiers {
            if (tier.age_days_min as i64) < prev {
                return Err(SettingsError::Invalid(
                    "storage.retention.tiers must be ordered by age_days_min".into(),
                ));
            }
            prev = tier.age_days_min as i64;
            if let Some(max) = tier.age_days_max {
                if max <= tier.age_days_min {
                    return Err(SettingsError::Invalid(format!(
                        "retention tier {:?} has age_days_max <= age_days_min",
                        tier.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Ordered retention tiers; the last tier usually deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub tiers: Vec<TierConfig>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierConfig::new("hot", 0, Some(7), "local"),
                TierConfig::new("warm", 7, Some(90), "object-store"),
                TierConfig::new("cold", 90, Some(730), "archive"),
                TierConfig::new("delete", 730, None, "delete"),
            ],
        }
    }
}

/// One retention tier: `[age_days_min, age_days_max)` maps to a target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierConfig {
    pub name: String,
    pub age_days_min: u32,
    pub age_days_max: Option<u32>,
    pub target: String,
}

impl TierConfig {
    pub fn new(name: &str, min: u32, max: Option<u32>, target: &str) -> Self {
        Self {
            name: name.to_string(),
            age_days_min: min,
            age_days_max: max,
            target: target.to_string(),
        }
    }
}

/// Feature computation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub indicators: Vec<IndicatorSpec>,
    pub qc: QcConfig,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            indicators: vec![
                IndicatorSpec::bare("atr"),
                IndicatorSpec::bare("adx"),
                IndicatorSpec::bare("vwap"),
            ],
            qc: QcConfig::default(),
        }
    }
}

impl FeaturesConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.qc.iqr_k <= 0.0 {
            return Err(SettingsError::Invalid("features.qc.iqr_k must be > 0".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for spec in &self.indicators {
            if !seen.insert(spec.name.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "duplicate indicator: {}",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// One configured indicator and its free-form parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndicatorSpec {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl IndicatorSpec {
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: serde_json::Value::Null,
        }
    }
}

/// Feature quality-control knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub iqr_k: f64,
    pub ffill_limit: usize,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            iqr_k: 1.5,
            ffill_limit: 1,
        }
    }
}

/// Risk gate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Max notional per asset as a fraction of equity.
    pub max_exposure_per_asset: f64,
    /// Intraday drawdown fraction at which all orders are denied.
    pub daily_max_drawdown: f64,
    pub enable_kill_switch: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_exposure_per_asset: 0.05,
            daily_max_drawdown: 0.05,
            enable_kill_switch: false,
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.max_exposure_per_asset) {
            return Err(SettingsError::Invalid(
                "risk.max_exposure_per_asset must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.daily_max_drawdown) {
            return Err(SettingsError::Invalid(
                "risk.daily_max_drawdown must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Signal emission options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub topic: String,
    pub sltp: SltpConfig,
    /// Directory for the JSONL fallback sink.
    pub producer_out_dir: String,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            topic: "signals.v2".to_string(),
            sltp: SltpConfig::default(),
            producer_out_dir: "./signals_out".to_string(),
        }
    }
}

impl SignalsConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.topic.is_empty() {
            return Err(SettingsError::Invalid("signals.topic is empty".into()));
        }
        if self.sltp.atr_multiple <= 0.0 || self.sltp.rr_ratio <= 0.0 {
            return Err(SettingsError::Invalid(
                "signals.sltp multiples must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// ATR-based stop-loss / take-profit policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SltpConfig {
    pub atr_multiple: f64,
    /// Reward:risk multiplier used for the take-profit distance.
    pub rr_ratio: f64,
}

impl Default for SltpConfig {
    fn default() -> Self {
        Self {
            atr_multiple: 1.5,
            rr_ratio: 2.0,
        }
    }
}
