//! # Tidemark Configuration
//!
//! Typed configuration for every Tidemark service, loaded from YAML with
//! serde defaults for all optional knobs. Configuration errors are fatal at
//! initialization: `Settings::load` validates cross-field invariants and
//! refuses to start a misconfigured pipeline.

pub mod settings;

pub use settings::{
    BackoffConfig, FeaturesConfig, Granularity, IndicatorSpec, IngestionConfig, QcConfig,
    RetentionConfig, RetryPolicy, RiskConfig, Settings, SettingsError, SignalsConfig, SltpConfig,
    StorageConfig, TierConfig, WsConfig,
};
