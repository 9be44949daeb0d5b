//! Partition keys and key derivation.

use config::{Granularity, StorageConfig};
use serde::{Deserialize, Serialize};
use types::{candle_open_ms, iter_candles, parse_timeframe, time::utc_date_hour};

use crate::error::Result;

/// How partitions are formed for a dataset.
#[derive(Debug, Clone)]
pub struct PartitionPolicy {
    pub dataset: String,
    pub granularity: Granularity,
    pub include_region: bool,
}

impl PartitionPolicy {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            granularity: Granularity::Daily,
            include_region: false,
        }
    }

    pub fn hourly(mut self) -> Self {
        self.granularity = Granularity::Hourly;
        self
    }

    pub fn with_region(mut self) -> Self {
        self.include_region = true;
        self
    }

    pub fn is_hourly(&self) -> bool {
        self.granularity == Granularity::Hourly
    }
}

impl From<&StorageConfig> for PartitionPolicy {
    fn from(cfg: &StorageConfig) -> Self {
        Self {
            dataset: cfg.dataset.clone(),
            granularity: cfg.granularity,
            include_region: cfg.include_region,
        }
    }
}

/// Identifies one storage bucket: `(symbol, tf, date[, hour][, region])`.
/// The date comes from the UTC candle open of the event timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub symbol: String,
    pub tf: String,
    /// UTC `YYYY-MM-DD`.
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl PartitionKey {
    /// Derive the key for an event under the given policy.
    pub fn derive(
        policy: &PartitionPolicy,
        symbol: &str,
        tf: &str,
        ts_event_ms: i64,
        region: Option<&str>,
    ) -> Result<Self> {
        let timeframe = parse_timeframe(tf)?;
        let open_ms = candle_open_ms(ts_event_ms, timeframe)?;
        let (date, hour) = utc_date_hour(open_ms)?;
        Ok(Self {
            symbol: symbol.to_string(),
            tf: timeframe.label(),
            date,
            hour: policy.is_hourly().then_some(hour),
            region: region
                .filter(|_| policy.include_region)
                .map(str::to_string),
        })
    }

    /// Hive-style path segments, e.g.
    /// `symbol=BTCUSDT/tf=1h/date=2024-01-01[/hour=12][/region=eu]`.
    pub fn hive_path(&self) -> String {
        let mut parts = vec![
            format!("symbol={}", self.symbol),
            format!("tf={}", self.tf),
            format!("date={}", self.date),
        ];
        if let Some(hour) = self.hour {
            parts.push(format!("hour={hour:02}"));
        }
        if let Some(region) = &self.region {
            parts.push(format!("region={region}"));
        }
        parts.join("/")
    }
}

/// Unique partition keys covering `[start_ms, end_ms)` for one stream,
/// in candle order.
pub fn partitions_for_timerange(
    policy: &PartitionPolicy,
    symbol: &str,
    tf: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<PartitionKey>> {
    let timeframe = parse_timeframe(tf)?;
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for (open_ms, _close_ms) in iter_candles(start_ms, end_ms, timeframe, false)? {
        let key = PartitionKey::derive(policy, symbol, tf, open_ms, None)?;
        if seen.insert((key.date.clone(), key.hour)) {
            out.push(key);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::from_iso_to_ms;

    #[test]
    fn daily_key_has_no_hour() {
        let policy = PartitionPolicy::new("ohlcv");
        let ts = from_iso_to_ms("2024-01-01T12:34:56Z").unwrap();
        let key = PartitionKey::derive(&policy, "BTCUSDT", "1h", ts, None).unwrap();
        assert_eq!(key.hive_path(), "symbol=BTCUSDT/tf=1h/date=2024-01-01");
    }

    #[test]
    fn hourly_policy_adds_the_candle_open_hour() {
        let policy = PartitionPolicy::new("ohlcv").hourly();
        let ts = from_iso_to_ms("2024-01-01T12:34:56Z").unwrap();
        let key = PartitionKey::derive(&policy, "BTCUSDT", "1h", ts, None).unwrap();
        assert_eq!(
            key.hive_path(),
            "symbol=BTCUSDT/tf=1h/date=2024-01-01/hour=12"
        );
    }

    #[test]
    fn region_only_applies_when_policy_enables_it() {
        let ts = from_iso_to_ms("2024-01-01T00:00:00Z").unwrap();
        let plain = PartitionPolicy::new("ohlcv");
        let keyed = PartitionPolicy::new("ohlcv").with_region();
        let without = PartitionKey::derive(&plain, "BTCUSDT", "1d", ts, Some("eu")).unwrap();
        assert!(without.region.is_none());
        let with = PartitionKey::derive(&keyed, "BTCUSDT", "1d", ts, Some("eu")).unwrap();
        assert_eq!(with.hive_path(), "symbol=BTCUSDT/tf=1d/date=2024-01-01/region=eu");
    }

    #[test]
    fn timerange_discovery_dedups_by_date() {
        let policy = PartitionPolicy::new("ohlcv");
        let start = from_iso_to_ms("2024-01-01T00:00:00Z").unwrap();
        let end = from_iso_to_ms("2024-01-03T00:00:00Z").unwrap();
        let keys = partitions_for_timerange(&policy, "BTCUSDT", "1h", start, end).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].date, "2024-01-01");
        assert_eq!(keys[1].date, "2024-01-02");
    }
}
