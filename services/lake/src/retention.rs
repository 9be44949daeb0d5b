//! Tiering, retention and compaction planning.

use config::TierConfig;
use serde::{Deserialize, Serialize};

use crate::partition::PartitionKey;

/// One retention tier: data aged `[age_days_min, age_days_max)` maps to a
/// target (storage class or `delete`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub age_days_min: u32,
    pub age_days_max: Option<u32>,
    pub target: String,
}

impl From<&TierConfig> for Tier {
    fn from(cfg: &TierConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            age_days_min: cfg.age_days_min,
            age_days_max: cfg.age_days_max,
            target: cfg.target.clone(),
        }
    }
}

/// Ordered tiers; lookup returns the tier whose window contains the age,
/// falling back to the last tier.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub tiers: Vec<Tier>,
}

impl RetentionPolicy {
    pub fn new(tiers: Vec<Tier>) -> Self {
        assert!(!tiers.is_empty(), "retention policy needs at least one tier");
        Self { tiers }
    }

    pub fn from_config(tiers: &[TierConfig]) -> Self {
        Self::new(tiers.iter().map(Tier::from).collect())
    }

    /// hot [0, 7d) -> warm [7, 90d) -> cold [90, 730d) -> delete [730d, ∞).
    pub fn default_tiers() -> Self {
        Self::new(vec![
            Tier {
                name: "hot".into(),
                age_days_min: 0,
                age_days_max: Some(7),
                target: "local".into(),
            },
            Tier {
                name: "warm".into(),
                age_days_min: 7,
                age_days_max: Some(90),
                target: "object-store".into(),
            },
            Tier {
                name: "cold".into(),
                age_days_min: 90,
                age_days_max: Some(730),
                target: "archive".into(),
            },
            Tier {
                name: "delete".into(),
                age_days_min: 730,
                age_days_max: None,
                target: "delete".into(),
            },
        ])
    }

    pub fn tier_for_age_days(&self, age_days: i64) -> &Tier {
        for tier in &self.tiers {
            let min_ok = age_days >= tier.age_days_min as i64;
            let max_ok = tier
                .age_days_max
                .map(|max| age_days < max as i64)
                .unwrap_or(true);
            if min_ok && max_ok {
                return tier;
            }
        }
        self.tiers.last().expect("non-empty tiers")
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::default_tiers()
    }
}

/// Planned action for one observed partition date.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionAction {
    /// Partition directory (up to and including the date component).
    pub path: String,
    pub date: String,
    pub age_days: i64,
    pub tier: Tier,
}

/// Compaction summary for one partition.
#[derive(Debug, Clone, Serialize)]
pub struct CompactionPlan {
    pub partition: PartitionKey,
    pub total_files: usize,
    pub total_bytes: u64,
    /// Files smaller than a quarter of the target file size.
    pub small_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_boundaries() {
        let policy = RetentionPolicy::default_tiers();
        assert_eq!(policy.tier_for_age_days(0).name, "hot");
        assert_eq!(policy.tier_for_age_days(6).name, "hot");
        assert_eq!(policy.tier_for_age_days(7).name, "warm");
        assert_eq!(policy.tier_for_age_days(89).name, "warm");
        assert_eq!(policy.tier_for_age_days(90).name, "cold");
        assert_eq!(policy.tier_for_age_days(729).name, "cold");
        assert_eq!(policy.tier_for_age_days(730).name, "delete");
        assert_eq!(policy.tier_for_age_days(10_000).name, "delete");
    }
}
