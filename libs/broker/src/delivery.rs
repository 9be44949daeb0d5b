//! Delivery accounting for a batch pushed through a [`Publisher`].
//!
//! The pipeline never fails a batch wholesale: items that the broker
//! rejects are quarantined on the DLT one by one and the rest keep
//! flowing. The report records both halves of that outcome — how many
//! messages reached the primary topic and which correlation ids were
//! dead-lettered, with the reason the DLT was given.
//!
//! [`Publisher`]: crate::publisher::Publisher

use crate::publisher::BrokerError;

/// One quarantined item: enough to find it again on the DLT.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub correlation_id: String,
    /// The `dlt_reason` header value the item was quarantined under.
    pub reason: &'static str,
    pub error: BrokerError,
}

/// Outcome of delivering one batch: published count plus the dead-letter
/// ledger.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    published: usize,
    dead_lettered: Vec<DeadLetter>,
}

impl DeliveryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&mut self) {
        self.published += 1;
    }

    pub fn record_dead_letter(
        &mut self,
        correlation_id: impl Into<String>,
        reason: &'static str,
        error: BrokerError,
    ) {
        self.dead_lettered.push(DeadLetter {
            correlation_id: correlation_id.into(),
            reason,
            error,
        });
    }

    /// Messages that reached the primary topic.
    pub fn published(&self) -> usize {
        self.published
    }

    /// Items quarantined on the DLT, in delivery order.
    pub fn dead_letters(&self) -> &[DeadLetter] {
        &self.dead_lettered
    }

    pub fn attempted(&self) -> usize {
        self.published + self.dead_lettered.len()
    }

    /// True when nothing was quarantined.
    pub fn is_clean(&self) -> bool {
        self.dead_lettered.is_empty()
    }

    /// True when the batch split between the primary topic and the DLT.
    pub fn is_split(&self) -> bool {
        self.published > 0 && !self.dead_lettered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_tracks_published_and_quarantined() {
        let mut report = DeliveryReport::new();
        report.record_published();
        report.record_dead_letter(
            "beefcafe",
            "produce_failed",
            BrokerError::PublishFailed {
                topic: "events.v2".into(),
                reason: "broker rejected".into(),
            },
        );
        report.record_published();

        assert_eq!(report.published(), 2);
        assert_eq!(report.attempted(), 3);
        assert!(!report.is_clean());
        assert!(report.is_split());
        assert_eq!(report.dead_letters()[0].correlation_id, "beefcafe");
        assert_eq!(report.dead_letters()[0].reason, "produce_failed");
    }

    #[test]
    fn empty_report_is_clean_but_not_split() {
        let report = DeliveryReport::new();
        assert!(report.is_clean());
        assert!(!report.is_split());
        assert_eq!(report.attempted(), 0);
    }
}
