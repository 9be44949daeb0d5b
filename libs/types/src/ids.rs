//! Deterministic digest helpers.
//!
//! Every identity in the pipeline is a SHA-256 digest over a canonical
//! `|`-joined string so that producers, the dedup store, the archive and
//! downstream consumers derive the same id independently.

use sha2::{Digest, Sha256};

use crate::event::EventType;

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Correlation id: 64-hex digest over `symbol|event_type|ts_event`.
///
/// Used by the dedup store to suppress duplicate deliveries within the TTL
/// window.
pub fn correlation_id(symbol: &str, event_type: EventType, ts_event: i64) -> String {
    sha256_hex(format!("{symbol}|{event_type}|{ts_event}").as_bytes())
}

/// Signal id: first 16 hex of SHA-256 over `symbol|tf|ts_event_iso`.
pub fn signal_id(symbol: &str, tf: &str, ts_event_iso: &str) -> String {
    sha256_hex(format!("{symbol}|{tf}|{ts_event_iso}").as_bytes())[..16].to_string()
}

/// Broker partition key: the full 32-byte digest of `symbol|tf`, holding
/// partition affinity for all events of one stream. `None` timeframe maps
/// to the empty string.
pub fn partition_key_bytes(symbol: &str, tf: Option<&str>) -> [u8; 32] {
    let key = format!("{}|{}", symbol, tf.unwrap_or(""));
    Sha256::digest(key.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_stable() {
        let a = correlation_id("BTCUSDT", EventType::Ohlcv, 1_700_000_000_000);
        let b = correlation_id("BTCUSDT", EventType::Ohlcv, 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, sha256_hex(b"BTCUSDT|ohlcv|1700000000000"));
    }

    #[test]
    fn signal_id_is_16_hex() {
        let id = signal_id("BTCUSDT", "1h", "2024-01-01T00:00:00.000Z");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn partition_key_ignores_missing_tf_consistently() {
        assert_eq!(
            partition_key_bytes("ETHUSDT", None),
            partition_key_bytes("ETHUSDT", None)
        );
        assert_ne!(
            partition_key_bytes("ETHUSDT", None),
            partition_key_bytes("ETHUSDT", Some("1m"))
        );
    }
}
