//! # Tidemark Broker Abstraction
//!
//! The [`Publisher`] trait is the only broker surface the pipeline sees:
//! keyed, timestamped, at-least-once publishing with a dead-letter sibling
//! topic per primary topic. Concrete brokers (Kafka et al.) live behind this
//! contract; the crate ships [`MemoryBroker`], an in-process implementation
//! used by the binaries when no external broker is configured and by every
//! integration test.
//!
//! Key derivation is deterministic: stream messages are keyed by the 32-byte
//! SHA-256 of `symbol|tf` so one (symbol, tf) always lands on the same
//! partition; signals are keyed by their `signal_id`.

pub mod delivery;
pub mod memory;
pub mod publisher;

pub use delivery::{DeadLetter, DeliveryReport};
pub use memory::MemoryBroker;
pub use publisher::{BrokerError, Headers, KeyFields, Publisher, Record, DLT_SUFFIX};
