//! Kafka Connect Resetter Core Library
//!
//! This crate resets the stored offsets of Kafka Connect connectors so they
//! restart from scratch:
//!
//! - **Sink connectors**: committed offsets of the `connect-<name>` consumer
//!   group are deleted
//! - **Source connectors**: the connector's entries in the shared offsets
//!   topic are overwritten with tombstones, leaving other connectors intact

pub mod config;
pub mod connector;
pub mod error;
pub mod kafka;
pub mod reset;
pub mod store;

pub use config::{
    ConnectionConfig, KafkaConfig, ResetOptions, SaslMechanism, SecurityConfig, SecurityProtocol,
    SinkResetOptions, SourceResetOptions,
};
pub use connector::{ConnectorIdentity, ConnectorKind};
pub use error::{DecodeError, Error, KafkaError, Result};
pub use reset::{
    ResetOutcome, Resetter, SinkResetReport, SinkResetter, SourceResetReport, SourceResetter,
};
pub use store::{KafkaOffsetStore, MemoryOffsetStore, OffsetStore, RecordChunk, TopicPartition};
