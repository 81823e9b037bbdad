//! Error types for the Kafka Connect resetter.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the resetter library.
///
/// Every variant aborts the current reset. Per-record decode problems are
/// reported through [`DecodeError`] and never surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka protocol error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// The sink connector's consumer group still has live members
    #[error(
        "Consumer group {group_id} is {state} with {members} active member(s); stop the connector before resetting"
    )]
    GroupActive {
        group_id: String,
        state: String,
        members: usize,
    },

    /// The offsets topic scan did not reach its snapshot bound in time
    #[error(
        "Scan of offsets topic {topic} did not reach its snapshot bound within {timeout:?} ({pending} partition(s) pending)"
    )]
    ScanTimeout {
        topic: String,
        timeout: Duration,
        pending: usize,
    },

    /// A tombstone was not acknowledged by the broker
    #[error("Failed to produce tombstones to {topic}:{partition}: {message}")]
    Produce {
        topic: String,
        partition: i32,
        message: String,
    },

    /// Connector kind is neither sink nor source
    #[error("Unsupported connector kind: {0}")]
    UnsupportedConnectorKind(String),

    /// Topic not found
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl Error {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::GroupActive { .. } => 2,
            Error::ScanTimeout { .. } => 3,
            Error::Produce { .. } => 4,
            Error::UnsupportedConnectorKind(_) => 5,
            Error::Config(_) => 6,
            Error::TopicNotFound(_) => 7,
            _ => 1,
        }
    }

    /// Short label for the error class, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Kafka(_) => "kafka",
            Error::GroupActive { .. } => "group_active",
            Error::ScanTimeout { .. } => "scan_timeout",
            Error::Produce { .. } => "produce",
            Error::UnsupportedConnectorKind(_) => "unsupported_connector_kind",
            Error::TopicNotFound(_) => "topic_not_found",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Authentication(_) => "authentication",
        }
    }

    /// Broker error code carried by this error, if any.
    pub fn broker_code(&self) -> Option<i16> {
        match self {
            Error::Kafka(KafkaError::BrokerError { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Kafka-specific errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KafkaError {
    /// Connection failed
    #[error("Failed to connect to broker {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Broker error response
    #[error("Broker returned error code {code}: {message}")]
    BrokerError { code: i16, message: String },

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// No available brokers
    #[error("No available brokers")]
    NoBrokersAvailable,

    /// Partition not available
    #[error("Partition {partition} not available for topic {topic}")]
    PartitionNotAvailable { topic: String, partition: i32 },

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Certificate loading error
    #[error("Failed to load certificate from {path}: {message}")]
    CertificateLoad { path: String, message: String },

    /// Private key loading error
    #[error("Failed to load private key from {path}: {message}")]
    PrivateKeyLoad { path: String, message: String },
}

/// Failure to interpret a single offsets-topic record.
///
/// Recovered locally: the record is skipped and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Record has no key
    #[error("Record has no key")]
    MissingKey,

    /// Key is not valid JSON
    #[error("Invalid JSON key: {0}")]
    InvalidJson(String),

    /// Key JSON does not have the expected shape
    #[error("{0}")]
    UnexpectedShape(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
