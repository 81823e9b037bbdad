//! Configuration structures for connector reset operations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::TopicPartition;

/// Kafka cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap servers
    #[serde(default)]
    pub bootstrap_servers: Vec<String>,

    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// TCP connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl KafkaConfig {
    /// Configuration for a plaintext cluster with default connection settings.
    pub fn new(bootstrap_servers: Vec<String>) -> Self {
        Self {
            bootstrap_servers,
            security: SecurityConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }

    /// Load a configuration file (YAML).
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: KafkaConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(crate::Error::Config(
                "At least one bootstrap server is required".to_string(),
            ));
        }

        if let Some(server) = self
            .bootstrap_servers
            .iter()
            .find(|s| s.trim().is_empty() || !s.contains(':'))
        {
            return Err(crate::Error::Config(format!(
                "Invalid bootstrap server '{}', expected host:port",
                server
            )));
        }

        let uses_sasl = matches!(
            self.security.security_protocol,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        );

        if uses_sasl {
            match self.security.sasl_mechanism {
                None => {
                    return Err(crate::Error::Config(
                        "sasl_mechanism is required for SASL security protocols".to_string(),
                    ));
                }
                Some(SaslMechanism::ScramSha256) | Some(SaslMechanism::ScramSha512) => {
                    return Err(crate::Error::Config(
                        "SCRAM SASL mechanisms are not supported, use PLAIN".to_string(),
                    ));
                }
                Some(SaslMechanism::Plain) => {}
            }
            if self.security.sasl_username.is_none() || self.security.sasl_password.is_none() {
                return Err(crate::Error::Config(
                    "sasl_username and sasl_password are required for SASL security protocols"
                        .to_string(),
                ));
            }
        }

        if self.connection.request_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Security configuration for Kafka connections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Security protocol
    #[serde(default)]
    pub security_protocol: SecurityProtocol,

    /// SASL mechanism (if using SASL)
    #[serde(default)]
    pub sasl_mechanism: Option<SaslMechanism>,

    /// SASL username
    #[serde(default)]
    pub sasl_username: Option<String>,

    /// SASL password
    #[serde(default)]
    pub sasl_password: Option<String>,

    /// Path to CA certificate file (for TLS)
    #[serde(default)]
    pub ssl_ca_location: Option<PathBuf>,

    /// Path to client certificate file (for mTLS)
    #[serde(default)]
    pub ssl_certificate_location: Option<PathBuf>,

    /// Path to client key file (for mTLS)
    #[serde(default)]
    pub ssl_key_location: Option<PathBuf>,
}

/// Security protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl std::str::FromStr for SecurityProtocol {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(SecurityProtocol::Plaintext),
            "SSL" => Ok(SecurityProtocol::Ssl),
            "SASL_PLAINTEXT" => Ok(SecurityProtocol::SaslPlaintext),
            "SASL_SSL" => Ok(SecurityProtocol::SaslSsl),
            other => Err(crate::Error::Config(format!(
                "Unknown security protocol: {}",
                other
            ))),
        }
    }
}

/// SASL mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl std::str::FromStr for SaslMechanism {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Ok(SaslMechanism::Plain),
            "SCRAM-SHA-256" => Ok(SaslMechanism::ScramSha256),
            "SCRAM-SHA-512" => Ok(SaslMechanism::ScramSha512),
            other => Err(crate::Error::Config(format!(
                "Unknown SASL mechanism: {}",
                other
            ))),
        }
    }
}

/// TCP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Enable TCP keepalive (default: true)
    #[serde(default = "default_true")]
    pub tcp_keepalive: bool,

    /// Idle time before the first keepalive probe, in seconds (default: 60)
    #[serde(default = "default_keepalive_time_secs")]
    pub keepalive_time_secs: u64,

    /// Interval between keepalive probes, in seconds (default: 20)
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Enable TCP_NODELAY (default: true)
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    /// Timeout for a single request/response round trip in milliseconds (default: 30000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Client id sent with every request
    #[serde(default)]
    pub client_id: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: true,
            keepalive_time_secs: default_keepalive_time_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            tcp_nodelay: true,
            request_timeout_ms: default_request_timeout_ms(),
            client_id: None,
        }
    }
}

impl ConnectionConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_keepalive_time_secs() -> u64 {
    60
}

fn default_keepalive_interval_secs() -> u64 {
    20
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Options for resetting a sink connector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkResetOptions {
    /// Restrict the reset to these partitions (default: every committed partition)
    #[serde(default)]
    pub scope: Option<Vec<TopicPartition>>,

    /// Delete the whole consumer group instead of its offsets
    #[serde(default)]
    pub delete_consumer_group: bool,
}

/// Options for resetting a source connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResetOptions {
    /// Topic where Kafka Connect stores source offsets (`offset.storage.topic`)
    pub offset_topic: String,

    /// Deadline for reading the offsets topic up to its snapshot bound, in seconds (default: 60)
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Maximum bytes per fetch request (default: 1MB)
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,

    /// Collect and report matching keys without producing tombstones
    #[serde(default)]
    pub dry_run: bool,
}

impl SourceResetOptions {
    /// Options for the given offsets topic with default settings.
    pub fn new(offset_topic: impl Into<String>) -> Self {
        Self {
            offset_topic: offset_topic.into(),
            scan_timeout_secs: default_scan_timeout_secs(),
            fetch_max_bytes: default_fetch_max_bytes(),
            dry_run: false,
        }
    }

    /// Scan deadline as a [`Duration`].
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Validate source options
    pub fn validate(&self) -> crate::Result<()> {
        if self.offset_topic.trim().is_empty() {
            return Err(crate::Error::Config(
                "offset_topic must not be empty".to_string(),
            ));
        }

        if self.scan_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "scan_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.fetch_max_bytes <= 0 {
            return Err(crate::Error::Config(
                "fetch_max_bytes must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_scan_timeout_secs() -> u64 {
    60
}

fn default_fetch_max_bytes() -> i32 {
    1024 * 1024 // 1MB
}

/// Options handed to the dispatcher; only the part matching the connector kind is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetOptions {
    /// Sink-path options
    #[serde(default)]
    pub sink: SinkResetOptions,

    /// Source-path options (required for source connectors)
    #[serde(default)]
    pub source: Option<SourceResetOptions>,
}
