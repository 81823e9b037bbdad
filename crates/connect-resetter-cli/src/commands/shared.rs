//! Arguments and output shared by the sink and source commands.

use anyhow::Result;
use clap::Args;
use kafka_connect_resetter_core::{KafkaConfig, ResetOutcome, SaslMechanism, SecurityProtocol};
use std::path::PathBuf;

/// Cluster connection arguments
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Kafka bootstrap servers (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub brokers: Vec<String>,

    /// YAML file with Kafka connection settings; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    #[arg(long)]
    pub security_protocol: Option<String>,

    /// SASL mechanism (PLAIN)
    #[arg(long)]
    pub sasl_mechanism: Option<String>,

    /// SASL username
    #[arg(long)]
    pub sasl_username: Option<String>,

    /// SASL password
    #[arg(long, env = "KAFKA_SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: Option<String>,

    /// CA certificate used to verify the brokers
    #[arg(long)]
    pub ssl_ca_location: Option<PathBuf>,

    /// Client certificate for mutual TLS
    #[arg(long)]
    pub ssl_certificate_location: Option<PathBuf>,

    /// Client private key for mutual TLS
    #[arg(long)]
    pub ssl_key_location: Option<PathBuf>,

    /// Request timeout in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
}

impl ConnectionArgs {
    /// Build the Kafka configuration for resetting `connector`.
    ///
    /// Starts from the `--config` file when given, then applies flags.
    pub fn kafka_config(&self, connector: &str) -> Result<KafkaConfig> {
        let mut config = match &self.config {
            Some(path) => KafkaConfig::from_file(path)?,
            None => KafkaConfig::new(Vec::new()),
        };

        if !self.brokers.is_empty() {
            config.bootstrap_servers = self.brokers.clone();
        }

        let security = &mut config.security;
        if let Some(protocol) = &self.security_protocol {
            security.security_protocol = protocol.parse::<SecurityProtocol>()?;
        }
        if let Some(mechanism) = &self.sasl_mechanism {
            security.sasl_mechanism = Some(mechanism.parse::<SaslMechanism>()?);
        }
        if self.sasl_username.is_some() {
            security.sasl_username = self.sasl_username.clone();
        }
        if self.sasl_password.is_some() {
            security.sasl_password = self.sasl_password.clone();
        }
        if self.ssl_ca_location.is_some() {
            security.ssl_ca_location = self.ssl_ca_location.clone();
        }
        if self.ssl_certificate_location.is_some() {
            security.ssl_certificate_location = self.ssl_certificate_location.clone();
        }
        if self.ssl_key_location.is_some() {
            security.ssl_key_location = self.ssl_key_location.clone();
        }

        // SASL without an explicit mechanism means PLAIN
        if matches!(
            security.security_protocol,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        ) && security.sasl_mechanism.is_none()
        {
            security.sasl_mechanism = Some(SaslMechanism::Plain);
        }

        if let Some(timeout) = self.request_timeout_ms {
            config.connection.request_timeout_ms = timeout;
        }
        if config.connection.client_id.is_none() {
            config.connection.client_id = Some(default_client_id(connector));
        }

        config.validate()?;
        Ok(config)
    }
}

/// Client id identifying this run in broker logs.
pub fn default_client_id(connector: &str) -> String {
    format!(
        "kafka-connect-resetter-{}-{}",
        connector,
        chrono::Utc::now().format("%Y%m%d%H%M%S%3f")
    )
}

/// Output format for the reset outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Print the outcome of a reset to stdout.
pub fn print_outcome(outcome: &ResetOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => print!("{}", render_text(outcome)),
    }
    Ok(())
}

fn render_text(outcome: &ResetOutcome) -> String {
    let mut out = String::new();
    match outcome {
        ResetOutcome::Sink(report) => {
            out.push_str(&format!(
                "✓ Reset sink connector {}\n  Consumer group: {}\n  Partitions reset: {}\n",
                report.connector, report.group_id, report.partitions_reset
            ));
            if report.group_deleted {
                out.push_str("  Consumer group deleted\n");
            }
            if !report.untouched.is_empty() {
                out.push_str("  Without committed offset:\n");
                for tp in &report.untouched {
                    out.push_str(&format!("    {}\n", tp));
                }
            }
        }
        ResetOutcome::Source(report) => {
            let verb = if report.dry_run {
                "Would reset"
            } else {
                "Reset"
            };
            out.push_str(&format!(
                "✓ {} source connector {}\n  Offsets topic: {} ({} partitions)\n  Records scanned: {}\n  Offsets reset: {}\n",
                verb,
                report.connector,
                report.offset_topic,
                report.partitions_scanned,
                report.records_scanned,
                report.tombstones
            ));
            if report.records_skipped > 0 {
                out.push_str(&format!(
                    "  Records with undecodable keys: {}\n",
                    report.records_skipped
                ));
            }
        }
    }
    out
}
