//! Connector identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Consumer groups of sink connectors are named `connect-<connector>`.
const SINK_GROUP_PREFIX: &str = "connect-";

/// Which way a connector moves data, and so where its offsets live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// Offsets are committed by a consumer group
    Sink,
    /// Offsets are records in the shared offsets topic
    Source,
}

impl FromStr for ConnectorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sink" => Ok(ConnectorKind::Sink),
            "source" => Ok(ConnectorKind::Source),
            _ => Err(Error::UnsupportedConnectorKind(s.to_string())),
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorKind::Sink => write!(f, "sink"),
            ConnectorKind::Source => write!(f, "source"),
        }
    }
}

/// The connector whose offsets are reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorIdentity {
    name: String,
    kind: ConnectorKind,
}

impl ConnectorIdentity {
    pub fn new(name: impl Into<String>, kind: ConnectorKind) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Config("Connector name must not be empty".to_string()));
        }
        Ok(Self { name, kind })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    /// Consumer group backing this connector when it is a sink.
    pub fn consumer_group_id(&self) -> String {
        format!("{}{}", SINK_GROUP_PREFIX, self.name)
    }
}

impl fmt::Display for ConnectorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} connector {}", self.kind, self.name)
    }
}
