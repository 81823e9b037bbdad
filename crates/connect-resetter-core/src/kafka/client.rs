//! Kafka client for protocol-level communication.

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{ApiKey, RequestHeader, ResponseHeader};
use kafka_protocol::protocol::StrBytes;
use kafka_protocol::protocol::{Decodable, Encodable};
use socket2::{SockRef, TcpKeepalive};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::config::{KafkaConfig, SaslMechanism, SecurityProtocol};
use crate::error::KafkaError;
use crate::Result;

use super::consumer_groups::{
    self, CommittedOffset, Coordinator, GroupDescription, PartitionDeletion,
};
use super::metadata::ClusterMetadata;
use super::{FetchResponse, ProduceResponse, TopicRecord};

const DEFAULT_CLIENT_ID: &str = "kafka-connect-resetter";

/// Kafka client for protocol-level operations against a single broker.
pub struct KafkaClient {
    /// Configuration
    config: KafkaConfig,

    /// Connection to the current broker
    connection: Arc<Mutex<Option<BrokerConnection>>>,

    /// Correlation ID counter
    correlation_id: AtomicI32,
}

/// A stream that can be either plain TCP or TLS-wrapped
enum ConnectionStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ConnectionStream {
    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            ConnectionStream::Plain(s) => {
                s.read_exact(buf).await?;
                Ok(())
            }
            ConnectionStream::Tls(s) => {
                s.read_exact(buf).await?;
                Ok(())
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            ConnectionStream::Plain(s) => s.write_all(buf).await,
            ConnectionStream::Tls(s) => s.write_all(buf).await,
        }
    }
}

struct BrokerConnection {
    stream: ConnectionStream,
    address: String,
}

impl KafkaClient {
    /// Create a new Kafka client
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            config,
            connection: Arc::new(Mutex::new(None)),
            correlation_id: AtomicI32::new(1),
        }
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    /// Connect to the Kafka cluster
    pub async fn connect(&self) -> Result<()> {
        // Try each bootstrap server until one connects
        for server in &self.config.bootstrap_servers {
            match self.try_connect(server).await {
                Ok(stream) => {
                    let mut conn = self.connection.lock().await;
                    *conn = Some(BrokerConnection {
                        stream,
                        address: server.clone(),
                    });
                    drop(conn);

                    if matches!(
                        self.config.security.security_protocol,
                        SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
                    ) {
                        self.authenticate().await?;
                    }

                    debug!("Connected to Kafka broker: {}", server);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", server, e);
                    continue;
                }
            }
        }

        Err(KafkaError::NoBrokersAvailable.into())
    }

    /// Address of the broker this client is connected to.
    pub async fn connected_address(&self) -> Option<String> {
        let conn = self.connection.lock().await;
        conn.as_ref().map(|c| c.address.clone())
    }

    async fn try_connect(&self, server: &str) -> Result<ConnectionStream> {
        let connect_timeout = self.config.connection.request_timeout();
        let tcp_stream = tokio::time::timeout(connect_timeout, TcpStream::connect(server))
            .await
            .map_err(|_| KafkaError::ConnectionFailed {
                broker: server.to_string(),
                message: format!("connect timed out after {:?}", connect_timeout),
            })?
            .map_err(|e| KafkaError::ConnectionFailed {
                broker: server.to_string(),
                message: e.to_string(),
            })?;

        self.configure_socket(&tcp_stream, server)?;

        let use_tls = matches!(
            self.config.security.security_protocol,
            SecurityProtocol::Ssl | SecurityProtocol::SaslSsl
        );

        if use_tls {
            debug!("Establishing TLS connection to {}", server);

            let tls_config = super::tls::build_tls_config(&self.config.security)?;
            let connector = TlsConnector::from(Arc::new(tls_config));

            // Extract hostname from server address (host:port)
            let hostname = server.split(':').next().unwrap_or(server);

            let server_name = ServerName::try_from(hostname.to_string()).map_err(|e| {
                KafkaError::ConnectionFailed {
                    broker: server.to_string(),
                    message: format!("Invalid server name for TLS: {}", e),
                }
            })?;

            let tls_stream = connector
                .connect(server_name, tcp_stream)
                .await
                .map_err(|e| KafkaError::ConnectionFailed {
                    broker: server.to_string(),
                    message: format!("TLS handshake failed: {}", e),
                })?;

            debug!("TLS connection established to {}", server);
            Ok(ConnectionStream::Tls(Box::new(tls_stream)))
        } else {
            Ok(ConnectionStream::Plain(tcp_stream))
        }
    }

    /// Configure TCP socket options (keepalive, nodelay) based on connection config.
    fn configure_socket(&self, stream: &TcpStream, server: &str) -> Result<()> {
        let conn_config = &self.config.connection;
        let sock_ref = SockRef::from(stream);

        if conn_config.tcp_nodelay {
            sock_ref
                .set_nodelay(true)
                .map_err(|e| KafkaError::ConnectionFailed {
                    broker: server.to_string(),
                    message: format!("Failed to set TCP_NODELAY: {}", e),
                })?;
        }

        if conn_config.tcp_keepalive {
            let keepalive = TcpKeepalive::new()
                .with_time(Duration::from_secs(conn_config.keepalive_time_secs))
                .with_interval(Duration::from_secs(conn_config.keepalive_interval_secs));

            sock_ref
                .set_tcp_keepalive(&keepalive)
                .map_err(|e| KafkaError::ConnectionFailed {
                    broker: server.to_string(),
                    message: format!("Failed to set TCP keepalive: {}", e),
                })?;

            trace!(
                "TCP keepalive enabled for {}: time={}s, interval={}s",
                server,
                conn_config.keepalive_time_secs,
                conn_config.keepalive_interval_secs
            );
        }

        Ok(())
    }

    async fn authenticate(&self) -> Result<()> {
        let security = &self.config.security;

        match security.sasl_mechanism {
            Some(SaslMechanism::Plain) => {
                self.sasl_plain_auth(
                    security.sasl_username.as_deref().unwrap_or(""),
                    security.sasl_password.as_deref().unwrap_or(""),
                )
                .await
            }
            Some(SaslMechanism::ScramSha256) | Some(SaslMechanism::ScramSha512) => Err(
                crate::Error::Authentication("SCRAM authentication is not supported".to_string()),
            ),
            None => Ok(()),
        }
    }

    async fn sasl_plain_auth(&self, username: &str, password: &str) -> Result<()> {
        use kafka_protocol::messages::{
            SaslAuthenticateRequest, SaslAuthenticateResponse, SaslHandshakeRequest,
            SaslHandshakeResponse,
        };

        let handshake_request =
            SaslHandshakeRequest::default().with_mechanism(StrBytes::from_static_str("PLAIN"));
        let handshake_response: SaslHandshakeResponse = self
            .send_request(ApiKey::SaslHandshake, handshake_request)
            .await?;

        if handshake_response.error_code != 0 {
            return Err(crate::Error::Authentication(format!(
                "Broker rejected SASL PLAIN handshake (error code {}), enabled mechanisms: {:?}",
                handshake_response.error_code,
                handshake_response
                    .mechanisms
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
            )));
        }

        // PLAIN format: \0username\0password
        let mut auth_bytes = Vec::with_capacity(username.len() + password.len() + 2);
        auth_bytes.push(0);
        auth_bytes.extend_from_slice(username.as_bytes());
        auth_bytes.push(0);
        auth_bytes.extend_from_slice(password.as_bytes());

        let auth_request =
            SaslAuthenticateRequest::default().with_auth_bytes(Bytes::from(auth_bytes));
        let auth_response: SaslAuthenticateResponse = self
            .send_request(ApiKey::SaslAuthenticate, auth_request)
            .await?;

        if auth_response.error_code != 0 {
            return Err(crate::Error::Authentication(format!(
                "SASL authentication failed: {}",
                auth_response
                    .error_message
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("error code {}", auth_response.error_code))
            )));
        }

        debug!("SASL PLAIN authentication successful");
        Ok(())
    }

    fn next_correlation_id(&self) -> i32 {
        self.correlation_id.fetch_add(1, Ordering::SeqCst)
    }

    fn client_id(&self) -> StrBytes {
        match &self.config.connection.client_id {
            Some(id) => StrBytes::from_string(id.clone()),
            None => StrBytes::from_static_str(DEFAULT_CLIENT_ID),
        }
    }

    /// Send a request and receive a response
    pub async fn send_request<Req, Resp>(&self, api_key: ApiKey, request: Req) -> Result<Resp>
    where
        Req: Encodable + Default,
        Resp: Decodable + Default,
    {
        let correlation_id = self.next_correlation_id();
        let api_version = api_version(api_key);

        let header = RequestHeader::default()
            .with_request_api_key(api_key as i16)
            .with_request_api_version(api_version)
            .with_correlation_id(correlation_id)
            .with_client_id(Some(self.client_id()));

        let header_version = api_key.request_header_version(api_version);
        let mut buf = BytesMut::new();

        // Reserve space for the length prefix
        buf.put_i32(0);

        header
            .encode(&mut buf, header_version)
            .map_err(|e| KafkaError::Protocol(format!("Failed to encode header: {:?}", e)))?;
        request
            .encode(&mut buf, api_version)
            .map_err(|e| KafkaError::Protocol(format!("Failed to encode request: {:?}", e)))?;

        let len = (buf.len() - 4) as i32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());

        trace!(
            "Sending request: api_key={:?}, api_version={}, correlation_id={}, len={}",
            api_key,
            api_version,
            correlation_id,
            len
        );

        let mut guard = self.connection.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| KafkaError::Protocol("Not connected".to_string()))?;

        let timeout = self.config.connection.request_timeout();
        let exchanged = tokio::time::timeout(timeout, exchange(&mut conn.stream, &buf)).await;

        let response_buf = match exchanged {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                // The stream is no longer framed correctly
                *guard = None;
                return Err(e);
            }
            Err(_) => {
                *guard = None;
                return Err(KafkaError::Timeout(format!(
                    "{:?} request (correlation_id={}) exceeded {:?}",
                    api_key, correlation_id, timeout
                ))
                .into());
            }
        };
        drop(guard);

        let mut response_bytes = Bytes::from(response_buf);
        let response_header_version = api_key.response_header_version(api_version);
        let response_header = ResponseHeader::decode(&mut response_bytes, response_header_version)
            .map_err(|e| {
                KafkaError::Protocol(format!("Failed to decode response header: {:?}", e))
            })?;

        if response_header.correlation_id != correlation_id {
            return Err(KafkaError::Protocol(format!(
                "Correlation id mismatch: sent {}, received {}",
                correlation_id, response_header.correlation_id
            ))
            .into());
        }

        let response = Resp::decode(&mut response_bytes, api_version)
            .map_err(|e| KafkaError::Protocol(format!("Failed to decode response: {:?}", e)))?;

        Ok(response)
    }

    /// Fetch cluster metadata
    pub async fn fetch_metadata(&self, topics: Option<&[String]>) -> Result<ClusterMetadata> {
        super::metadata::fetch_metadata(self, topics).await
    }

    /// Fetch records from a topic/partition
    pub async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i32,
    ) -> Result<FetchResponse> {
        super::fetch::fetch(self, topic, partition, offset, max_bytes).await
    }

    /// Get the earliest and latest offsets for a partition
    pub async fn get_offsets(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        super::fetch::get_offsets(self, topic, partition).await
    }

    /// Produce records to a topic/partition
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<TopicRecord>,
    ) -> Result<ProduceResponse> {
        super::produce::produce(self, topic, partition, records).await
    }

    /// Locate the coordinator of a consumer group
    pub async fn find_coordinator(&self, group_id: &str) -> Result<Coordinator> {
        consumer_groups::find_coordinator(self, group_id).await
    }

    /// Describe a consumer group
    pub async fn describe_group(&self, group_id: &str) -> Result<GroupDescription> {
        consumer_groups::describe_group(self, group_id).await
    }

    /// Fetch committed offsets of a consumer group
    pub async fn fetch_offsets(
        &self,
        group_id: &str,
        topics: Option<&[String]>,
    ) -> Result<Vec<CommittedOffset>> {
        consumer_groups::fetch_offsets(self, group_id, topics).await
    }

    /// Delete committed offsets of a consumer group
    pub async fn delete_offsets(
        &self,
        group_id: &str,
        partitions: &[(String, i32)],
    ) -> Result<Vec<PartitionDeletion>> {
        consumer_groups::delete_offsets(self, group_id, partitions).await
    }

    /// Commit offsets for a group outside of any generation
    pub async fn commit_offsets(
        &self,
        group_id: &str,
        offsets: &[(String, i32, i64)],
    ) -> Result<Vec<(String, i32, i16)>> {
        consumer_groups::commit_offsets(self, group_id, offsets).await
    }

    /// Delete consumer groups, returning the per-group error codes
    pub async fn delete_groups(&self, group_ids: &[String]) -> Result<Vec<(String, i16)>> {
        consumer_groups::delete_groups(self, group_ids).await
    }
}

/// Write one framed request and read one framed response.
async fn exchange(stream: &mut ConnectionStream, request: &[u8]) -> Result<Vec<u8>> {
    stream
        .write_all(request)
        .await
        .map_err(|e| KafkaError::Protocol(format!("Failed to send request: {}", e)))?;

    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| KafkaError::Protocol(format!("Failed to read response length: {}", e)))?;
    let response_len = i32::from_be_bytes(len_buf);
    if response_len < 0 {
        return Err(
            KafkaError::Protocol(format!("Negative response length {}", response_len)).into(),
        );
    }

    trace!("Receiving response: len={}", response_len);

    let mut response_buf = vec![0u8; response_len as usize];
    stream
        .read_exact(&mut response_buf)
        .await
        .map_err(|e| KafkaError::Protocol(format!("Failed to read response body: {}", e)))?;

    Ok(response_buf)
}

/// API version used for a given API key.
///
/// Pinned to versions supported by every broker since Kafka 2.4, which
/// introduced OffsetDelete.
fn api_version(api_key: ApiKey) -> i16 {
    match api_key {
        ApiKey::Metadata => 9,
        ApiKey::Fetch => 11,
        ApiKey::Produce => 8,
        ApiKey::ListOffsets => 5,
        ApiKey::FindCoordinator => 2,
        ApiKey::DescribeGroups => 1,
        ApiKey::OffsetFetch => 5,
        ApiKey::OffsetCommit => 2,
        ApiKey::OffsetDelete => 0,
        ApiKey::DeleteGroups => 1,
        ApiKey::SaslHandshake => 1,
        ApiKey::SaslAuthenticate => 2,
        ApiKey::ApiVersions => 3,
        _ => 0,
    }
}
