//! Kafka Produce API implementation.

use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;
use kafka_protocol::messages::{
    ApiKey, ProduceRequest, ProduceResponse as KafkaProduceResponse, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use kafka_protocol::records::{
    Compression, Record, RecordBatchEncoder, RecordEncodeOptions, TimestampType,
    NO_PARTITION_LEADER_EPOCH, NO_PRODUCER_EPOCH, NO_PRODUCER_ID, NO_SEQUENCE,
};
use tracing::trace;

use super::{KafkaClient, TopicRecord};
use crate::error::KafkaError;
use crate::Result;

/// Response from a produce operation
#[derive(Debug)]
pub struct ProduceResponse {
    /// Base offset assigned to the first record
    pub base_offset: i64,
    /// Number of records acknowledged
    pub record_count: usize,
}

/// Produce records to a topic/partition, waiting for all in-sync replicas.
pub async fn produce(
    client: &KafkaClient,
    topic: &str,
    partition: i32,
    records: Vec<TopicRecord>,
) -> Result<ProduceResponse> {
    if records.is_empty() {
        return Ok(ProduceResponse {
            base_offset: -1,
            record_count: 0,
        });
    }

    let record_count = records.len();
    let records_bytes = encode_batch(records)?;

    let partition_data = kafka_protocol::messages::produce_request::PartitionProduceData::default()
        .with_index(partition)
        .with_records(Some(records_bytes));

    let topic_data = kafka_protocol::messages::produce_request::TopicProduceData::default()
        .with_name(TopicName(StrBytes::from_string(topic.to_string())))
        .with_partition_data(vec![partition_data]);

    let timeout_ms =
        i32::try_from(client.config().connection.request_timeout_ms).unwrap_or(i32::MAX);

    let request = ProduceRequest::default()
        .with_acks(-1) // Wait for all replicas
        .with_timeout_ms(timeout_ms)
        .with_topic_data(vec![topic_data]);

    let response: KafkaProduceResponse = client.send_request(ApiKey::Produce, request).await?;

    for topic_response in &response.responses {
        if topic_response.name.as_str() != topic {
            continue;
        }

        for partition_response in &topic_response.partition_responses {
            if partition_response.index != partition {
                continue;
            }

            if partition_response.error_code != 0 {
                return Err(KafkaError::BrokerError {
                    code: partition_response.error_code,
                    message: format!(
                        "Produce error for {}:{}: code {}",
                        topic, partition, partition_response.error_code
                    ),
                }
                .into());
            }

            trace!(
                "Produced {} records to {}:{} at offset {}",
                record_count,
                topic,
                partition,
                partition_response.base_offset
            );

            return Ok(ProduceResponse {
                base_offset: partition_response.base_offset,
                record_count,
            });
        }
    }

    Err(KafkaError::Protocol("No partition response in produce response".to_string()).into())
}

/// Encode records into a single uncompressed v2 record batch.
fn encode_batch(records: Vec<TopicRecord>) -> Result<Bytes> {
    let kafka_records: Vec<Record> = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| Record {
            transactional: false,
            control: false,
            partition_leader_epoch: NO_PARTITION_LEADER_EPOCH,
            producer_id: NO_PRODUCER_ID,
            producer_epoch: NO_PRODUCER_EPOCH,
            timestamp_type: TimestampType::Creation,
            offset: i as i64, // Relative offset, assigned by the broker
            sequence: NO_SEQUENCE,
            timestamp: r.timestamp,
            key: r.key,
            value: r.value,
            headers: IndexMap::new(),
        })
        .collect();

    let options = RecordEncodeOptions {
        version: 2,
        compression: Compression::None,
    };

    let mut records_buf = BytesMut::new();
    RecordBatchEncoder::encode::<
        _,
        _,
        fn(&mut BytesMut, &mut BytesMut, Compression) -> anyhow::Result<()>,
    >(&mut records_buf, kafka_records.iter(), &options)
        .map_err(|e| KafkaError::Protocol(format!("Failed to encode records: {:?}", e)))?;

    Ok(records_buf.freeze())
}
