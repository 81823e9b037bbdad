//! Dispatcher tests: connector kind selects the reset strategy.

use std::str::FromStr;
use std::sync::Arc;

use kafka_connect_resetter_core::reset::{OffsetKey, OffsetKeyDecoder};
use kafka_connect_resetter_core::{
    ConnectorIdentity, ConnectorKind, DecodeError, Error, MemoryOffsetStore, ResetOptions,
    ResetOutcome, Resetter, SinkResetOptions, TopicPartition,
};

use super::helpers::{shared_offsets_store, sink, sink_group_store, source, source_options};

#[tokio::test]
async fn sink_connector_resets_consumer_group() {
    let store = sink_group_store("es-sink", "events", 2);
    let resetter = Resetter::new(store.clone());

    let outcome = resetter
        .reset(&sink("es-sink"), &ResetOptions::default())
        .await
        .unwrap();

    match &outcome {
        ResetOutcome::Sink(report) => {
            assert_eq!(report.group_id, "connect-es-sink");
            assert_eq!(report.partitions_reset, 2);
        }
        other => panic!("Expected sink outcome, got {:?}", other),
    }
    assert_eq!(outcome.affected(), 2);
}

#[tokio::test]
async fn source_connector_tombstones_offsets_topic() {
    let store = shared_offsets_store();
    let resetter = Resetter::new(store.clone());
    let options = ResetOptions {
        sink: SinkResetOptions::default(),
        source: Some(source_options()),
    };

    let outcome = resetter.reset(&source("a"), &options).await.unwrap();

    assert!(matches!(outcome, ResetOutcome::Source(_)));
    assert_eq!(outcome.affected(), 2);
}

#[tokio::test]
async fn source_connector_without_offsets_topic_is_config_error() {
    let resetter = Resetter::new(shared_offsets_store());

    let err = resetter
        .reset(&source("a"), &ResetOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn sink_options_do_not_affect_source_reset() {
    let store = shared_offsets_store();
    let options = ResetOptions {
        sink: SinkResetOptions {
            scope: Some(vec![TopicPartition::new("connect-offsets", 0)]),
            delete_consumer_group: true,
        },
        source: Some(source_options()),
    };

    let outcome = Resetter::new(store)
        .reset(&source("c"), &options)
        .await
        .unwrap();
    assert_eq!(outcome.affected(), 1);
}

#[test]
fn unknown_connector_kind_is_rejected() {
    let err = ConnectorKind::from_str("mirror").unwrap_err();
    assert!(matches!(err, Error::UnsupportedConnectorKind(_)));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn blank_connector_name_is_rejected() {
    assert!(ConnectorIdentity::new("  ", ConnectorKind::Sink).is_err());
}

/// Decoder treating the whole key as the connector name.
struct PlainKeyDecoder;

impl OffsetKeyDecoder for PlainKeyDecoder {
    fn decode(&self, key: &[u8]) -> Result<OffsetKey, DecodeError> {
        let connector =
            std::str::from_utf8(key).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Ok(OffsetKey {
            connector: connector.to_string(),
            partition: serde_json::Value::Null,
        })
    }
}

#[tokio::test]
async fn custom_key_decoder_is_used() {
    let store = Arc::new(MemoryOffsetStore::new());
    store.create_topic("offsets", 1);
    for key in ["mine", "other", "mine"] {
        store
            .append(
                "offsets",
                0,
                Some(bytes::Bytes::from(key)),
                Some(bytes::Bytes::from_static(b"{}")),
            )
            .unwrap();
    }

    let resetter = Resetter::with_key_decoder(store.clone(), Arc::new(PlainKeyDecoder));
    let options = ResetOptions {
        sink: SinkResetOptions::default(),
        source: Some(kafka_connect_resetter_core::SourceResetOptions::new("offsets")),
    };

    let outcome = resetter.reset(&source("mine"), &options).await.unwrap();
    assert_eq!(outcome.affected(), 1);
    assert!(!store
        .latest_values("offsets")
        .unwrap()
        .contains_key(&(0, bytes::Bytes::from("mine"))));
}
