//! Source reset tests.
//!
//! Tests for tombstoning a connector's entries in a shared offsets topic:
//! - Only the target connector's keys are removed
//! - Repeated and dry runs
//! - Undecodable keys
//! - Compacted logs with gaps and a raised log start
//! - Scan deadline, snapshot bound and produce failures

use bytes::Bytes;
use std::sync::Arc;

use kafka_connect_resetter_core::{
    Error, MemoryOffsetStore, OffsetStore, SourceResetOptions, SourceResetter,
};

use super::helpers::{
    commit_source_offset, offset_key, offset_value, shared_offsets_store, source, source_options,
    FaultyStore, OFFSET_TOPIC,
};

fn tombstoned_keys(store: &MemoryOffsetStore, partition: i32) -> Vec<Bytes> {
    store
        .records(OFFSET_TOPIC, partition)
        .unwrap()
        .into_iter()
        .filter(|r| r.is_tombstone())
        .filter_map(|r| r.key)
        .collect()
}

// ============================================================================
// Shared Offsets Topic
// ============================================================================

#[tokio::test]
async fn reset_tombstones_only_target_connector() {
    let store = shared_offsets_store();
    let before = store.latest_values(OFFSET_TOPIC).unwrap();
    let records_before: Vec<_> = (0..3)
        .map(|p| store.records(OFFSET_TOPIC, p).unwrap())
        .collect();

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &source_options())
        .await
        .expect("Reset should succeed");

    assert_eq!(report.tombstones, 3);
    assert_eq!(report.partitions_scanned, 3);
    assert_eq!(report.records_scanned, 9);
    assert_eq!(report.records_skipped, 0);
    assert!(!report.dry_run);

    // One tombstone per key, in the partition the key lives in
    assert_eq!(tombstoned_keys(&store, 0), vec![offset_key("b", "b-1")]);
    assert_eq!(tombstoned_keys(&store, 1), vec![offset_key("b", "b-2")]);
    assert_eq!(tombstoned_keys(&store, 2), vec![offset_key("b", "b-3")]);

    // Records that existed before are untouched
    for (partition, old) in records_before.iter().enumerate() {
        let now = store.records(OFFSET_TOPIC, partition as i32).unwrap();
        assert_eq!(&now[..old.len()], &old[..]);
        assert_eq!(now.len(), old.len() + 1);
    }

    // Compacted view only lost connector b
    let after = store.latest_values(OFFSET_TOPIC).unwrap();
    let expected: Vec<_> = before
        .into_iter()
        .filter(|((_, key), _)| !key.starts_with(b"[\"b\""))
        .collect();
    assert_eq!(after.into_iter().collect::<Vec<_>>(), expected);
    assert_eq!(
        store.latest_values(OFFSET_TOPIC).unwrap()[&(0, offset_key("a", "a-1"))],
        offset_value(11)
    );
}

#[tokio::test]
async fn reset_of_unknown_connector_writes_nothing() {
    let store = shared_offsets_store();

    let report = SourceResetter::new(store.clone())
        .reset(&source("z"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.tombstones, 0);
    assert_eq!(report.records_scanned, 9);
    for partition in 0..3 {
        assert!(tombstoned_keys(&store, partition).is_empty());
    }
}

#[tokio::test]
async fn connector_name_is_matched_exactly() {
    let store = shared_offsets_store();
    commit_source_offset(&store, 0, "b-extra", "x", 1);
    commit_source_offset(&store, 1, "B", "x", 1);

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.tombstones, 3);
    let latest = store.latest_values(OFFSET_TOPIC).unwrap();
    assert!(latest.contains_key(&(0, offset_key("b-extra", "x"))));
    assert!(latest.contains_key(&(1, offset_key("B", "x"))));
}

#[tokio::test]
async fn empty_offsets_topic_resets_nothing() {
    let store = Arc::new(MemoryOffsetStore::new());
    store.create_topic(OFFSET_TOPIC, 25);

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.tombstones, 0);
    assert_eq!(report.partitions_scanned, 25);
    assert_eq!(report.records_scanned, 0);
}

#[tokio::test]
async fn small_fetches_still_reach_the_bound() {
    let store = shared_offsets_store();
    let mut options = source_options();
    options.fetch_max_bytes = 1;

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &options)
        .await
        .unwrap();

    assert_eq!(report.records_scanned, 9);
    assert_eq!(report.tombstones, 3);
}

// ============================================================================
// Repeated and Dry Runs
// ============================================================================

#[tokio::test]
async fn second_reset_finds_nothing() {
    let store = shared_offsets_store();
    let resetter = SourceResetter::new(store.clone());

    let first = resetter
        .reset(&source("b"), &source_options())
        .await
        .unwrap();
    assert_eq!(first.tombstones, 3);

    let second = resetter
        .reset(&source("b"), &source_options())
        .await
        .unwrap();
    assert_eq!(second.tombstones, 0);
    assert_eq!(second.records_scanned, 12);

    for partition in 0..3 {
        assert_eq!(tombstoned_keys(&store, partition).len(), 1);
    }
}

#[tokio::test]
async fn offsets_committed_again_after_reset_are_found() {
    let store = shared_offsets_store();
    let resetter = SourceResetter::new(store.clone());

    resetter
        .reset(&source("b"), &source_options())
        .await
        .unwrap();
    commit_source_offset(&store, 1, "b", "b-2", 1);

    let report = resetter
        .reset(&source("b"), &source_options())
        .await
        .unwrap();
    assert_eq!(report.tombstones, 1);
    assert_eq!(
        tombstoned_keys(&store, 1),
        vec![offset_key("b", "b-2"), offset_key("b", "b-2")]
    );
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let store = shared_offsets_store();
    let records_before: Vec<_> = (0..3)
        .map(|p| store.records(OFFSET_TOPIC, p).unwrap())
        .collect();

    let mut options = source_options();
    options.dry_run = true;

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &options)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.tombstones, 3);
    for (partition, old) in records_before.iter().enumerate() {
        assert_eq!(&store.records(OFFSET_TOPIC, partition as i32).unwrap(), old);
    }
}

// ============================================================================
// Undecodable Keys
// ============================================================================

#[tokio::test]
async fn undecodable_keys_are_skipped_and_counted() {
    let store = shared_offsets_store();
    let junk = [
        Some(Bytes::from_static(b"not json")),
        Some(Bytes::from_static(b"{\"connector\":\"b\"}")),
        Some(Bytes::from_static(b"[]")),
        Some(Bytes::from_static(b"[42, {}]")),
        None,
    ];
    for key in junk {
        store
            .append(OFFSET_TOPIC, 0, key, Some(offset_value(1)))
            .unwrap();
    }

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.records_scanned, 14);
    assert_eq!(report.records_skipped, 5);
    assert_eq!(report.tombstones, 3);
}

#[tokio::test]
async fn enveloped_keys_are_matched() {
    let store = Arc::new(MemoryOffsetStore::new());
    store.create_topic(OFFSET_TOPIC, 1);
    let key = Bytes::from(
        serde_json::json!({
            "schema": { "type": "array", "optional": false },
            "payload": ["jdbc-source", { "table": "orders" }]
        })
        .to_string(),
    );
    store
        .append(OFFSET_TOPIC, 0, Some(key.clone()), Some(offset_value(3)))
        .unwrap();

    let report = SourceResetter::new(store.clone())
        .reset(&source("jdbc-source"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.tombstones, 1);
    assert_eq!(tombstoned_keys(&store, 0), vec![key]);
}

// ============================================================================
// Compacted Logs
// ============================================================================

#[tokio::test]
async fn scan_starts_at_raised_log_start() {
    let store = shared_offsets_store();
    // Leaves only a-1 at offset 3 in partition 0
    store.delete_records_before(OFFSET_TOPIC, 0, 3).unwrap();
    assert_eq!(store.offset_bounds(OFFSET_TOPIC, 0).await.unwrap(), (3, 4));

    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.records_scanned, 6);
    assert_eq!(report.tombstones, 2);
    assert!(tombstoned_keys(&store, 0).is_empty());
    assert_eq!(tombstoned_keys(&store, 1), vec![offset_key("b", "b-2")]);
    assert_eq!(tombstoned_keys(&store, 2), vec![offset_key("b", "b-3")]);
}

#[tokio::test]
async fn scan_crosses_gaps_left_by_compaction() {
    let store = shared_offsets_store();
    // Superseded commits go: offsets 0 and 1 of partition 0, offset 1 of partition 1
    assert_eq!(store.compact(OFFSET_TOPIC).unwrap(), 3);
    assert_eq!(store.offset_bounds(OFFSET_TOPIC, 1).await.unwrap(), (0, 3));

    let options = SourceResetOptions {
        fetch_max_bytes: 1,
        ..source_options()
    };
    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &options)
        .await
        .unwrap();

    assert_eq!(report.records_scanned, 6);
    assert_eq!(report.tombstones, 3);

    // Tombstones land at the log end, after the gaps
    let tombstone = store
        .records(OFFSET_TOPIC, 1)
        .unwrap()
        .into_iter()
        .find(|r| r.is_tombstone())
        .unwrap();
    assert_eq!(tombstone.offset, 3);
    assert_eq!(tombstone.key, Some(offset_key("b", "b-2")));
}

#[tokio::test]
async fn scan_finishes_when_the_tail_was_compacted_away() {
    let store = Arc::new(MemoryOffsetStore::new());
    store.create_topic(OFFSET_TOPIC, 1);
    commit_source_offset(&store, 0, "a", "x", 1);
    commit_source_offset(&store, 0, "b", "y", 1);
    commit_source_offset(&store, 0, "b", "z", 1);
    commit_source_offset(&store, 0, "c", "w", 1);
    store
        .write_tombstones(OFFSET_TOPIC, 0, vec![offset_key("c", "w")])
        .await
        .unwrap();

    // Offsets 3 and 4 disappear, the bound stays at 5
    store.compact(OFFSET_TOPIC).unwrap();
    assert_eq!(store.offset_bounds(OFFSET_TOPIC, 0).await.unwrap(), (0, 5));
    assert_eq!(store.records(OFFSET_TOPIC, 0).unwrap().len(), 3);

    let options = SourceResetOptions {
        scan_timeout_secs: 2,
        ..source_options()
    };
    let report = SourceResetter::new(store.clone())
        .reset(&source("b"), &options)
        .await
        .expect("Scan should reach the bound past the compacted tail");

    assert_eq!(report.records_scanned, 3);
    assert_eq!(report.tombstones, 2);
    assert_eq!(
        tombstoned_keys(&store, 0),
        vec![offset_key("b", "y"), offset_key("b", "z")]
    );
}

#[tokio::test]
async fn reset_after_compaction_of_previous_tombstones_finds_nothing() {
    let store = shared_offsets_store();
    let resetter = SourceResetter::new(store.clone());
    let options = SourceResetOptions {
        scan_timeout_secs: 2,
        ..source_options()
    };

    resetter.reset(&source("b"), &options).await.unwrap();
    store.compact(OFFSET_TOPIC).unwrap();

    // Every partition now ends in a gap where the tombstones were
    let report = resetter.reset(&source("b"), &options).await.unwrap();
    assert_eq!(report.tombstones, 0);
    assert_eq!(report.records_scanned, 3);
    for partition in 0..3 {
        assert!(tombstoned_keys(&store, partition).is_empty());
    }
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn stalled_partition_times_out_without_writing() {
    let inner = shared_offsets_store();
    let store = Arc::new(FaultyStore::new(inner.clone()).stall_reads(2));

    let options = SourceResetOptions {
        scan_timeout_secs: 1,
        ..source_options()
    };

    let err = SourceResetter::new(store.clone())
        .reset(&source("b"), &options)
        .await
        .unwrap_err();

    match &err {
        Error::ScanTimeout { topic, pending, .. } => {
            assert_eq!(topic, OFFSET_TOPIC);
            assert_eq!(*pending, 1);
        }
        other => panic!("Expected ScanTimeout, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 3);
    for partition in 0..3 {
        assert!(tombstoned_keys(&inner, partition).is_empty());
    }
}

#[tokio::test]
async fn produce_failure_is_reported() {
    let inner = shared_offsets_store();
    let store = Arc::new(FaultyStore::new(inner.clone()).fail_produce(1));

    let err = SourceResetter::new(store)
        .reset(&source("b"), &source_options())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Produce { partition: 1, .. }));
    assert_eq!(err.exit_code(), 4);
    assert!(tombstoned_keys(&inner, 1).is_empty());
}

#[tokio::test]
async fn missing_offsets_topic_fails() {
    let store = Arc::new(MemoryOffsetStore::new());

    let err = SourceResetter::new(store)
        .reset(&source("b"), &SourceResetOptions::new("no-such-topic"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TopicNotFound(ref t) if t == "no-such-topic"));
    assert_eq!(err.exit_code(), 7);
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let store = shared_offsets_store();
    let options = SourceResetOptions {
        scan_timeout_secs: 0,
        ..source_options()
    };

    let err = SourceResetter::new(store)
        .reset(&source("b"), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

// ============================================================================
// Snapshot Bound
// ============================================================================

#[tokio::test]
async fn records_after_snapshot_bound_are_ignored() {
    let inner = shared_offsets_store();
    let store = Arc::new(FaultyStore::new(inner.clone()).commit_late(0, "b", "late"));

    let report = SourceResetter::new(store)
        .reset(&source("b"), &source_options())
        .await
        .unwrap();

    assert_eq!(report.tombstones, 3);
    assert_eq!(report.records_scanned, 9);
    assert!(inner
        .latest_values(OFFSET_TOPIC)
        .unwrap()
        .contains_key(&(0, offset_key("b", "late"))));
}
