//! In-memory offset store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{
    GroupDescription, GroupMember, GroupState, OffsetStore, RecordChunk, TopicPartition,
    TopicRecord,
};
use crate::error::KafkaError;
use crate::{Error, Result};

/// Broker error code for a fetch outside the partition's offset range.
const OFFSET_OUT_OF_RANGE: i16 = 1;

/// In-memory offset store
///
/// Models consumer groups and partitioned logs. Offsets are assigned from 0
/// and never reused. [`MemoryOffsetStore::compact`] and
/// [`MemoryOffsetStore::delete_records_before`] remove records the way the
/// log cleaner and DeleteRecords do, leaving gaps and a raised log start.
/// [`MemoryOffsetStore::latest_values`] gives the compacted view without
/// touching the log.
#[derive(Default)]
pub struct MemoryOffsetStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    groups: HashMap<String, MemoryGroup>,
    topics: HashMap<String, Vec<PartitionLog>>,
}

/// One partition: retained records in offset order between the log start
/// and the log end.
#[derive(Debug, Clone, Default)]
struct PartitionLog {
    log_start: i64,
    log_end: i64,
    records: Vec<TopicRecord>,
}

impl PartitionLog {
    fn append(&mut self, key: Option<Bytes>, value: Option<Bytes>) -> i64 {
        let offset = self.log_end;
        self.records.push(TopicRecord {
            offset,
            timestamp: chrono::Utc::now().timestamp_millis(),
            key,
            value,
        });
        self.log_end += 1;
        offset
    }

    /// Keep the latest record of every key and drop keys whose latest record
    /// is a tombstone. Keyless records are left alone.
    fn compact(&mut self) -> usize {
        let mut latest: HashMap<Bytes, i64> = HashMap::new();
        for record in &self.records {
            if let Some(key) = &record.key {
                latest.insert(key.clone(), record.offset);
            }
        }

        let before = self.records.len();
        self.records.retain(|record| match &record.key {
            Some(key) => latest.get(key) == Some(&record.offset) && !record.is_tombstone(),
            None => true,
        });
        before - self.records.len()
    }
}

#[derive(Default)]
struct MemoryGroup {
    state: Option<GroupState>,
    members: Vec<GroupMember>,
    offsets: BTreeMap<TopicPartition, i64>,
}

impl MemoryGroup {
    fn describe(&self, group_id: &str) -> GroupDescription {
        let state = match &self.state {
            Some(state) => state.clone(),
            None if self.members.is_empty() => GroupState::Empty,
            None => GroupState::Stable,
        };
        GroupDescription {
            group_id: group_id.to_string(),
            state,
            protocol_type: "consumer".to_string(),
            members: self.members.clone(),
        }
    }

    fn is_active(&self, group_id: &str) -> bool {
        self.describe(group_id).is_active()
    }
}

impl MemoryState {
    fn log_mut(&mut self, topic: &str, partition: i32) -> Result<&mut PartitionLog> {
        self.topics
            .get_mut(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?
            .get_mut(partition_index(topic, partition)?)
            .ok_or_else(|| not_available(topic, partition))
    }

    fn log(&self, topic: &str, partition: i32) -> Result<&PartitionLog> {
        self.topics
            .get(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?
            .get(partition_index(topic, partition)?)
            .ok_or_else(|| not_available(topic, partition))
    }
}

fn partition_index(topic: &str, partition: i32) -> Result<usize> {
    usize::try_from(partition).map_err(|_| not_available(topic, partition))
}

fn not_available(topic: &str, partition: i32) -> Error {
    KafkaError::PartitionNotAvailable {
        topic: topic.to_string(),
        partition,
    }
    .into()
}

impl MemoryOffsetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not poison the store for the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a topic with `partitions` empty partitions. Existing topics are kept.
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        self.state()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![PartitionLog::default(); partitions]);
    }

    /// Append a record, returning its offset.
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        value: Option<Bytes>,
    ) -> Result<i64> {
        let mut state = self.state();
        Ok(state.log_mut(topic, partition)?.append(key, value))
    }

    /// Retained records of a partition, including tombstones.
    pub fn records(&self, topic: &str, partition: i32) -> Result<Vec<TopicRecord>> {
        Ok(self.state().log(topic, partition)?.records.clone())
    }

    /// Compact every partition of a topic as the log cleaner does once
    /// tombstones are past their retention: only the latest record of each
    /// key is kept and tombstoned keys disappear. Surviving records keep
    /// their offsets and the log end does not move. Returns the number of
    /// records removed.
    pub fn compact(&self, topic: &str) -> Result<usize> {
        let mut state = self.state();
        let partitions = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;
        Ok(partitions.iter_mut().map(PartitionLog::compact).sum())
    }

    /// Raise the log start of a partition to `offset`, dropping every record
    /// below it. Offsets past the log end are clamped to it.
    pub fn delete_records_before(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let mut state = self.state();
        let log = state.log_mut(topic, partition)?;
        let start = offset.clamp(log.log_start, log.log_end);
        log.records.retain(|r| r.offset >= start);
        log.log_start = start;
        Ok(())
    }

    /// Compacted view of a topic: the latest non-null value of every
    /// `(partition, key)`. Keys whose latest record is a tombstone are absent.
    pub fn latest_values(&self, topic: &str) -> Result<BTreeMap<(i32, Bytes), Bytes>> {
        let state = self.state();
        let partitions = state
            .topics
            .get(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;

        let mut latest = BTreeMap::new();
        for (partition, log) in partitions.iter().enumerate() {
            for record in &log.records {
                let Some(key) = &record.key else { continue };
                let entry = (partition as i32, key.clone());
                match &record.value {
                    Some(value) => {
                        latest.insert(entry, value.clone());
                    }
                    None => {
                        latest.remove(&entry);
                    }
                }
            }
        }
        Ok(latest)
    }

    /// Commit an offset for a group, creating the group if needed.
    pub fn commit_offset(&self, group_id: &str, partition: TopicPartition, offset: i64) {
        self.state()
            .groups
            .entry(group_id.to_string())
            .or_default()
            .offsets
            .insert(partition, offset);
    }

    /// Join a member to a group, creating the group if needed.
    pub fn add_member(&self, group_id: &str, member_id: &str) {
        self.state()
            .groups
            .entry(group_id.to_string())
            .or_default()
            .members
            .push(GroupMember {
                member_id: member_id.to_string(),
                client_id: format!("{}-client", member_id),
                client_host: "/127.0.0.1".to_string(),
            });
    }

    /// Force the reported state of a group, creating the group if needed.
    pub fn set_group_state(&self, group_id: &str, group_state: GroupState) {
        self.state()
            .groups
            .entry(group_id.to_string())
            .or_default()
            .state = Some(group_state);
    }

    /// Whether a group exists.
    pub fn has_group(&self, group_id: &str) -> bool {
        self.state().groups.contains_key(group_id)
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn describe_group(&self, group_id: &str) -> Result<GroupDescription> {
        Ok(match self.state().groups.get(group_id) {
            Some(group) => group.describe(group_id),
            None => GroupDescription {
                group_id: group_id.to_string(),
                state: GroupState::Dead,
                protocol_type: String::new(),
                members: Vec::new(),
            },
        })
    }

    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<(TopicPartition, i64)>> {
        Ok(self
            .state()
            .groups
            .get(group_id)
            .map(|g| g.offsets.iter().map(|(tp, o)| (tp.clone(), *o)).collect())
            .unwrap_or_default())
    }

    async fn delete_committed_offsets(
        &self,
        group_id: &str,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartition>> {
        let mut state = self.state();
        let Some(group) = state.groups.get_mut(group_id) else {
            return Ok(Vec::new());
        };

        if group.is_active(group_id) {
            let description = group.describe(group_id);
            return Err(Error::GroupActive {
                group_id: group_id.to_string(),
                state: description.state.to_string(),
                members: description.members.len(),
            });
        }

        Ok(partitions
            .iter()
            .filter(|tp| group.offsets.remove(*tp).is_some())
            .cloned()
            .collect())
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool> {
        let mut state = self.state();
        let Some(group) = state.groups.get(group_id) else {
            return Ok(false);
        };

        if group.is_active(group_id) {
            return Err(Error::GroupActive {
                group_id: group_id.to_string(),
                state: group.describe(group_id).state.to_string(),
                members: group.members.len(),
            });
        }

        state.groups.remove(group_id);
        Ok(true)
    }

    async fn partition_ids(&self, topic: &str) -> Result<Vec<i32>> {
        let state = self.state();
        let partitions = state
            .topics
            .get(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;
        Ok((0..partitions.len() as i32).collect())
    }

    async fn offset_bounds(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        let state = self.state();
        let log = state.log(topic, partition)?;
        Ok((log.log_start, log.log_end))
    }

    async fn read(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i32,
    ) -> Result<RecordChunk> {
        let state = self.state();
        let log = state.log(topic, partition)?;
        if offset < log.log_start || offset > log.log_end {
            return Err(KafkaError::BrokerError {
                code: OFFSET_OUT_OF_RANGE,
                message: format!(
                    "Offset {} out of range [{}, {}] for {}:{}",
                    offset, log.log_start, log.log_end, topic, partition
                ),
            }
            .into());
        }

        // Reads inside a gap continue at the next retained record
        let start = log.records.partition_point(|r| r.offset < offset);

        let mut records = Vec::new();
        let mut size = 0usize;
        for record in &log.records[start..] {
            let record_size = record.key.as_ref().map_or(0, Bytes::len)
                + record.value.as_ref().map_or(0, Bytes::len);
            // Like a broker, always return at least one record
            if !records.is_empty() && size + record_size > max_bytes.max(0) as usize {
                break;
            }
            size += record_size;
            records.push(record.clone());
        }

        let next_offset = records.last().map_or(offset, |r| r.offset + 1);
        Ok(RecordChunk {
            records,
            next_offset,
            high_watermark: log.log_end,
        })
    }

    async fn write_tombstones(
        &self,
        topic: &str,
        partition: i32,
        keys: Vec<Bytes>,
    ) -> Result<usize> {
        let mut state = self.state();
        let log = state.log_mut(topic, partition)?;
        let count = keys.len();
        for key in keys {
            log.append(Some(key), None);
        }
        Ok(count)
    }
}
