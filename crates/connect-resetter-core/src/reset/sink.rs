//! Sink connector reset: remove the committed offsets of `connect-<name>`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SinkResetOptions;
use crate::connector::ConnectorIdentity;
use crate::kafka::GroupState;
use crate::store::{OffsetStore, TopicPartition};
use crate::{Error, Result};

/// Outcome of a sink reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkResetReport {
    /// Connector name
    pub connector: String,
    /// Consumer group that was reset
    pub group_id: String,
    /// Partitions whose committed offset was removed
    pub partitions_reset: usize,
    /// Whether the whole group was deleted
    pub group_deleted: bool,
    /// Scoped partitions that had no committed offset
    pub untouched: Vec<TopicPartition>,
}

/// Deletes the committed offsets of a sink connector's consumer group.
pub struct SinkResetter {
    store: Arc<dyn OffsetStore>,
}

impl SinkResetter {
    pub fn new(store: Arc<dyn OffsetStore>) -> Self {
        Self { store }
    }

    /// Reset the connector's consumer group.
    ///
    /// Fails with [`Error::GroupActive`] while the group has members, and
    /// leaves its offsets alone in that case.
    pub async fn reset(
        &self,
        identity: &ConnectorIdentity,
        options: &SinkResetOptions,
    ) -> Result<SinkResetReport> {
        if options.delete_consumer_group && options.scope.is_some() {
            return Err(Error::Config(
                "A partition scope cannot be combined with deleting the consumer group"
                    .to_string(),
            ));
        }

        let group_id = identity.consumer_group_id();
        let mut report = SinkResetReport {
            connector: identity.name().to_string(),
            group_id: group_id.clone(),
            partitions_reset: 0,
            group_deleted: false,
            untouched: Vec::new(),
        };

        let group = self.store.describe_group(&group_id).await?;
        if group.is_active() {
            return Err(Error::GroupActive {
                group_id,
                state: group.state.to_string(),
                members: group.members.len(),
            });
        }

        if group.state == GroupState::Dead {
            info!("Consumer group {} does not exist, nothing to reset", group_id);
            report.untouched = options.scope.clone().unwrap_or_default();
            return Ok(report);
        }

        let committed: BTreeSet<TopicPartition> = self
            .store
            .committed_offsets(&group_id)
            .await?
            .into_iter()
            .map(|(tp, offset)| {
                debug!("Group {} has committed offset {} for {}", group_id, offset, tp);
                tp
            })
            .collect();

        if options.delete_consumer_group {
            report.group_deleted = self.store.delete_group(&group_id).await?;
            if report.group_deleted {
                report.partitions_reset = committed.len();
                info!(
                    "Deleted consumer group {} ({} committed partitions)",
                    group_id,
                    committed.len()
                );
            }
            return Ok(report);
        }

        let targets: Vec<TopicPartition> = match &options.scope {
            Some(scope) => {
                let mut targets = Vec::new();
                for tp in scope.iter().collect::<BTreeSet<_>>() {
                    if committed.contains(tp) {
                        targets.push(tp.clone());
                    } else {
                        info!("No committed offset for {} in group {}, leaving it", tp, group_id);
                        report.untouched.push(tp.clone());
                    }
                }
                targets
            }
            None => committed.into_iter().collect(),
        };

        if targets.is_empty() {
            info!("Consumer group {} has no offsets to reset", group_id);
            return Ok(report);
        }

        let deleted = self
            .store
            .delete_committed_offsets(&group_id, &targets)
            .await?;
        for tp in &deleted {
            info!("Reset offset of {} for group {}", tp, group_id);
        }

        report.partitions_reset = deleted.len();
        info!(
            "Reset {} partition(s) of consumer group {}",
            report.partitions_reset, group_id
        );
        Ok(report)
    }
}
