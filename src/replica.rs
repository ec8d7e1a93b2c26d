use crate::{
    client::is_not_found,
    error::RetryError,
    ids::ReplicaId,
    probe::{Probe, Prober},
    retry::{RetryCondition, RetryPolicy},
    status::{self, ReplicaStatus},
    table::describe_table,
    wait::{Absent, WaitSpec},
    Client,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    CreateReplicationGroupMemberAction, DeleteReplicationGroupMemberAction, ReplicaDescription,
    ReplicationGroupUpdate, UpdateReplicationGroupMemberAction,
};
use std::time::Duration;
use tracing::{debug, instrument};

const ALREADY_EXISTS: RetryCondition = RetryCondition::CodeMessage {
    code: "ValidationException",
    contains: "already exist",
};

const NO_ACTIONS: RetryCondition = RetryCondition::CodeMessage {
    code: "ValidationException",
    contains: "no actions specified",
};

/// Replica status as listed on the table description.
#[derive(Debug, Clone)]
pub struct ReplicaProber {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    region: String,
}

impl ReplicaProber {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        table_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            region: region.into(),
        }
    }
}

#[async_trait]
impl Prober for ReplicaProber {
    type Status = ReplicaStatus;
    type Snapshot = ReplicaDescription;

    async fn probe(&self) -> anyhow::Result<Probe<ReplicaStatus, ReplicaDescription>> {
        let replica = describe_table(&self.client, &self.table_name)
            .await?
            .and_then(|t| t.replicas)
            .unwrap_or_default()
            .into_iter()
            .find(|r| r.region_name() == Some(self.region.as_str()));

        match replica {
            Some(replica) => {
                let status = status::parse(replica.replica_status().map(|s| s.as_str()), "replica")?;
                Ok(Probe::found(status, replica))
            }
            None => Ok(Probe::Absent),
        }
    }
}

pub(crate) fn replica_active(spec: WaitSpec<ReplicaStatus>) -> WaitSpec<ReplicaStatus> {
    use ReplicaStatus::*;
    spec.pending([Creating, Updating, Deleting])
        .target([Active])
        .failure([
            CreationFailed,
            RegionDisabled,
            ReplicationNotAuthorized,
            InaccessibleEncryptionCredentials,
        ])
}

pub(crate) fn replica_deleted(spec: WaitSpec<ReplicaStatus>) -> WaitSpec<ReplicaStatus> {
    use ReplicaStatus::*;
    spec.pending([Creating, Updating, Deleting, Active])
        .absent(Absent::Target)
}

/// A delete that settled on "not found" rather than being cut short.
fn already_deleted(err: &RetryError<aws_sdk_dynamodb::Error>) -> bool {
    match err {
        RetryError::Fatal(last) | RetryError::Timeout { last, .. } => is_not_found(last),
        RetryError::Cancelled { .. } => false,
    }
}

/// Global table replicas.
impl Client {
    /// Waits for the replica of `table_name` in `region` to become active.
    #[instrument(skip_all, fields(table = table_name, region = region))]
    pub async fn wait_replica_active(
        &self,
        table_name: &str,
        region: &str,
        timeout: Duration,
    ) -> anyhow::Result<ReplicaDescription> {
        let prober = ReplicaProber::new(self.client.clone(), table_name, region);
        let spec = replica_active(self.wait_spec(timeout)).delay(self.timeouts.replica_delay);
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for replica ({region}) creation"))?
            .into_snapshot()
            .with_context(|| format!("replica ({region}) of table ({table_name}) not found"))
    }

    #[instrument(skip_all, fields(table = table_name, region = region))]
    pub async fn wait_replica_deleted(
        &self,
        table_name: &str,
        region: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let prober = ReplicaProber::new(self.client.clone(), table_name, region);
        let spec = replica_deleted(self.wait_spec(timeout)).delay(self.timeouts.replica_delay);
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for replica ({region}) deletion"))?;
        Ok(())
    }

    /// Adds a replica of `table_name` in `region` & waits for it to become
    /// active.
    ///
    /// An existing replica is updated to `kms_key_id` instead. When
    /// `point_in_time_recovery` is set it's applied in the replica region
    /// once the replica is active.
    #[instrument(skip_all, fields(table = table_name, region = region))]
    pub async fn create_replica(
        &self,
        table_name: &str,
        region: &str,
        kms_key_id: Option<String>,
        point_in_time_recovery: Option<bool>,
    ) -> anyhow::Result<ReplicaDescription> {
        let timeout = self.timeouts.replica_update.max(self.timeouts.create);
        let create = ReplicationGroupUpdate::builder()
            .create(
                CreateReplicationGroupMemberAction::builder()
                    .region_name(region)
                    .set_kms_master_key_id(kms_key_id.clone())
                    .build()?,
            )
            .build();

        let created = self
            .retry(RetryPolicy::REPLICA_MUTATION, timeout, || {
                self.client
                    .update_table()
                    .table_name(table_name)
                    .replica_updates(create.clone())
                    .send()
            })
            .await;

        match created {
            Ok(_) => {}
            Err(RetryError::Fatal(err)) if ALREADY_EXISTS.matches(&err) => {
                debug!("replica already exists, updating");
                self.update_replica(table_name, region, kms_key_id, timeout)
                    .await?;
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("creating replica ({region}) of table ({table_name})"))
            }
        }

        let replica = self.wait_replica_active(table_name, region, timeout).await?;

        if let Some(enabled) = point_in_time_recovery {
            self.update_point_in_time_recovery(table_name, enabled, Some(region))
                .await
                .with_context(|| format!("updating replica ({region}) point in time recovery"))?;
        }

        Ok(replica)
    }

    async fn update_replica(
        &self,
        table_name: &str,
        region: &str,
        kms_key_id: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let update = ReplicationGroupUpdate::builder()
            .update(
                UpdateReplicationGroupMemberAction::builder()
                    .region_name(region)
                    .set_kms_master_key_id(kms_key_id)
                    .build()?,
            )
            .build();

        let updated = self
            .retry(RetryPolicy::REPLICA_MUTATION, timeout, || {
                self.client
                    .update_table()
                    .table_name(table_name)
                    .replica_updates(update.clone())
                    .send()
            })
            .await;

        match updated {
            Ok(_) => Ok(()),
            Err(RetryError::Fatal(err)) if NO_ACTIONS.matches(&err) => {
                debug!("replica already up to date");
                Ok(())
            }
            Err(err) => Err(err)
                .with_context(|| format!("updating replica ({region}) of table ({table_name})")),
        }
    }

    /// Removes the replica of `table_name` in `region` & waits until it's gone.
    ///
    /// A replica still not found once retries are exhausted is considered
    /// deleted, the wait then confirms it's gone from the table.
    #[instrument(skip_all, fields(table = table_name, region = region))]
    pub async fn delete_replica(&self, table_name: &str, region: &str) -> anyhow::Result<()> {
        let delete = ReplicationGroupUpdate::builder()
            .delete(
                DeleteReplicationGroupMemberAction::builder()
                    .region_name(region)
                    .build()?,
            )
            .build();

        let deleted = self
            .retry(RetryPolicy::REPLICA_DELETE, self.timeouts.update_table, || {
                self.client
                    .update_table()
                    .table_name(table_name)
                    .replica_updates(delete.clone())
                    .send()
            })
            .await;

        match deleted {
            Ok(_) => {}
            Err(err) if already_deleted(&err) => debug!("replica already deleted"),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("deleting replica ({region}) of table ({table_name})"))
            }
        }

        let timeout = self.timeouts.replica_update.max(self.timeouts.delete);
        self.wait_replica_deleted(table_name, region, timeout).await
    }

    /// Removes several replicas of `table_name` concurrently.
    ///
    /// Every deletion runs to completion, failures are reported together.
    #[instrument(skip_all, fields(table = table_name, replicas = regions.len()))]
    pub async fn delete_replicas(&self, table_name: &str, regions: &[String]) -> anyhow::Result<()> {
        let results = futures::future::join_all(
            regions
                .iter()
                .map(|region| self.delete_replica(table_name, region)),
        )
        .await;

        let mut first = None;
        let mut failed = vec![];
        for (region, result) in regions.iter().zip(results) {
            if let Err(err) = result {
                failed.push(region.as_str());
                first.get_or_insert(err);
            }
        }

        match first {
            None => Ok(()),
            Some(err) => Err(err.context(format!(
                "deleting replicas ({}) of table ({table_name})",
                failed.join(", ")
            ))),
        }
    }

    /// A client issuing replica operations for `id` against the region its
    /// replica set is managed from.
    pub fn for_replica(&self, id: &ReplicaId) -> Client {
        Client {
            client: self.regional(&id.main_region),
            ..self.clone()
        }
    }
}
