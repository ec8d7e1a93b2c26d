use crate::{
    client::is_not_found,
    error::RetryError,
    probe::{Probe, Prober},
    retry::RetryPolicy,
    status::{
        self, ImportStatus, IndexStatus, PointInTimeRecoveryStatus, SseStatus, TableStatus,
        TimeToLiveStatus,
    },
    timeouts::{PITR_UPDATE_TIMEOUT, TTL_UPDATE_TIMEOUT},
    wait::{Absent, WaitSpec},
    Client,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    operation::{
        create_table::builders::CreateTableFluentBuilder,
        update_table::builders::UpdateTableFluentBuilder,
    },
    types::{
        ContinuousBackupsDescription, GlobalSecondaryIndexDescription, ImportTableDescription,
        PointInTimeRecoverySpecification, SseDescription, SseSpecification, SseType,
        StreamSpecification, StreamViewType, TableDescription, TimeToLiveDescription,
        TimeToLiveSpecification,
    },
};
use std::time::Duration;
use tracing::{debug, instrument};

/// `DescribeTable`, `None` if the table doesn't exist.
pub(crate) async fn describe_table(
    client: &aws_sdk_dynamodb::Client,
    table_name: &str,
) -> anyhow::Result<Option<TableDescription>> {
    let described = client
        .describe_table()
        .table_name(table_name)
        .send()
        .await
        .map_err(aws_sdk_dynamodb::Error::from);

    match described {
        Ok(out) => Ok(out.table),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("describing table ({table_name})")),
    }
}

/// Table status via `DescribeTable`.
#[derive(Debug, Clone)]
pub struct TableProber {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl TableProber {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl Prober for TableProber {
    type Status = TableStatus;
    type Snapshot = TableDescription;

    async fn probe(&self) -> anyhow::Result<Probe<TableStatus, TableDescription>> {
        let Some(table) = describe_table(&self.client, &self.table_name).await? else {
            return Ok(Probe::Absent);
        };
        let status = status::parse(table.table_status().map(|s| s.as_str()), "table")?;
        Ok(Probe::found(status, table))
    }
}

/// Global secondary index status, absent when the index isn't on the table.
#[derive(Debug, Clone)]
pub struct IndexProber {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    index_name: String,
}

impl IndexProber {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        table_name: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            index_name: index_name.into(),
        }
    }
}

#[async_trait]
impl Prober for IndexProber {
    type Status = IndexStatus;
    type Snapshot = GlobalSecondaryIndexDescription;

    async fn probe(&self) -> anyhow::Result<Probe<IndexStatus, GlobalSecondaryIndexDescription>> {
        let index = describe_table(&self.client, &self.table_name)
            .await?
            .and_then(|t| t.global_secondary_indexes)
            .unwrap_or_default()
            .into_iter()
            .find(|gsi| gsi.index_name() == Some(self.index_name.as_str()));

        match index {
            Some(index) => {
                let status = status::parse(index.index_status().map(|s| s.as_str()), "index")?;
                Ok(Probe::found(status, index))
            }
            None => Ok(Probe::Absent),
        }
    }
}

/// Server side encryption status of a table.
///
/// A table without an encryption description uses the default owned key,
/// reported as `DISABLED`.
#[derive(Debug, Clone)]
pub struct SseProber {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl SseProber {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl Prober for SseProber {
    type Status = SseStatus;
    type Snapshot = SseDescription;

    async fn probe(&self) -> anyhow::Result<Probe<SseStatus, SseDescription>> {
        let Some(table) = describe_table(&self.client, &self.table_name).await? else {
            return Ok(Probe::Absent);
        };
        match table.sse_description {
            Some(sse) => {
                let status = status::parse(sse.status().map(|s| s.as_str()), "server side encryption")?;
                Ok(Probe::found(status, sse))
            }
            None => Ok(Probe::found(SseStatus::Disabled, SseDescription::builder().build())),
        }
    }
}

/// Time to live status via `DescribeTimeToLive`.
#[derive(Debug, Clone)]
pub struct TimeToLiveProber {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl TimeToLiveProber {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl Prober for TimeToLiveProber {
    type Status = TimeToLiveStatus;
    type Snapshot = TimeToLiveDescription;

    async fn probe(&self) -> anyhow::Result<Probe<TimeToLiveStatus, TimeToLiveDescription>> {
        let described = self
            .client
            .describe_time_to_live()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from);
        let ttl = match described {
            Ok(out) => out.time_to_live_description,
            Err(err) if is_not_found(&err) => None,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("describing time to live of table ({})", self.table_name))
            }
        };

        match ttl {
            Some(ttl) => {
                let status =
                    status::parse(ttl.time_to_live_status().map(|s| s.as_str()), "time to live")?;
                Ok(Probe::found(status, ttl))
            }
            None => Ok(Probe::Absent),
        }
    }
}

/// Point in time recovery status via `DescribeContinuousBackups`.
#[derive(Debug, Clone)]
pub struct PointInTimeRecoveryProber {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl PointInTimeRecoveryProber {
    /// `client` must target the table's region.
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl Prober for PointInTimeRecoveryProber {
    type Status = PointInTimeRecoveryStatus;
    type Snapshot = ContinuousBackupsDescription;

    async fn probe(
        &self,
    ) -> anyhow::Result<Probe<PointInTimeRecoveryStatus, ContinuousBackupsDescription>> {
        let described = self
            .client
            .describe_continuous_backups()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from);
        let backups = match described {
            Ok(out) => out.continuous_backups_description,
            Err(err) if is_not_found(&err) => None,
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("describing continuous backups of table ({})", self.table_name)
                })
            }
        };

        let Some(backups) = backups else {
            return Ok(Probe::Absent);
        };
        let label = backups
            .point_in_time_recovery_description()
            .and_then(|pitr| pitr.point_in_time_recovery_status())
            .map(|s| s.as_str());
        let status = status::parse(label, "point in time recovery")?;
        Ok(Probe::found(status, backups))
    }
}

/// Import status via `DescribeImport`.
#[derive(Debug, Clone)]
pub struct ImportProber {
    client: aws_sdk_dynamodb::Client,
    import_arn: String,
}

impl ImportProber {
    pub fn new(client: aws_sdk_dynamodb::Client, import_arn: impl Into<String>) -> Self {
        Self {
            client,
            import_arn: import_arn.into(),
        }
    }
}

#[async_trait]
impl Prober for ImportProber {
    type Status = ImportStatus;
    type Snapshot = ImportTableDescription;

    async fn probe(&self) -> anyhow::Result<Probe<ImportStatus, ImportTableDescription>> {
        let described = self
            .client
            .describe_import()
            .import_arn(&self.import_arn)
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from);
        let import = match described {
            Ok(out) => out.import_table_description,
            Err(err) if is_not_found(&err) => None,
            Err(err) => {
                return Err(err).with_context(|| format!("describing import ({})", self.import_arn))
            }
        };

        match import {
            Some(import) => {
                let status = status::parse(import.import_status().map(|s| s.as_str()), "import")?;
                Ok(Probe::found(status, import))
            }
            None => Ok(Probe::Absent),
        }
    }
}

pub(crate) fn table_active(spec: WaitSpec<TableStatus>) -> WaitSpec<TableStatus> {
    spec.pending([TableStatus::Creating, TableStatus::Updating])
        .target([TableStatus::Active])
        .failure([
            TableStatus::Archiving,
            TableStatus::Archived,
            TableStatus::InaccessibleEncryptionCredentials,
        ])
}

pub(crate) fn table_deleted(spec: WaitSpec<TableStatus>) -> WaitSpec<TableStatus> {
    spec.pending([TableStatus::Active, TableStatus::Deleting, TableStatus::Updating])
        .absent(Absent::Target)
}

pub(crate) fn index_active(spec: WaitSpec<IndexStatus>) -> WaitSpec<IndexStatus> {
    spec.pending([IndexStatus::Creating, IndexStatus::Updating])
        .target([IndexStatus::Active])
}

pub(crate) fn index_deleted(spec: WaitSpec<IndexStatus>) -> WaitSpec<IndexStatus> {
    spec.pending([IndexStatus::Active, IndexStatus::Deleting, IndexStatus::Updating])
        .absent(Absent::Target)
}

pub(crate) fn ttl_updated(spec: WaitSpec<TimeToLiveStatus>, enabled: bool) -> WaitSpec<TimeToLiveStatus> {
    use TimeToLiveStatus::*;
    if enabled {
        spec.pending([Disabled, Enabling]).target([Enabled])
    } else {
        spec.pending([Enabled, Disabling]).target([Disabled])
    }
}

pub(crate) fn pitr_updated(
    spec: WaitSpec<PointInTimeRecoveryStatus>,
    enabled: bool,
) -> WaitSpec<PointInTimeRecoveryStatus> {
    use PointInTimeRecoveryStatus::*;
    if enabled {
        spec.pending([Disabled]).target([Enabled])
    } else {
        spec.pending([Enabled]).target([Disabled])
    }
}

pub(crate) fn sse_updated(spec: WaitSpec<SseStatus>) -> WaitSpec<SseStatus> {
    spec.pending([SseStatus::Enabling, SseStatus::Disabling, SseStatus::Updating])
        .target([SseStatus::Enabled, SseStatus::Disabled])
}

pub(crate) fn import_completed(spec: WaitSpec<ImportStatus>) -> WaitSpec<ImportStatus> {
    spec.pending([ImportStatus::InProgress])
        .target([ImportStatus::Completed])
        .failure([
            ImportStatus::Failed,
            ImportStatus::Cancelling,
            ImportStatus::Cancelled,
        ])
}

/// Table lifecycle.
impl Client {
    /// Waits for a table to become `ACTIVE`.
    ///
    /// A missing table is tolerated for a few probes, as it may not be visible
    /// straight after creation.
    #[instrument(skip_all, fields(table = table_name))]
    pub async fn wait_table_active(
        &self,
        table_name: &str,
        timeout: Duration,
    ) -> anyhow::Result<TableDescription> {
        let prober = TableProber::new(self.client.clone(), table_name);
        let spec = table_active(self.wait_spec(timeout));
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for table ({table_name}) to be active"))?
            .into_snapshot()
            .with_context(|| format!("table ({table_name}) not found"))
    }

    #[instrument(skip_all, fields(table = table_name))]
    pub async fn wait_table_deleted(&self, table_name: &str, timeout: Duration) -> anyhow::Result<()> {
        let prober = TableProber::new(self.client.clone(), table_name);
        let spec = table_deleted(self.wait_spec(timeout));
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for table ({table_name}) deletion"))?;
        Ok(())
    }

    #[instrument(skip_all, fields(table = table_name, index = index_name))]
    pub async fn wait_gsi_active(
        &self,
        table_name: &str,
        index_name: &str,
        timeout: Duration,
    ) -> anyhow::Result<GlobalSecondaryIndexDescription> {
        let prober = IndexProber::new(self.client.clone(), table_name, index_name);
        let spec = index_active(self.wait_spec(timeout));
        self.wait(&spec, &prober)
            .await
            .with_context(|| {
                format!("waiting for index ({index_name}) of table ({table_name}) to be active")
            })?
            .into_snapshot()
            .with_context(|| format!("index ({index_name}) of table ({table_name}) not found"))
    }

    #[instrument(skip_all, fields(table = table_name, index = index_name))]
    pub async fn wait_gsi_deleted(
        &self,
        table_name: &str,
        index_name: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let prober = IndexProber::new(self.client.clone(), table_name, index_name);
        let spec = index_deleted(self.wait_spec(timeout));
        self.wait(&spec, &prober).await.with_context(|| {
            format!("waiting for index ({index_name}) of table ({table_name}) deletion")
        })?;
        Ok(())
    }

    /// Waits for a time to live update to settle. Never waits less than 30s.
    #[instrument(skip_all, fields(table = table_name, enabled = enabled))]
    pub async fn wait_ttl_updated(
        &self,
        table_name: &str,
        enabled: bool,
    ) -> anyhow::Result<TimeToLiveDescription> {
        let prober = TimeToLiveProber::new(self.client.clone(), table_name);
        let timeout = self.timeouts.ttl_update.max(TTL_UPDATE_TIMEOUT);
        let spec = ttl_updated(self.wait_spec(timeout), enabled);
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for table ({table_name}) time to live update"))?
            .into_snapshot()
            .with_context(|| format!("time to live of table ({table_name}) not found"))
    }

    /// Waits for a point in time recovery update to settle, in `region` when
    /// given. Never waits less than 30s.
    #[instrument(skip_all, fields(table = table_name, enabled = enabled, region = ?region))]
    pub async fn wait_pitr_updated(
        &self,
        table_name: &str,
        enabled: bool,
        region: Option<&str>,
    ) -> anyhow::Result<ContinuousBackupsDescription> {
        let prober = PointInTimeRecoveryProber::new(self.in_region(region), table_name);
        let timeout = self.timeouts.pitr_update.max(PITR_UPDATE_TIMEOUT);
        let spec = pitr_updated(self.wait_spec(timeout), enabled);
        self.wait(&spec, &prober)
            .await
            .with_context(|| {
                format!("waiting for table ({table_name}) point in time recovery update")
            })?
            .into_snapshot()
            .with_context(|| format!("continuous backups of table ({table_name}) not found"))
    }

    #[instrument(skip_all, fields(table = table_name))]
    pub async fn wait_sse_updated(
        &self,
        table_name: &str,
        timeout: Duration,
    ) -> anyhow::Result<SseDescription> {
        let prober = SseProber::new(self.client.clone(), table_name);
        let spec = sse_updated(self.wait_spec(timeout)).delay(self.timeouts.sse_delay);
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for table ({table_name}) encryption update"))?
            .into_snapshot()
            .with_context(|| format!("table ({table_name}) not found"))
    }

    #[instrument(skip_all, fields(import = import_arn))]
    pub async fn wait_import_completed(
        &self,
        import_arn: &str,
        timeout: Duration,
    ) -> anyhow::Result<ImportTableDescription> {
        let prober = ImportProber::new(self.client.clone(), import_arn);
        let spec = import_completed(self.wait_spec(timeout));
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for import ({import_arn}) completion"))?
            .into_snapshot()
            .with_context(|| format!("import ({import_arn}) not found"))
    }

    /// Creates a table & waits for it to become active.
    ///
    /// The request is retried while the account is at its limit of tables
    /// being created, updated or deleted at once.
    #[instrument(skip_all, fields(table = ?request.get_table_name()))]
    pub async fn create_table(
        &self,
        request: CreateTableFluentBuilder,
    ) -> anyhow::Result<TableDescription> {
        let table_name = request
            .get_table_name()
            .clone()
            .context("create table request without a table name")?;

        self.retry(RetryPolicy::TABLE_MUTATION, self.timeouts.create, || {
            request.clone().send()
        })
        .await
        .with_context(|| format!("creating table ({table_name})"))?;

        self.wait_table_active(&table_name, self.timeouts.create)
            .await
    }

    /// Updates a table & waits for it to become active again.
    #[instrument(skip_all, fields(table = ?request.get_table_name()))]
    pub async fn update_table(
        &self,
        request: UpdateTableFluentBuilder,
    ) -> anyhow::Result<TableDescription> {
        let table_name = request
            .get_table_name()
            .clone()
            .context("update table request without a table name")?;

        self.retry(RetryPolicy::TABLE_MUTATION, self.timeouts.update_table, || {
            request.clone().send()
        })
        .await
        .with_context(|| format!("updating table ({table_name})"))?;

        self.wait_table_active(&table_name, self.timeouts.update)
            .await
    }

    /// Deletes a table & waits until it's gone. Deleting a missing table
    /// succeeds.
    #[instrument(skip_all, fields(table = table_name))]
    pub async fn delete_table(&self, table_name: &str) -> anyhow::Result<()> {
        let deleted = self
            .retry(RetryPolicy::TABLE_DELETE, self.timeouts.delete, || {
                self.client.delete_table().table_name(table_name).send()
            })
            .await;

        match deleted {
            Ok(_) => {}
            Err(RetryError::Fatal(err)) if is_not_found(&err) => {
                debug!("table already deleted");
                return Ok(());
            }
            Err(err) => return Err(err).with_context(|| format!("deleting table ({table_name})")),
        }

        self.wait_table_deleted(table_name, self.timeouts.delete)
            .await
    }

    /// Enables or disables time to live on `attribute` & waits for it to settle.
    #[instrument(skip_all, fields(table = table_name, attribute = attribute, enabled = enabled))]
    pub async fn update_time_to_live(
        &self,
        table_name: &str,
        attribute: &str,
        enabled: bool,
    ) -> anyhow::Result<TimeToLiveDescription> {
        let specification = TimeToLiveSpecification::builder()
            .attribute_name(attribute)
            .enabled(enabled)
            .build()?;

        self.retry(RetryPolicy::TABLE_MUTATION, self.timeouts.update_table, || {
            self.client
                .update_time_to_live()
                .table_name(table_name)
                .time_to_live_specification(specification.clone())
                .send()
        })
        .await
        .with_context(|| format!("updating time to live of table ({table_name})"))?;

        self.wait_ttl_updated(table_name, enabled).await
    }

    /// Enables or disables point in time recovery, in `region` when given, &
    /// waits for it to settle.
    ///
    /// Retried while continuous backups of a new table are still being enabled.
    #[instrument(skip_all, fields(table = table_name, enabled = enabled, region = ?region))]
    pub async fn update_point_in_time_recovery(
        &self,
        table_name: &str,
        enabled: bool,
        region: Option<&str>,
    ) -> anyhow::Result<ContinuousBackupsDescription> {
        let client = self.in_region(region);
        let specification = PointInTimeRecoverySpecification::builder()
            .point_in_time_recovery_enabled(enabled)
            .build()?;

        self.retry(
            RetryPolicy::CONTINUOUS_BACKUPS,
            self.timeouts.continuous_backups_update,
            || {
                client
                    .update_continuous_backups()
                    .table_name(table_name)
                    .point_in_time_recovery_specification(specification.clone())
                    .send()
            },
        )
        .await
        .with_context(|| format!("updating point in time recovery of table ({table_name})"))?;

        self.wait_pitr_updated(table_name, enabled, region).await
    }

    /// Switches server side encryption between the default owned key &
    /// a KMS key, then waits for encryption to settle.
    #[instrument(skip_all, fields(table = table_name, enabled = enabled))]
    pub async fn update_sse(
        &self,
        table_name: &str,
        enabled: bool,
        kms_key_id: Option<String>,
    ) -> anyhow::Result<SseDescription> {
        let mut specification = SseSpecification::builder().enabled(enabled);
        if enabled {
            specification = specification
                .sse_type(SseType::Kms)
                .set_kms_master_key_id(kms_key_id);
        }
        let specification = specification.build();

        self.retry(RetryPolicy::TABLE_MUTATION, self.timeouts.update_table, || {
            self.client
                .update_table()
                .table_name(table_name)
                .sse_specification(specification.clone())
                .send()
        })
        .await
        .with_context(|| format!("updating encryption of table ({table_name})"))?;

        self.wait_sse_updated(table_name, self.timeouts.update).await
    }

    /// Replaces the stream of a table with a new one of `view_type`.
    ///
    /// The stream view type can't be changed in place, so the stream is
    /// disabled then re-enabled, waiting for the table between each step.
    #[instrument(skip_all, fields(table = table_name, view_type = ?view_type))]
    pub async fn cycle_stream(
        &self,
        table_name: &str,
        view_type: StreamViewType,
    ) -> anyhow::Result<TableDescription> {
        let disable = StreamSpecification::builder().stream_enabled(false).build()?;
        let enable = StreamSpecification::builder()
            .stream_enabled(true)
            .stream_view_type(view_type)
            .build()?;

        for (step, specification) in [("disabling", disable), ("enabling", enable)] {
            self.retry(RetryPolicy::TABLE_MUTATION, self.timeouts.update_table, || {
                self.client
                    .update_table()
                    .table_name(table_name)
                    .stream_specification(specification.clone())
                    .send()
            })
            .await
            .with_context(|| format!("{step} stream of table ({table_name})"))?;

            self.wait_table_active(table_name, self.timeouts.update)
                .await?;
        }

        describe_table(&self.client, table_name)
            .await?
            .with_context(|| format!("table ({table_name}) not found"))
    }
}
