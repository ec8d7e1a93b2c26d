use crate::{
    action::{AsyncAction, ProgressSink},
    client::is_not_found,
    error::{ActionError, WaitError},
    probe::{Probe, Prober},
    retry::RetryPolicy,
    status::{self, BackupStatus},
    wait::WaitSpec,
    Client,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::BackupDescription;
use time::OffsetDateTime;
use tracing::instrument;

/// Status of an on-demand backup via `DescribeBackup`.
#[derive(Debug, Clone)]
pub struct BackupProber {
    client: aws_sdk_dynamodb::Client,
    backup_arn: String,
}

impl BackupProber {
    pub fn new(client: aws_sdk_dynamodb::Client, backup_arn: impl Into<String>) -> Self {
        Self {
            client,
            backup_arn: backup_arn.into(),
        }
    }
}

#[async_trait]
impl Prober for BackupProber {
    type Status = BackupStatus;
    type Snapshot = BackupDescription;

    async fn probe(&self) -> anyhow::Result<Probe<BackupStatus, BackupDescription>> {
        let described = self
            .client
            .describe_backup()
            .backup_arn(&self.backup_arn)
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from);

        let backup = match described {
            Ok(out) => out.backup_description,
            Err(err) if is_not_found(&err) => None,
            Err(err) => {
                return Err(err).with_context(|| format!("describing backup ({})", self.backup_arn))
            }
        };

        match backup {
            Some(backup) => {
                let label = backup.backup_details().map(|d| d.backup_status().as_str());
                let status = status::parse(label, "backup")?;
                Ok(Probe::found(status, backup))
            }
            None => Ok(Probe::Absent),
        }
    }
}

pub(crate) fn backup_available(spec: WaitSpec<BackupStatus>) -> WaitSpec<BackupStatus> {
    spec.pending([BackupStatus::Creating])
        .target([BackupStatus::Available])
        .failure([BackupStatus::Deleted])
}

fn default_backup_name(table_name: &str) -> String {
    format!("{table_name}-{}", OffsetDateTime::now_utc().unix_timestamp())
}

/// On-demand backups.
impl Client {
    /// Backs up a table, reporting progress to `progress` until the backup is
    /// available.
    ///
    /// `backup_name` defaults to the table name suffixed with the current unix
    /// timestamp.
    #[instrument(skip_all, fields(table = table_name))]
    pub async fn create_backup(
        &self,
        table_name: &str,
        backup_name: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<BackupDescription, ActionError<BackupStatus, BackupDescription>> {
        let backup_name = backup_name.map_or_else(|| default_backup_name(table_name), str::to_owned);
        let action = AsyncAction::new(format!("backup ({backup_name}) of table ({table_name})"))
            .progress_interval(self.progress_interval);

        let mutate = async {
            let created = self
                .retry(RetryPolicy::CREATE_BACKUP, self.timeouts.create, || {
                    self.client
                        .create_backup()
                        .table_name(table_name)
                        .backup_name(&backup_name)
                        .send()
                })
                .await
                .with_context(|| format!("creating backup ({backup_name}) of table ({table_name})"))?;
            created
                .backup_details()
                .map(|d| d.backup_arn().to_owned())
                .context("create backup returned no backup details")
        };
        let spec = backup_available(self.wait_spec(self.timeouts.create));

        let (_, done) = action
            .run(
                mutate,
                |arn: &String| BackupProber::new(self.client.clone(), arn.as_str()),
                &spec,
                progress,
                &self.cancel,
            )
            .await?;

        // absence is never a target of this wait
        done.into_snapshot()
            .ok_or(ActionError::Wait(WaitError::NotFound { checks: 0 }))
    }
}
