use crate::{
    client::is_not_found,
    ids::ContributorInsightsId,
    probe::{Probe, Prober},
    retry::RetryPolicy,
    status::ContributorInsightsStatus,
    wait::{Absent, WaitSpec},
    Client,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    operation::describe_contributor_insights::DescribeContributorInsightsOutput,
    types::ContributorInsightsAction,
};
use tracing::instrument;

/// Contributor insights status of a table or one of its indexes.
#[derive(Debug, Clone)]
pub struct ContributorInsightsProber {
    client: aws_sdk_dynamodb::Client,
    id: ContributorInsightsId,
}

impl ContributorInsightsProber {
    pub fn new(client: aws_sdk_dynamodb::Client, id: ContributorInsightsId) -> Self {
        Self { client, id }
    }
}

#[async_trait]
impl Prober for ContributorInsightsProber {
    type Status = ContributorInsightsStatus;
    type Snapshot = DescribeContributorInsightsOutput;

    async fn probe(
        &self,
    ) -> anyhow::Result<Probe<ContributorInsightsStatus, DescribeContributorInsightsOutput>> {
        let described = self
            .client
            .describe_contributor_insights()
            .table_name(&self.id.table_name)
            .set_index_name(self.id.index_name.clone())
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from);

        let out = match described {
            Ok(out) => out,
            Err(err) if is_not_found(&err) => return Ok(Probe::Absent),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("describing contributor insights ({})", self.id))
            }
        };
        let status: ContributorInsightsStatus = match out.contributor_insights_status() {
            Some(status) => status.as_str().parse()?,
            None => return Ok(Probe::Absent),
        };
        Ok(Probe::found(status, out))
    }
}

pub(crate) fn insights_enabled(
    spec: WaitSpec<ContributorInsightsStatus>,
) -> WaitSpec<ContributorInsightsStatus> {
    spec.pending([ContributorInsightsStatus::Enabling])
        .target([ContributorInsightsStatus::Enabled])
        .failure([ContributorInsightsStatus::Failed])
}

pub(crate) fn insights_disabled(
    spec: WaitSpec<ContributorInsightsStatus>,
) -> WaitSpec<ContributorInsightsStatus> {
    spec.pending([ContributorInsightsStatus::Disabling])
        .target([ContributorInsightsStatus::Disabled])
        .absent(Absent::Target)
}

/// Contributor insights.
impl Client {
    /// Enables contributor insights & waits until enabled.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn enable_contributor_insights(
        &self,
        id: &ContributorInsightsId,
    ) -> anyhow::Result<DescribeContributorInsightsOutput> {
        self.update_contributor_insights(id, ContributorInsightsAction::Enable)
            .await?;

        let prober = ContributorInsightsProber::new(self.client.clone(), id.clone());
        let spec = insights_enabled(self.wait_spec(self.timeouts.contributor_insights));
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for contributor insights ({id}) to be enabled"))?
            .into_snapshot()
            .with_context(|| format!("contributor insights ({id}) not found"))
    }

    /// Disables contributor insights & waits until disabled.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn disable_contributor_insights(
        &self,
        id: &ContributorInsightsId,
    ) -> anyhow::Result<()> {
        self.update_contributor_insights(id, ContributorInsightsAction::Disable)
            .await?;

        let prober = ContributorInsightsProber::new(self.client.clone(), id.clone());
        let spec = insights_disabled(self.wait_spec(self.timeouts.contributor_insights));
        self.wait(&spec, &prober)
            .await
            .with_context(|| format!("waiting for contributor insights ({id}) to be disabled"))?;
        Ok(())
    }

    async fn update_contributor_insights(
        &self,
        id: &ContributorInsightsId,
        action: ContributorInsightsAction,
    ) -> anyhow::Result<()> {
        self.retry(
            RetryPolicy::TABLE_MUTATION,
            self.timeouts.contributor_insights,
            || {
                self.client
                    .update_contributor_insights()
                    .table_name(&id.table_name)
                    .set_index_name(id.index_name.clone())
                    .contributor_insights_action(action.clone())
                    .send()
            },
        )
        .await
        .with_context(|| format!("updating contributor insights ({id}) with {action:?}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::Disposition;
    use std::time::Duration;

    #[test]
    fn enabled_fails_on_failed() {
        let spec = insights_enabled(WaitSpec::new(Duration::from_secs(60)));
        assert_eq!(spec.classify(&ContributorInsightsStatus::Failed), Disposition::Failure);
        assert_eq!(spec.classify(&ContributorInsightsStatus::Enabling), Disposition::Pending);
        assert_eq!(spec.classify(&ContributorInsightsStatus::Disabled), Disposition::Unexpected);
    }
}
