use crate::{
    client::is_not_found,
    error::WaitError,
    ids::StreamDestinationId,
    probe::{Probe, Prober},
    retry::RetryPolicy,
    status::{self, DestinationStatus},
    wait::{Absent, WaitSpec},
    Client,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::KinesisDataStreamDestination;
use tracing::instrument;

/// Status of one Kinesis streaming destination of a table.
#[derive(Debug, Clone)]
pub struct KinesisDestinationProber {
    client: aws_sdk_dynamodb::Client,
    id: StreamDestinationId,
}

impl KinesisDestinationProber {
    pub fn new(client: aws_sdk_dynamodb::Client, id: StreamDestinationId) -> Self {
        Self { client, id }
    }
}

#[async_trait]
impl Prober for KinesisDestinationProber {
    type Status = DestinationStatus;
    type Snapshot = KinesisDataStreamDestination;

    async fn probe(&self) -> anyhow::Result<Probe<DestinationStatus, KinesisDataStreamDestination>> {
        let described = self
            .client
            .describe_kinesis_streaming_destination()
            .table_name(&self.id.table_name)
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from);

        let destinations = match described {
            Ok(out) => out.kinesis_data_stream_destinations.unwrap_or_default(),
            Err(err) if is_not_found(&err) => return Ok(Probe::Absent),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("describing kinesis streaming destination ({})", self.id))
            }
        };

        let destination = destinations
            .into_iter()
            .find(|d| d.stream_arn() == Some(self.id.stream_arn.as_str()));
        match destination {
            Some(destination) => {
                let label = destination.destination_status().map(|s| s.as_str());
                let status = status::parse(label, "kinesis streaming destination")?;
                Ok(Probe::found(status, destination))
            }
            None => Ok(Probe::Absent),
        }
    }
}

pub(crate) fn destination_active(spec: WaitSpec<DestinationStatus>) -> WaitSpec<DestinationStatus> {
    spec.pending([DestinationStatus::Disabled, DestinationStatus::Enabling])
        .target([DestinationStatus::Active])
        .failure([DestinationStatus::EnableFailed])
}

pub(crate) fn destination_disabled(
    spec: WaitSpec<DestinationStatus>,
) -> WaitSpec<DestinationStatus> {
    spec.pending([DestinationStatus::Disabling])
        .target([DestinationStatus::Disabled])
        .absent(Absent::Target)
}

/// Attaches the remote reason for a failed enable, when there is one.
fn with_status_description(
    err: WaitError<DestinationStatus, KinesisDataStreamDestination>,
) -> anyhow::Error {
    let description = err
        .snapshot()
        .and_then(|d| d.destination_status_description())
        .map(str::to_owned);
    match description {
        Some(description) => anyhow::Error::new(err).context(description),
        None => err.into(),
    }
}

/// Kinesis streaming destinations.
impl Client {
    /// Starts streaming table changes to a Kinesis stream & waits until active.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn enable_kinesis_streaming_destination(
        &self,
        id: &StreamDestinationId,
    ) -> anyhow::Result<KinesisDataStreamDestination> {
        self.retry(
            RetryPolicy::TABLE_MUTATION,
            self.timeouts.kinesis_destination,
            || {
                self.client
                    .enable_kinesis_streaming_destination()
                    .table_name(&id.table_name)
                    .stream_arn(&id.stream_arn)
                    .send()
            },
        )
        .await
        .with_context(|| format!("enabling kinesis streaming destination ({id})"))?;

        let prober = KinesisDestinationProber::new(self.client.clone(), id.clone());
        let spec = destination_active(self.wait_spec(self.timeouts.kinesis_destination));
        self.wait(&spec, &prober)
            .await
            .map_err(with_status_description)
            .with_context(|| format!("waiting for kinesis streaming destination ({id}) to be active"))?
            .into_snapshot()
            .with_context(|| format!("kinesis streaming destination ({id}) not found"))
    }

    /// Stops streaming table changes & waits until disabled.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn disable_kinesis_streaming_destination(
        &self,
        id: &StreamDestinationId,
    ) -> anyhow::Result<()> {
        self.retry(
            RetryPolicy::TABLE_MUTATION,
            self.timeouts.kinesis_destination,
            || {
                self.client
                    .disable_kinesis_streaming_destination()
                    .table_name(&id.table_name)
                    .stream_arn(&id.stream_arn)
                    .send()
            },
        )
        .await
        .with_context(|| format!("disabling kinesis streaming destination ({id})"))?;

        let prober = KinesisDestinationProber::new(self.client.clone(), id.clone());
        let spec = destination_disabled(self.wait_spec(self.timeouts.kinesis_destination));
        self.wait(&spec, &prober).await.with_context(|| {
            format!("waiting for kinesis streaming destination ({id}) to be disabled")
        })?;
        Ok(())
    }
}
