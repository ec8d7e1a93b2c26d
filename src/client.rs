use crate::{
    error::{RetryError, WaitError},
    probe::{Probe, Prober},
    retry::RetryPolicy,
    timeouts::Timeouts,
    wait::{PollInterval, WaitSpec},
    ClientBuilder,
};
use aws_sdk_dynamodb::{config::Region, error::SdkError};
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;

/// Client for reconciling dynamodb resources.
///
/// Issues mutations with retries on transient errors, then blocks until the
/// remote resource settles into a stable state.
///
/// Cloning is cheap, clones share the underlying sdk client & cancellation
/// token.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) client: aws_sdk_dynamodb::Client,
    pub(crate) timeouts: Timeouts,
    pub(crate) poll: PollInterval,
    pub(crate) progress_interval: Duration,
    pub(crate) cancel: CancellationToken,
}

impl Client {
    /// Returns a new [`Client`] builder.
    pub fn builder() -> ClientBuilder {
        <_>::default()
    }

    /// The wrapped sdk client.
    pub fn dynamodb(&self) -> &aws_sdk_dynamodb::Client {
        &self.client
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns an sdk client for `region` sharing this client's credentials
    /// & settings.
    pub fn regional(&self, region: &str) -> aws_sdk_dynamodb::Client {
        let conf = self
            .client
            .config()
            .to_builder()
            .region(Region::new(region.to_owned()))
            .build();
        aws_sdk_dynamodb::Client::from_conf(conf)
    }

    /// Sdk client for `region`, or the default client when `None`.
    pub(crate) fn in_region(&self, region: Option<&str>) -> aws_sdk_dynamodb::Client {
        match region {
            Some(region) => self.regional(region),
            None => self.client.clone(),
        }
    }

    /// An empty [`WaitSpec`] using this client's poll interval.
    pub fn wait_spec<S>(&self, timeout: Duration) -> WaitSpec<S> {
        WaitSpec::new(timeout).poll(self.poll)
    }

    pub(crate) async fn wait<P: Prober>(
        &self,
        spec: &WaitSpec<P::Status>,
        prober: &P,
    ) -> Result<Probe<P::Status, P::Snapshot>, WaitError<P::Status, P::Snapshot>> {
        spec.wait_for_state(prober, &self.cancel).await
    }

    /// Runs a dynamodb request through `policy`.
    pub(crate) async fn retry<T, E, R, F, Fut>(
        &self,
        policy: RetryPolicy,
        timeout: Duration,
        op: F,
    ) -> Result<T, RetryError<aws_sdk_dynamodb::Error>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SdkError<E, R>>>,
        aws_sdk_dynamodb::Error: From<SdkError<E, R>>,
    {
        policy
            .run(timeout, &self.cancel, || {
                let request = op();
                async move { request.await.map_err(aws_sdk_dynamodb::Error::from) }
            })
            .await
    }
}

/// Whether a remote error is a "not found" for the described resource.
pub(crate) fn is_not_found(err: &aws_sdk_dynamodb::Error) -> bool {
    use aws_sdk_dynamodb::Error as E;
    matches!(
        err,
        E::ResourceNotFoundException(_)
            | E::TableNotFoundException(_)
            | E::BackupNotFoundException(_)
            | E::ImportNotFoundException(_)
    )
}
