use crate::{action::DEFAULT_PROGRESS_INTERVAL, timeouts::Timeouts, wait::PollInterval, Client};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// [`Client`] builder.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    timeouts: Timeouts,
    poll: PollInterval,
    progress_interval: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl ClientBuilder {
    /// Sets how long to wait for a created resource to become usable.
    ///
    /// Default `30m`.
    ///
    /// # Panics
    /// Panics if zero.
    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO, "must be greater than zero");
        self.timeouts.create = timeout;
        self
    }

    /// Sets how long to wait for an updated table to settle.
    ///
    /// Default `60m`.
    ///
    /// # Panics
    /// Panics if zero.
    pub fn update_timeout(mut self, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO, "must be greater than zero");
        self.timeouts.update = timeout;
        self
    }

    /// Sets how long to wait for a deleted resource to disappear.
    ///
    /// Default `10m`.
    ///
    /// # Panics
    /// Panics if zero.
    pub fn delete_timeout(mut self, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO, "must be greater than zero");
        self.timeouts.delete = timeout;
        self
    }

    /// Replaces every per-operation deadline at once.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the pause before the first probe of a replica wait. Replicas are
    /// not listed on the table description straight after the update.
    ///
    /// Default `30s`.
    pub fn replica_delay(mut self, delay: Duration) -> Self {
        self.timeouts.replica_delay = delay;
        self
    }

    /// Sets the pause between probes of every wait.
    ///
    /// Default doubling from 100ms up to 10s.
    pub fn poll_interval(mut self, poll: PollInterval) -> Self {
        self.poll = poll;
        self
    }

    /// Sets how often long running actions, like backups, report progress.
    ///
    /// Default `30s`.
    ///
    /// # Panics
    /// Panics if zero.
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        assert!(interval > Duration::ZERO, "must be greater than zero");
        self.progress_interval = Some(interval);
        self
    }

    /// Sets a token that aborts all in-flight waits & retries when cancelled.
    ///
    /// Default a token that is never cancelled.
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Builds a [`Client`].
    ///
    /// # Panics
    /// Panics if the replica delay is not less than the replica update timeout.
    pub fn build(self, dynamodb_client: aws_sdk_dynamodb::Client) -> Client {
        assert!(
            self.timeouts.replica_delay < self.timeouts.replica_update,
            "replica_delay must be less than the replica update timeout"
        );

        Client {
            client: dynamodb_client,
            timeouts: self.timeouts,
            poll: self.poll,
            progress_interval: self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "must be greater than zero")]
    fn zero_timeout() {
        let _ = ClientBuilder::default().create_timeout(Duration::ZERO);
    }

    #[test]
    fn defaults() {
        let builder = ClientBuilder::default().delete_timeout(Duration::from_secs(60));
        assert_eq!(builder.timeouts.delete, Duration::from_secs(60));
        assert_eq!(builder.timeouts.create, Duration::from_secs(30 * 60));
        assert_eq!(builder.timeouts.replica_delay, Duration::from_secs(30));
        assert_eq!(builder.poll, PollInterval::default());
    }
}
