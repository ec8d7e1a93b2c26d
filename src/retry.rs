use crate::{
    error::RetryError,
    wait::{pause, PollInterval},
};
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use std::{fmt, future::Future, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Error code & message of a remote error, used to classify it.
pub trait ServiceError: std::error::Error + Send + Sync + 'static {
    fn code(&self) -> Option<&str>;
    fn message(&self) -> Option<&str>;
}

impl ServiceError for aws_sdk_dynamodb::Error {
    fn code(&self) -> Option<&str> {
        ProvideErrorMetadata::code(self)
    }

    fn message(&self) -> Option<&str> {
        ProvideErrorMetadata::message(self)
    }
}

impl<E, R> ServiceError for SdkError<E, R>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    fn code(&self) -> Option<&str> {
        ProvideErrorMetadata::code(self)
    }

    fn message(&self) -> Option<&str> {
        ProvideErrorMetadata::message(self)
    }
}

/// A single retryable error pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCondition {
    /// Error code equals.
    Code(&'static str),
    /// Error code equals and the message contains `contains`.
    CodeMessage {
        code: &'static str,
        contains: &'static str,
    },
    /// Message contains, whatever the code.
    Message(&'static str),
}

impl RetryCondition {
    pub fn matches<E: ServiceError + ?Sized>(&self, err: &E) -> bool {
        let message_contains =
            |needle: &str| err.message().map_or(false, |msg| msg.contains(needle));
        match *self {
            Self::Code(code) => err.code() == Some(code),
            Self::CodeMessage { code, contains } => {
                err.code() == Some(code) && message_contains(contains)
            }
            Self::Message(contains) => message_contains(contains),
        }
    }
}

pub(crate) const THROTTLING: RetryCondition = RetryCondition::Code("ThrottlingException");

pub(crate) const SIMULTANEOUS_MUTATION: RetryCondition = RetryCondition::CodeMessage {
    code: "LimitExceededException",
    contains: "can be created, updated, or deleted simultaneously",
};

pub(crate) const SIMULTANEOUS_INDEXED_CREATE: RetryCondition = RetryCondition::CodeMessage {
    code: "LimitExceededException",
    contains: "indexed tables that can be created simultaneously",
};

pub(crate) const RESOURCE_IN_USE: RetryCondition = RetryCondition::Code("ResourceInUseException");

pub(crate) const BACKUPS_BEING_ENABLED: RetryCondition = RetryCondition::CodeMessage {
    code: "ContinuousBackupsUnavailableException",
    contains: "Backups are being enabled",
};

/// Which remote errors are transient for one kind of mutation & how long to
/// keep retrying them.
///
/// The retry budget is time based, see [`RetryPolicy::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    conditions: &'static [RetryCondition],
    poll: PollInterval,
}

impl RetryPolicy {
    /// Retries `conditions`, pausing 500ms doubling up to 10s between attempts.
    pub const fn new(conditions: &'static [RetryCondition]) -> Self {
        Self {
            conditions,
            poll: PollInterval::Backoff {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(10),
            },
        }
    }

    pub const fn with_poll(mut self, poll: PollInterval) -> Self {
        self.poll = poll;
        self
    }

    /// Structural table mutations: throttling & the per-account limit on
    /// tables being created, updated or deleted at once.
    pub const TABLE_MUTATION: Self = Self::new(&[
        THROTTLING,
        SIMULTANEOUS_MUTATION,
        SIMULTANEOUS_INDEXED_CREATE,
    ]);

    /// Table deletion also waits out any in-flight update of the same table.
    pub const TABLE_DELETE: Self = Self::new(&[
        THROTTLING,
        RetryCondition::CodeMessage {
            code: "LimitExceededException",
            contains: "simultaneously",
        },
        RESOURCE_IN_USE,
    ]);

    /// Replica create/update, replicas are added one at a time per table.
    pub const REPLICA_MUTATION: Self = Self::new(&[
        THROTTLING,
        SIMULTANEOUS_MUTATION,
        RetryCondition::CodeMessage {
            code: "ValidationException",
            contains: "Replica specified in the Replica Update or Replica Delete action of the request was not found",
        },
        RESOURCE_IN_USE,
    ]);

    /// Replica deletion, a "not found" can be stale right after creation.
    pub const REPLICA_DELETE: Self = Self::new(&[
        THROTTLING,
        RetryCondition::Code("ResourceNotFoundException"),
        SIMULTANEOUS_MUTATION,
        RESOURCE_IN_USE,
    ]);

    /// Continuous backups of a freshly created table may still be enabling.
    pub const CONTINUOUS_BACKUPS: Self = Self::new(&[BACKUPS_BEING_ENABLED]);

    /// On-demand backup creation.
    pub const CREATE_BACKUP: Self = Self::new(&[
        THROTTLING,
        BACKUPS_BEING_ENABLED,
        RetryCondition::Code("LimitExceededException"),
    ]);

    pub fn conditions(&self) -> &'static [RetryCondition] {
        self.conditions
    }

    pub fn is_retryable<E: ServiceError + ?Sized>(&self, err: &E) -> bool {
        self.conditions.iter().any(|c| c.matches(err))
    }

    /// Invokes `op` until it succeeds, fails with a non-retryable error, or
    /// `timeout` elapses.
    ///
    /// Non-retryable errors are returned unchanged as [`RetryError::Fatal`].
    /// Once the budget is spent a final attempt is always made, so a condition
    /// clearing just as the budget runs out is not reported as a failure.
    pub async fn run<F, Fut, T, E>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ServiceError,
    {
        let start = Instant::now();
        let mut delays = self.poll.delays();
        let mut attempts = 0;
        let mut last = None;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { last });
            }
            attempts += 1;

            let err = match op().await {
                Ok(out) => return Ok(out),
                Err(err) if !self.is_retryable(&err) => return Err(RetryError::Fatal(err)),
                Err(err) => err,
            };

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!(attempts, "retry budget spent, making a final attempt");
                attempts += 1;
                return match op().await {
                    Ok(out) => Ok(out),
                    Err(err) if self.is_retryable(&err) => Err(RetryError::Timeout {
                        timeout,
                        attempts,
                        last: err,
                    }),
                    Err(err) => Err(RetryError::Fatal(err)),
                };
            }

            let delay = delays.next().unwrap_or(crate::wait::MIN_POLL_INTERVAL);
            warn!(
                attempts,
                code = err.code().unwrap_or_default(),
                error = %err,
                ?delay,
                "transient error, retrying"
            );
            last = Some(err);

            if !pause(delay.min(timeout - elapsed), cancel).await {
                return Err(RetryError::Cancelled { last });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("{code}: {message}")]
    struct FakeError {
        code: &'static str,
        message: &'static str,
    }

    impl ServiceError for FakeError {
        fn code(&self) -> Option<&str> {
            Some(self.code)
        }

        fn message(&self) -> Option<&str> {
            Some(self.message)
        }
    }

    const THROTTLED: FakeError = FakeError {
        code: "ThrottlingException",
        message: "Rate exceeded",
    };

    const LIMIT: FakeError = FakeError {
        code: "LimitExceededException",
        message: "Subscriber limit exceeded: Only 10 tables can be created, updated, or deleted simultaneously",
    };

    const VALIDATION: FakeError = FakeError {
        code: "ValidationException",
        message: "One or more parameter values were invalid",
    };

    fn fixed(policy: RetryPolicy) -> RetryPolicy {
        policy.with_poll(PollInterval::Fixed(Duration::from_secs(1)))
    }

    #[test]
    fn table_mutation_conditions() {
        let policy = RetryPolicy::TABLE_MUTATION;
        assert!(policy.is_retryable(&THROTTLED));
        assert!(policy.is_retryable(&LIMIT));
        assert!(!policy.is_retryable(&VALIDATION));
        assert!(!policy.is_retryable(&FakeError {
            code: "LimitExceededException",
            message: "Too many backups",
        }));
    }

    #[test]
    fn message_condition_ignores_code() {
        let cond = RetryCondition::Message("parameter values");
        assert!(cond.matches(&VALIDATION));
        assert!(!cond.matches(&THROTTLED));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_then_success() {
        let calls = &AtomicU32::new(0);

        let out = fixed(RetryPolicy::TABLE_MUTATION)
            .run(Duration::from_secs(10), &CancellationToken::new(), move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=2 => Err(LIMIT),
                    n => Ok(n),
                }
            })
            .await
            .unwrap();

        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_is_returned_immediately() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let err = fixed(RetryPolicy::TABLE_MUTATION)
            .run(Duration::from_secs(10), &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(VALIDATION)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Fatal(FakeError { code: "ValidationException", .. })));
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_makes_a_final_attempt() {
        let calls = &AtomicU32::new(0);

        // fails until the budget is spent, then the final attempt succeeds
        let out = fixed(RetryPolicy::TABLE_MUTATION)
            .run(Duration::from_millis(2500), &CancellationToken::new(), move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=3 => Err(THROTTLED),
                    _ => Ok("done"),
                }
            })
            .await
            .unwrap();

        assert_eq!(out, "done");
        // attempts at 0s, 1s, 2s, 2.5s then the final attempt
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_when_still_failing() {
        let calls = &AtomicU32::new(0);

        let err = fixed(RetryPolicy::TABLE_MUTATION)
            .run(Duration::from_secs(3), &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(THROTTLED)
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        // the last remote error is kept as the source
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some(THROTTLED.to_string())
        );
        let attempts = calls.load(Ordering::SeqCst);
        assert!(
            matches!(err, RetryError::Timeout { attempts: a, .. } if a == attempts),
            "{err:?}"
        );
        assert_eq!(attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_between_attempts() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let err = fixed(RetryPolicy::TABLE_MUTATION)
            .run(Duration::from_secs(60), &cancel, || async {
                Err::<(), _>(THROTTLED)
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.inner().and_then(ServiceError::code), Some("ThrottlingException"));
    }
}
