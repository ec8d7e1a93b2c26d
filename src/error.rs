use crate::{
    probe::{Probe, Snapshot, Status},
    status::*,
};
use aws_sdk_dynamodb::types::{
    BackupDescription, ContinuousBackupsDescription, GlobalSecondaryIndexDescription,
    ImportTableDescription, KinesisDataStreamDestination, ReplicaDescription, SseDescription,
    TableDescription, TimeToLiveDescription,
};
use aws_sdk_dynamodb::operation::describe_contributor_insights::DescribeContributorInsightsOutput;
use std::{fmt, time::Duration};
use thiserror::Error;

/// Coarse classification shared by every error the crate surfaces.
///
/// Lets callers decide between "retry later", "increase the timeout" and
/// "the resource is broken" without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Throttling or concurrent structural mutation. Retried internally, an
    /// exhausted retry budget is reported as [`ErrorKind::Timeout`].
    Transient,
    /// The resource could not be found.
    Absent,
    /// The resource moved into a declared bad state.
    FailureState,
    /// The resource reported a status outside every declared set.
    UnexpectedState,
    /// The deadline elapsed before a terminal state.
    Timeout,
    /// An external cancellation signal aborted the operation.
    Cancelled,
    /// Any other remote or client failure.
    Remote,
}

/// Terminal failure of a [`crate::WaitSpec::wait_for_state`] call.
#[derive(Debug, Error)]
pub enum WaitError<S: Status, T: Snapshot> {
    #[error("resource entered failure state '{status}'")]
    Failure { status: S, snapshot: Box<T> },

    #[error("unexpected state '{status}', wanted target '{}'", states(.expected))]
    UnexpectedState {
        status: S,
        expected: Vec<S>,
        snapshot: Box<T>,
    },

    #[error(
        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {timeout:?})",
        states(.expected),
        last_label(.last)
    )]
    Timeout {
        timeout: Duration,
        expected: Vec<S>,
        last: Option<Probe<S, T>>,
    },

    /// The remote reported a status label with no mapping, eg one added after
    /// this crate was built.
    #[error("unexpected state, wanted target '{}'", states(.expected))]
    UnrecognizedState {
        #[source]
        unrecognized: UnrecognizedStatus,
        expected: Vec<S>,
        last: Option<Probe<S, T>>,
    },

    #[error("couldn't find resource ({checks} consecutive checks)")]
    NotFound { checks: u32 },

    #[error("wait cancelled (last state: '{}')", last_label(.last))]
    Cancelled { last: Option<Probe<S, T>> },

    #[error("describing remote status")]
    Probe(#[source] anyhow::Error),
}

impl<S: Status, T: Snapshot> WaitError<S, T> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failure { .. } => ErrorKind::FailureState,
            Self::UnexpectedState { .. } | Self::UnrecognizedState { .. } => {
                ErrorKind::UnexpectedState
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotFound { .. } => ErrorKind::Absent,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Probe(_) => ErrorKind::Remote,
        }
    }

    /// Last snapshot observed before the wait stopped, if any.
    pub fn snapshot(&self) -> Option<&T> {
        match self {
            Self::Failure { snapshot, .. } | Self::UnexpectedState { snapshot, .. } => {
                Some(snapshot)
            }
            Self::Timeout { last, .. }
            | Self::UnrecognizedState { last, .. }
            | Self::Cancelled { last } => {
                last.as_ref().and_then(Probe::snapshot)
            }
            Self::NotFound { .. } | Self::Probe(_) => None,
        }
    }
}

/// Failure of a [`crate::RetryPolicy::run`] call.
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + Send + Sync + 'static> {
    /// Still failing with a retryable error after the budget and a final attempt.
    #[error("retry budget of {timeout:?} exhausted after {attempts} attempts")]
    Timeout {
        timeout: Duration,
        attempts: u32,
        #[source]
        last: E,
    },

    /// Non-retryable error, returned unchanged.
    #[error(transparent)]
    Fatal(E),

    #[error("retry cancelled")]
    Cancelled { last: Option<E> },
}

impl<E: std::error::Error + Send + Sync + 'static> RetryError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Fatal(_) => ErrorKind::Remote,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The underlying remote error, if an attempt was made.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Timeout { last, .. } | Self::Fatal(last) => Some(last),
            Self::Cancelled { last } => last,
        }
    }

    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Timeout { last, .. } | Self::Fatal(last) => Some(last),
            Self::Cancelled { last } => last.as_ref(),
        }
    }
}

/// Failure of a [`crate::AsyncAction`].
#[derive(Debug, Error)]
pub enum ActionError<S: Status, T: Snapshot> {
    #[error("starting action")]
    Mutate(#[source] anyhow::Error),

    #[error("action cancelled before the remote call completed")]
    Cancelled,

    #[error(transparent)]
    Wait(#[from] WaitError<S, T>),
}

impl<S: Status, T: Snapshot> ActionError<S, T> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Mutate(err) => error_kind(err).unwrap_or(ErrorKind::Remote),
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Wait(err) => err.kind(),
        }
    }
}

/// Remote status label the crate has no mapping for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} status '{label}'")]
pub struct UnrecognizedStatus {
    pub kind: &'static str,
    pub label: String,
}

/// Classifies an error returned by one of the [`crate::Client`] operations.
///
/// Walks the error chain looking for the typed wait & retry errors the client
/// produces. Returns `None` when none is found.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    macro_rules! kind_of {
        ($cause:expr; $($ty:ty),+ $(,)?) => {
            $(
                if let Some(e) = $cause.downcast_ref::<$ty>() {
                    return Some(e.kind());
                }
            )+
        };
    }

    for cause in err.chain() {
        kind_of!(cause;
            WaitError<TableStatus, TableDescription>,
            WaitError<IndexStatus, GlobalSecondaryIndexDescription>,
            WaitError<ReplicaStatus, ReplicaDescription>,
            WaitError<TimeToLiveStatus, TimeToLiveDescription>,
            WaitError<PointInTimeRecoveryStatus, ContinuousBackupsDescription>,
            WaitError<SseStatus, SseDescription>,
            WaitError<ImportStatus, ImportTableDescription>,
            WaitError<ContributorInsightsStatus, DescribeContributorInsightsOutput>,
            WaitError<DestinationStatus, KinesisDataStreamDestination>,
            WaitError<BackupStatus, BackupDescription>,
            RetryError<aws_sdk_dynamodb::Error>,
        );
    }
    None
}

fn states<S: fmt::Display>(states: &[S]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn last_label<S: fmt::Display, T>(last: &Option<Probe<S, T>>) -> String {
    last.as_ref().map(Probe::label).unwrap_or_default()
}
