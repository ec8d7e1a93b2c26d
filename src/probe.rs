use async_trait::async_trait;
use std::{fmt, future::Future};

/// Marker for remote status values a [`crate::WaitSpec`] can partition.
pub trait Status: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> Status for T where T: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Marker for described remote objects carried alongside a status.
pub trait Snapshot: fmt::Debug + Send + Sync + 'static {}

impl<T> Snapshot for T where T: fmt::Debug + Send + Sync + 'static {}

/// One observation of a remote resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<S, T> {
    /// The describe call reported the resource as not found.
    Absent,
    /// The resource exists, `snapshot` is the full described object.
    Found { status: S, snapshot: T },
}

impl<S, T> Probe<S, T> {
    pub fn found(status: S, snapshot: T) -> Self {
        Self::Found { status, snapshot }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn status(&self) -> Option<&S> {
        match self {
            Self::Found { status, .. } => Some(status),
            Self::Absent => None,
        }
    }

    pub fn snapshot(&self) -> Option<&T> {
        match self {
            Self::Found { snapshot, .. } => Some(snapshot),
            Self::Absent => None,
        }
    }

    pub fn into_snapshot(self) -> Option<T> {
        match self {
            Self::Found { snapshot, .. } => Some(snapshot),
            Self::Absent => None,
        }
    }
}

impl<S: fmt::Display, T> Probe<S, T> {
    /// Status label for logs & progress messages, `"absent"` when not found.
    pub fn label(&self) -> String {
        match self {
            Self::Found { status, .. } => status.to_string(),
            Self::Absent => "absent".into(),
        }
    }
}

/// Fetches the current remote status of a single resource identity.
///
/// The identity is fixed when the prober is constructed and must not change
/// for the lifetime of a wait. Probing is a remote read and never mutates
/// remote state, so repeated probes without an intervening mutation observe
/// the same status.
///
/// "Not found" responses should be reported as [`Probe::Absent`], any other
/// remote failure is returned as an error without interpretation.
#[async_trait]
pub trait Prober: Send + Sync {
    type Status: Status;
    type Snapshot: Snapshot;

    async fn probe(&self) -> anyhow::Result<Probe<Self::Status, Self::Snapshot>>;
}

/// [`Prober`] backed by an async closure, see [`prober_fn`].
#[derive(Clone)]
pub struct FnProber<F>(F);

impl<F> fmt::Debug for FnProber<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnProber").finish()
    }
}

/// Wraps an async closure as a [`Prober`].
///
/// ```
/// use dynamodb_reconcile::{prober_fn, Probe};
///
/// let prober = prober_fn(|| async { anyhow::Ok(Probe::found("ACTIVE", ())) });
/// # drop(prober);
/// ```
pub fn prober_fn<F, Fut, S, T>(f: F) -> FnProber<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Probe<S, T>>> + Send,
{
    FnProber(f)
}

#[async_trait]
impl<F, Fut, S, T> Prober for FnProber<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Probe<S, T>>> + Send,
    S: Status,
    T: Snapshot,
{
    type Status = S;
    type Snapshot = T;

    async fn probe(&self) -> anyhow::Result<Probe<S, T>> {
        (self.0)().await
    }
}
