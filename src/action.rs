use crate::{
    error::ActionError,
    probe::{Probe, Prober},
    wait::WaitSpec,
};
use async_trait::async_trait;
use std::{fmt, future::Future, time::Duration};
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default cadence of [`ProgressEvent`]s during a long wait.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Lifecycle of an [`AsyncAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Mutating,
    Waiting,
    Done,
    Failed,
}

/// Point-in-time progress of a long running action.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    /// Last observed remote status label.
    pub status: Option<String>,
    /// Time since the wait started.
    pub elapsed: Duration,
    pub at: OffsetDateTime,
}

impl ProgressEvent {
    fn new(phase: Phase, message: String, status: Option<String>, elapsed: Duration) -> Self {
        Self {
            phase,
            message,
            status,
            elapsed,
            at: OffsetDateTime::now_utc(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = &self.status {
            write!(f, " (status: {status})")?;
        }
        Ok(())
    }
}

/// Receives [`ProgressEvent`]s in order.
///
/// `send` is awaited before the action continues, so at most one event is
/// ever in flight.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, event: ProgressEvent);
}

/// Discards events.
#[async_trait]
impl ProgressSink for () {
    async fn send(&self, _: ProgressEvent) {}
}

/// Forwards events to a channel, a closed receiver is ignored.
#[async_trait]
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    async fn send(&self, event: ProgressEvent) {
        let _ = mpsc::Sender::send(self, event).await;
    }
}

/// Logs events with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn send(&self, event: ProgressEvent) {
        match event.phase {
            Phase::Failed => warn!(elapsed = ?event.elapsed, "{event}"),
            _ => info!(elapsed = ?event.elapsed, "{event}"),
        }
    }
}

/// One-shot operation whose remote effect completes asynchronously.
///
/// Issues the mutation then polls until a stable state, emitting a
/// [`ProgressEvent`] every `progress_interval` while waiting regardless of how
/// slowly the wait itself polls.
#[derive(Debug, Clone)]
pub struct AsyncAction {
    description: String,
    progress_interval: Duration,
}

impl AsyncAction {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Sets the cadence of progress events while waiting.
    ///
    /// Default `30s`.
    ///
    /// # Panics
    /// Panics if zero.
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        assert!(interval > Duration::ZERO, "must be greater than zero");
        self.progress_interval = interval;
        self
    }

    /// Runs `mutate`, then waits on the prober built from its output.
    ///
    /// Returns the mutation output along with the final observation.
    #[instrument(skip_all, fields(action = %self.description))]
    pub async fn run<R, M, P, B>(
        &self,
        mutate: M,
        prober: B,
        spec: &WaitSpec<P::Status>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(R, Probe<P::Status, P::Snapshot>), ActionError<P::Status, P::Snapshot>>
    where
        M: Future<Output = anyhow::Result<R>>,
        B: FnOnce(&R) -> P,
        P: Prober,
    {
        let mut phase = Phase::Idle;
        let transition = |phase: &mut Phase, next: Phase| {
            tracing::debug!(from = ?*phase, to = ?next, "action phase");
            *phase = next;
        };

        transition(&mut phase, Phase::Mutating);
        let mutated = tokio::select! {
            out = mutate => out,
            _ = cancel.cancelled() => return Err(ActionError::Cancelled),
        };
        let mutated = match mutated {
            Ok(out) => out,
            Err(err) => {
                transition(&mut phase, Phase::Failed);
                return Err(ActionError::Mutate(err));
            }
        };

        transition(&mut phase, Phase::Waiting);
        let (last_status, status) = watch::channel(None);
        let prober = Observed {
            inner: prober(&mutated),
            last_status,
        };
        let wait = spec.wait_for_state(&prober, cancel);
        tokio::pin!(wait);

        let start = Instant::now();
        let mut ticker =
            tokio::time::interval_at(start + self.progress_interval, self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut wait => break result,
                _ = ticker.tick() => {
                    let status = status.borrow().clone();
                    let message = format!("{} still in progress", self.description);
                    progress
                        .send(ProgressEvent::new(phase, message, status, start.elapsed()))
                        .await;
                }
            }
        };

        match result {
            Ok(done) => {
                transition(&mut phase, Phase::Done);
                let message = format!("{} complete", self.description);
                let event = ProgressEvent::new(phase, message, Some(done.label()), start.elapsed());
                progress.send(event).await;
                Ok((mutated, done))
            }
            Err(err) => {
                transition(&mut phase, Phase::Failed);
                let message = format!("{} failed: {err}", self.description);
                let status = status.borrow().clone();
                progress
                    .send(ProgressEvent::new(phase, message, status, start.elapsed()))
                    .await;
                Err(err.into())
            }
        }
    }
}

/// Records the label of every observation for progress events.
struct Observed<P> {
    inner: P,
    last_status: watch::Sender<Option<String>>,
}

#[async_trait]
impl<P: Prober> Prober for Observed<P> {
    type Status = P::Status;
    type Snapshot = P::Snapshot;

    async fn probe(&self) -> anyhow::Result<Probe<P::Status, P::Snapshot>> {
        let observed = self.inner.probe().await?;
        self.last_status.send_replace(Some(observed.label()));
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, probe::prober_fn, wait::PollInterval};

    fn creating_until(ready_after: Duration) -> impl Prober<Status = &'static str, Snapshot = ()> {
        let start = Instant::now();
        prober_fn(move || {
            let status = if start.elapsed() >= ready_after {
                "AVAILABLE"
            } else {
                "CREATING"
            };
            async move { anyhow::Ok(Probe::found(status, ())) }
        })
    }

    fn available(timeout: Duration) -> WaitSpec<&'static str> {
        WaitSpec::new(timeout)
            .pending(["CREATING"])
            .target(["AVAILABLE"])
            .failure(["DELETED"])
            .poll(PollInterval::Fixed(Duration::from_secs(5)))
    }

    async fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = vec![];
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn progress_every_interval() {
        let (tx, rx) = mpsc::channel(16);

        let (arn, done) = AsyncAction::new("creating backup")
            .run(
                async { anyhow::Ok("arn:backup") },
                |_| creating_until(Duration::from_secs(65)),
                &available(Duration::from_secs(600)),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        drop(tx);
        let events = drain(rx).await;

        assert_eq!(arn, "arn:backup");
        assert_eq!(done.status(), Some(&"AVAILABLE"));
        let phases: Vec<_> = events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, [Phase::Waiting, Phase::Waiting, Phase::Done]);
        assert_eq!(events[0].elapsed, Duration::from_secs(30));
        assert_eq!(events[0].status.as_deref(), Some("CREATING"));
        assert_eq!(events[1].elapsed, Duration::from_secs(60));
        assert_eq!(events[2].status.as_deref(), Some("AVAILABLE"));
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_failure() {
        let (tx, rx) = mpsc::channel(16);

        let err = AsyncAction::new("creating backup")
            .run(
                async { Err::<(), _>(anyhow::anyhow!("TableNotFoundException")) },
                |_| creating_until(Duration::ZERO),
                &available(Duration::from_secs(600)),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        drop(tx);

        assert!(matches!(err, ActionError::Mutate(_)), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_failure_and_unexpected_are_distinct() {
        let cases: [(&'static str, ErrorKind); 3] = [
            ("CREATING", ErrorKind::Timeout),
            ("DELETED", ErrorKind::FailureState),
            ("MELTING", ErrorKind::UnexpectedState),
        ];
        for (status, kind) in cases {
            let prober = move |_: &()| prober_fn(move || async move { anyhow::Ok(Probe::found(status, ())) });

            let err = AsyncAction::new("creating backup")
                .run(
                    async { anyhow::Ok(()) },
                    prober,
                    &available(Duration::from_secs(60)),
                    &LogProgress,
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), kind, "{status}: {err:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_event_is_last() {
        let (tx, rx) = mpsc::channel(16);

        AsyncAction::new("creating backup")
            .progress_interval(Duration::from_secs(10))
            .run(
                async { anyhow::Ok(()) },
                |_| prober_fn(|| async { anyhow::Ok(Probe::found("CREATING", ())) }),
                &available(Duration::from_secs(25)),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        drop(tx);
        let events = drain(rx).await;

        let phases: Vec<_> = events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, [Phase::Waiting, Phase::Waiting, Phase::Failed]);
        assert!(events[2].message.contains("timeout"), "{}", events[2]);
    }
}
