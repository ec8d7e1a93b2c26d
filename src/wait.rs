use crate::{
    error::{UnrecognizedStatus, WaitError},
    probe::{Probe, Prober, Status},
};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Minimum pause between two consecutive probes (or retried attempts).
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive "not found" probes tolerated by default while waiting for a
/// resource to appear.
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Pause between probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    Fixed(Duration),
    /// Doubles after every probe, starting at `initial`, capped at `max`.
    Backoff { initial: Duration, max: Duration },
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::Backoff {
            initial: MIN_POLL_INTERVAL,
            max: Duration::from_secs(10),
        }
    }
}

impl PollInterval {
    pub(crate) fn delays(self) -> Delays {
        match self {
            Self::Fixed(every) => Delays {
                next: every,
                max: every,
            },
            Self::Backoff { initial, max } => Delays { next: initial, max },
        }
    }
}

/// Infinite sequence of poll delays, never shorter than [`MIN_POLL_INTERVAL`].
#[derive(Debug)]
pub(crate) struct Delays {
    next: Duration,
    max: Duration,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next.max(MIN_POLL_INTERVAL);
        self.next = self.next.saturating_mul(2).min(self.max);
        Some(delay)
    }
}

/// How a [`Probe::Absent`] observation is treated by a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absent {
    /// Absence is the goal, eg waiting for a deletion.
    Target,
    /// Keep polling.
    Pending,
    /// Stop immediately with [`WaitError::NotFound`].
    Failure,
    /// Keep polling for up to this many consecutive absent probes then stop
    /// with [`WaitError::NotFound`]. Covers eventual consistency right after
    /// a create.
    Tolerate(u32),
}

/// Where an observed status falls relative to a [`WaitSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Pending,
    Target,
    Failure,
    Unexpected,
}

/// Describes a blocking poll-until-condition operation.
///
/// ```
/// use dynamodb_reconcile::{Absent, PollInterval, WaitSpec};
/// use std::time::Duration;
///
/// let deleted = WaitSpec::new(Duration::from_secs(600))
///     .pending(["ACTIVE", "DELETING"])
///     .absent(Absent::Target)
///     .poll(PollInterval::Fixed(Duration::from_secs(5)));
/// # drop(deleted);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec<S> {
    pending: Vec<S>,
    target: Vec<S>,
    failure: Vec<S>,
    absent: Absent,
    timeout: Duration,
    delay: Duration,
    poll: PollInterval,
    target_occurrences: u32,
}

impl<S> WaitSpec<S> {
    /// A wait with empty state sets, absence tolerated for
    /// [`DEFAULT_NOT_FOUND_CHECKS`] probes and the default backoff.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: vec![],
            target: vec![],
            failure: vec![],
            absent: Absent::Tolerate(DEFAULT_NOT_FOUND_CHECKS),
            timeout,
            delay: Duration::ZERO,
            poll: PollInterval::default(),
            target_occurrences: 1,
        }
    }

    pub fn pending(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.pending = states.into_iter().collect();
        self
    }

    pub fn target(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.target = states.into_iter().collect();
        self
    }

    pub fn failure(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.failure = states.into_iter().collect();
        self
    }

    pub fn absent(mut self, absent: Absent) -> Self {
        self.absent = absent;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets a pause before the first probe.
    ///
    /// Default none.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll(mut self, poll: PollInterval) -> Self {
        self.poll = poll;
        self
    }

    /// Sets how many consecutive target observations are required before the
    /// wait succeeds.
    ///
    /// Default `1`.
    ///
    /// # Panics
    /// Panics if zero.
    pub fn target_occurrences(mut self, occurrences: u32) -> Self {
        assert!(occurrences > 0, "must be at least 1");
        self.target_occurrences = occurrences;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn targets(&self) -> &[S] {
        &self.target
    }
}

impl<S: Status> WaitSpec<S> {
    pub fn classify(&self, status: &S) -> Disposition {
        if self.target.contains(status) {
            Disposition::Target
        } else if self.failure.contains(status) {
            Disposition::Failure
        } else if self.pending.contains(status) {
            Disposition::Pending
        } else {
            Disposition::Unexpected
        }
    }

    /// Polls `prober` until the status enters the target set, the failure set,
    /// leaves every declared set, or the timeout elapses.
    ///
    /// Returns the final observation, which is [`Probe::Absent`] only when
    /// absence is the target.
    ///
    /// `cancel` is observed before every probe and during every pause, a
    /// cancelled wait stops with [`WaitError::Cancelled`].
    pub async fn wait_for_state<P>(
        &self,
        prober: &P,
        cancel: &CancellationToken,
    ) -> Result<Probe<S, P::Snapshot>, WaitError<S, P::Snapshot>>
    where
        P: Prober<Status = S> + ?Sized,
    {
        let start = Instant::now();
        let mut delays = self.poll.delays();
        let mut last: Option<Probe<S, P::Snapshot>> = None;
        let mut absent_checks = 0;
        let mut target_streak = 0;
        let mut attempt = 0u32;

        if !self.delay.is_zero() && !pause(self.delay.min(self.timeout), cancel).await {
            return Err(WaitError::Cancelled { last });
        }

        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled { last });
            }
            attempt += 1;

            let observed = match prober.probe().await {
                Ok(observed) => observed,
                Err(err) => {
                    let unrecognized = err
                        .chain()
                        .find_map(|cause| cause.downcast_ref::<UnrecognizedStatus>())
                        .cloned();
                    return Err(match unrecognized {
                        Some(unrecognized) => WaitError::UnrecognizedState {
                            unrecognized,
                            expected: self.target.clone(),
                            last,
                        },
                        None => WaitError::Probe(err),
                    })
                }
            };
            let disposition = match &observed {
                Probe::Absent => {
                    absent_checks += 1;
                    match self.absent {
                        Absent::Target => Disposition::Target,
                        Absent::Pending => Disposition::Pending,
                        Absent::Failure => Disposition::Failure,
                        Absent::Tolerate(checks) if absent_checks > checks => {
                            Disposition::Failure
                        }
                        Absent::Tolerate(_) => Disposition::Pending,
                    }
                }
                Probe::Found { status, .. } => {
                    absent_checks = 0;
                    self.classify(status)
                }
            };
            debug!(attempt, status = %observed.label(), ?disposition, "polled remote status");

            match disposition {
                Disposition::Target => {
                    target_streak += 1;
                    if target_streak >= self.target_occurrences {
                        return Ok(observed);
                    }
                }
                Disposition::Pending => target_streak = 0,
                Disposition::Failure => {
                    return Err(match observed {
                        Probe::Found { status, snapshot } => WaitError::Failure {
                            status,
                            snapshot: Box::new(snapshot),
                        },
                        Probe::Absent => WaitError::NotFound {
                            checks: absent_checks,
                        },
                    })
                }
                Disposition::Unexpected => {
                    return Err(match observed {
                        Probe::Found { status, snapshot } => WaitError::UnexpectedState {
                            status,
                            expected: self.target.clone(),
                            snapshot: Box::new(snapshot),
                        },
                        Probe::Absent => WaitError::NotFound {
                            checks: absent_checks,
                        },
                    })
                }
            }
            last = Some(observed);

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(WaitError::Timeout {
                    timeout: self.timeout,
                    expected: self.target.clone(),
                    last,
                });
            }

            let delay = delays.next().unwrap_or(MIN_POLL_INTERVAL);
            if !pause(delay.min(self.timeout - elapsed), cancel).await {
                return Err(WaitError::Cancelled { last });
            }
        }
    }
}

/// Sleeps for `duration` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
