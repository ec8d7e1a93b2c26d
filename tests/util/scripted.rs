use async_trait::async_trait;
use dynamodb_reconcile::{Probe, Prober};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One canned probe response.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Found(&'static str),
    Absent,
    Fail(&'static str),
}

/// Prober replaying `steps` in order then repeating the last one.
///
/// The snapshot is the index of the probe call, so tests can tell which
/// observation a result came from.
#[derive(Debug)]
pub struct Scripted {
    steps: Vec<Step>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let steps: Vec<_> = steps.into_iter().collect();
        assert!(!steps.is_empty(), "script must have at least one step");
        Self {
            steps,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always reports `status`.
    pub fn constant(status: &'static str) -> Self {
        Self::new([Step::Found(status)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for Scripted {
    type Status = &'static str;
    type Snapshot = usize;

    async fn probe(&self) -> anyhow::Result<Probe<&'static str, usize>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps[n.min(self.steps.len() - 1)] {
            Step::Found(status) => Ok(Probe::found(status, n)),
            Step::Absent => Ok(Probe::Absent),
            Step::Fail(message) => Err(anyhow::anyhow!(message)),
        }
    }
}
