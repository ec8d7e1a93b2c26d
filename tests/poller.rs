mod util;

use anyhow::Context;
use dynamodb_reconcile::{
    error_kind, prober_fn, Absent, AsyncAction, ErrorKind, Phase, PollInterval, Probe,
    ProgressEvent, RetryCondition, RetryError, RetryPolicy, ServiceError, TableStatus, WaitError,
    WaitSpec,
};
use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use util::scripted::{Scripted, Step};

fn every_second(timeout: Duration) -> WaitSpec<&'static str> {
    WaitSpec::new(timeout)
        .pending(["CREATING"])
        .target(["ACTIVE"])
        .poll(PollInterval::Fixed(Duration::from_secs(1)))
}

#[tokio::test(start_paused = true)]
async fn creating_creating_active() {
    let prober = Scripted::new([
        Step::Found("CREATING"),
        Step::Found("CREATING"),
        Step::Found("ACTIVE"),
    ]);
    let start = Instant::now();

    let done = every_second(Duration::from_secs(5))
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(done, Probe::found("ACTIVE", 2));
    assert_eq!(prober.calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn creating_deleted_is_a_failure_state() {
    let prober = Scripted::new([Step::Found("CREATING"), Step::Found("DELETED")]);

    let err = every_second(Duration::from_secs(10))
        .failure(["DELETED"])
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, WaitError::Failure { status: "DELETED", ref snapshot } if **snapshot == 1),
        "{err:?}"
    );
    assert_eq!(err.kind(), ErrorKind::FailureState);
}

#[tokio::test(start_paused = true)]
async fn target_first_poll_never_sleeps() {
    let prober = Scripted::constant("ACTIVE");
    let start = Instant::now();

    every_second(Duration::from_secs(3600))
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(prober.calls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn failure_wins_over_any_timeout() {
    for timeout in [Duration::from_millis(1), Duration::from_secs(60 * 60 * 24)] {
        let err = every_second(timeout)
            .failure(["DELETED"])
            .wait_for_state(&Scripted::constant("DELETED"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailureState, "{timeout:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn pending_times_out_at_deadline_not_before() {
    let prober = Scripted::constant("CREATING");
    let start = Instant::now();

    let err = every_second(Duration::from_millis(4500))
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(start.elapsed(), Duration::from_millis(4500));
    // the last observation is kept for diagnostics
    assert_eq!(err.snapshot(), Some(&5));
}

#[tokio::test(start_paused = true)]
async fn deleted_wait_treats_absent_as_target() {
    let prober = Scripted::new([Step::Found("DELETING"), Step::Absent]);

    let done = WaitSpec::new(Duration::from_secs(60))
        .pending(["ACTIVE", "DELETING"])
        .absent(Absent::Target)
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap();

    assert!(done.is_absent());
}

#[tokio::test(start_paused = true)]
async fn create_wait_gives_up_on_persistent_absence() {
    let prober = Scripted::new([Step::Absent]);

    let err = every_second(Duration::from_secs(600))
        .absent(Absent::Tolerate(3))
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Absent);
    assert_eq!(prober.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn cancellation_observed_within_one_interval() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });
    let start = Instant::now();

    let err = WaitSpec::new(Duration::from_secs(600))
        .pending(["CREATING"])
        .target(["ACTIVE"])
        .poll(PollInterval::Fixed(Duration::from_secs(30)))
        .wait_for_state(&Scripted::constant("CREATING"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(start.elapsed(), Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn probe_errors_are_not_interpreted() {
    let prober = Scripted::new([Step::Found("CREATING"), Step::Fail("AccessDeniedException")]);

    let err = every_second(Duration::from_secs(60))
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(format!("{:#}", anyhow::Error::new(err)).contains("AccessDeniedException"));
}

#[tokio::test(start_paused = true)]
async fn unmapped_remote_status_is_unexpected_state() {
    let prober = prober_fn(|| async {
        let status: TableStatus = "REPLICATION_PAUSED".parse()?;
        anyhow::Ok(Probe::found(status, ()))
    });

    let err = WaitSpec::new(Duration::from_secs(60))
        .pending([TableStatus::Creating])
        .target([TableStatus::Active])
        .wait_for_state(&prober, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnexpectedState);
    assert!(
        format!("{:#}", anyhow::Error::new(err)).contains("REPLICATION_PAUSED"),
        "label kept for diagnostics"
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_probes_are_stable() {
    let prober = Scripted::constant("ACTIVE");
    for _ in 0..3 {
        let observed = dynamodb_reconcile::Prober::probe(&prober).await.unwrap();
        assert_eq!(observed.status(), Some(&"ACTIVE"));
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{code}")]
struct Remote {
    code: &'static str,
}

impl ServiceError for Remote {
    fn code(&self) -> Option<&str> {
        Some(self.code)
    }

    fn message(&self) -> Option<&str> {
        None
    }
}

const CONFLICT: &[RetryCondition] = &[RetryCondition::Code("ResourceInUseException")];

#[tokio::test(start_paused = true)]
async fn retried_n_times_then_succeeds() {
    const N: u32 = 4;
    let calls = &AtomicU32::new(0);

    let out = RetryPolicy::new(CONFLICT)
        .with_poll(PollInterval::Fixed(Duration::from_secs(2)))
        .run(Duration::from_secs(60), &CancellationToken::new(), move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                n if n < N => Err(Remote {
                    code: "ResourceInUseException",
                }),
                _ => Ok("updated"),
            }
        })
        .await
        .unwrap();

    assert_eq!(out, "updated");
    assert_eq!(calls.load(Ordering::SeqCst), N + 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retry_budget_is_a_timeout() {
    let calls = &AtomicU32::new(0);

    let err = RetryPolicy::new(&[RetryCondition::Code("ThrottlingException")])
        .with_poll(PollInterval::Fixed(Duration::from_secs(1)))
        .run(Duration::from_secs(3), &CancellationToken::new(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Remote {
                code: "ThrottlingException",
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, RetryError::Timeout { .. }), "{err:?}");
    assert_eq!(err.inner().map(|e| e.code), Some("ThrottlingException"));
}

#[tokio::test(start_paused = true)]
async fn non_retryable_invoked_once() {
    let calls = &AtomicU32::new(0);

    let err = RetryPolicy::new(CONFLICT)
        .run(Duration::from_secs(60), &CancellationToken::new(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Remote {
                code: "ValidationException",
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(err.inner().map(|e| e.code), Some("ValidationException"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn backup_action_reports_progress_twice_in_65s() {
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(8);
    let mut script = vec![Step::Found("CREATING"); 13];
    script.push(Step::Found("AVAILABLE"));

    // polls every 5s, so AVAILABLE is first seen at 65s
    let spec = WaitSpec::new(Duration::from_secs(600))
        .pending(["CREATING"])
        .target(["AVAILABLE"])
        .failure(["DELETED"])
        .poll(PollInterval::Fixed(Duration::from_secs(5)));

    let (_, done) = AsyncAction::new("backup (nightly) of table (orders)")
        .run(
            async { anyhow::Ok("arn:aws:dynamodb:eu-west-1:123456789012:table/orders/backup/1") },
            |_| Scripted::new(script),
            &spec,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(tx);

    let mut events = vec![];
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(done.status(), Some(&"AVAILABLE"));
    let phases: Vec<_> = events.iter().map(|e| e.phase).collect();
    assert_eq!(phases, [Phase::Waiting, Phase::Waiting, Phase::Done]);
    assert_eq!(events[2].elapsed, Duration::from_secs(65));
}

#[tokio::test(start_paused = true)]
async fn kinds_survive_context() {
    let err = every_second(Duration::from_secs(3))
        .wait_for_state(&Scripted::constant("CREATING"), &CancellationToken::new())
        .await
        .context("waiting for table (orders) to be active")
        .unwrap_err();

    // scripted statuses aren't dynamodb statuses, so only the typed error knows
    assert_eq!(error_kind(&err), None);
    let wait = err
        .downcast_ref::<WaitError<&'static str, usize>>()
        .unwrap();
    assert_eq!(wait.kind(), ErrorKind::Timeout);
}
