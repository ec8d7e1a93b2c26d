//! Reconciles dynamodb resources towards a desired state: issues mutations,
//! retrying transient errors, then blocks until the remote resource settles.
//!
//! # Example
//! ```
//! # async fn foo() -> anyhow::Result<()> {
//! # let dynamodb_client: aws_sdk_dynamodb::Client = unimplemented!();
//! use dynamodb_reconcile::{error_kind, ErrorKind, LogProgress};
//! use std::time::Duration;
//!
//! let client = dynamodb_reconcile::Client::builder()
//!     .create_timeout(Duration::from_secs(20 * 60))
//!     .build(dynamodb_client);
//!
//! // blocks until the table is ACTIVE
//! let table = client.wait_table_active("orders", Duration::from_secs(600)).await?;
//!
//! // progress is logged every 30s while the backup is created
//! let backup = client.create_backup("orders", None, &LogProgress).await?;
//!
//! // errors are classified without matching on messages
//! if let Err(err) = client.delete_table("orders").await {
//!     if error_kind(&err) == Some(ErrorKind::Timeout) {
//!         // try again later
//!     }
//! }
//! # Ok(()) }
//! ```

mod action;
mod backup;
mod builder;
mod client;
mod error;
mod ids;
mod insights;
mod kinesis;
mod probe;
mod replica;
mod retry;
mod status;
mod table;
mod timeouts;
mod wait;

pub use action::{AsyncAction, LogProgress, Phase, ProgressEvent, ProgressSink, DEFAULT_PROGRESS_INTERVAL};
pub use backup::BackupProber;
pub use builder::ClientBuilder;
pub use client::Client;
pub use error::{error_kind, ActionError, ErrorKind, RetryError, UnrecognizedStatus, WaitError};
pub use ids::{ContributorInsightsId, ReplicaId, StreamDestinationId};
pub use insights::ContributorInsightsProber;
pub use kinesis::KinesisDestinationProber;
pub use probe::{prober_fn, FnProber, Probe, Prober, Snapshot, Status};
pub use replica::ReplicaProber;
pub use retry::{RetryCondition, RetryPolicy, ServiceError};
pub use status::{
    BackupStatus, ContributorInsightsStatus, DestinationStatus, ImportStatus, IndexStatus,
    PointInTimeRecoveryStatus, ReplicaStatus, SseStatus, TableStatus, TimeToLiveStatus,
};
pub use table::{
    ImportProber, IndexProber, PointInTimeRecoveryProber, SseProber, TableProber,
    TimeToLiveProber,
};
pub use timeouts::Timeouts;
pub use wait::{Absent, Disposition, PollInterval, WaitSpec, DEFAULT_NOT_FOUND_CHECKS, MIN_POLL_INTERVAL};
