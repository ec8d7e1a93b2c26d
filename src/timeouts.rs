use std::time::Duration;

const fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

pub(crate) const CREATE_TABLE_TIMEOUT: Duration = minutes(30);
pub(crate) const UPDATE_TABLE_TIMEOUT_TOTAL: Duration = minutes(60);
pub(crate) const DELETE_TABLE_TIMEOUT: Duration = minutes(10);
/// Retry budget for a single `UpdateTable` call.
pub(crate) const UPDATE_TABLE_TIMEOUT: Duration = minutes(20);
pub(crate) const REPLICA_UPDATE_TIMEOUT: Duration = minutes(30);
pub(crate) const UPDATE_CONTINUOUS_BACKUPS_TIMEOUT: Duration = minutes(20);
pub(crate) const TTL_UPDATE_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const PITR_UPDATE_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const KINESIS_DESTINATION_TIMEOUT: Duration = minutes(5);
pub(crate) const CONTRIBUTOR_INSIGHTS_TIMEOUT: Duration = minutes(5);
pub(crate) const REPLICA_DELAY: Duration = Duration::from_secs(30);
pub(crate) const SSE_UPDATE_DELAY: Duration = Duration::from_secs(30);

/// Per-operation deadlines used by [`crate::Client`].
///
/// Waits use the larger of the operation deadline & any minimum the
/// operation itself needs, eg TTL updates always get at least 30s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
    pub update_table: Duration,
    pub replica_update: Duration,
    pub continuous_backups_update: Duration,
    pub ttl_update: Duration,
    pub pitr_update: Duration,
    pub kinesis_destination: Duration,
    pub contributor_insights: Duration,
    /// Pause before the first probe of a replica wait.
    pub replica_delay: Duration,
    /// Pause before the first probe of a server side encryption wait.
    pub sse_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: CREATE_TABLE_TIMEOUT,
            update: UPDATE_TABLE_TIMEOUT_TOTAL,
            delete: DELETE_TABLE_TIMEOUT,
            update_table: UPDATE_TABLE_TIMEOUT,
            replica_update: REPLICA_UPDATE_TIMEOUT,
            continuous_backups_update: UPDATE_CONTINUOUS_BACKUPS_TIMEOUT,
            ttl_update: TTL_UPDATE_TIMEOUT,
            pitr_update: PITR_UPDATE_TIMEOUT,
            kinesis_destination: KINESIS_DESTINATION_TIMEOUT,
            contributor_insights: CONTRIBUTOR_INSIGHTS_TIMEOUT,
            replica_delay: REPLICA_DELAY,
            sse_delay: SSE_UPDATE_DELAY,
        }
    }
}
