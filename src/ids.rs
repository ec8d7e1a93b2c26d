//! Identity strings persisted by the host between invocations.
use anyhow::{bail, ensure, Context};
use std::{fmt, str::FromStr};

/// Contributor insights of a table, or of one of its global secondary indexes.
///
/// Encoded `name:<table>` or `name:<table>/index:<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContributorInsightsId {
    pub table_name: String,
    pub index_name: Option<String>,
}

impl ContributorInsightsId {
    pub fn new(table_name: impl Into<String>, index_name: Option<String>) -> Self {
        Self {
            table_name: table_name.into(),
            index_name,
        }
    }
}

impl fmt::Display for ContributorInsightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name:{}", self.table_name)?;
        if let Some(index) = &self.index_name {
            write!(f, "/index:{index}")?;
        }
        Ok(())
    }
}

impl FromStr for ContributorInsightsId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let rest = s
            .strip_prefix("name:")
            .with_context(|| format!("unexpected format of ID ({s}), expected name:TABLE[/index:INDEX]"))?;
        let (table, index) = match rest.split_once("/index:") {
            Some((table, index)) => (table, Some(index)),
            None => (rest, None),
        };
        ensure!(!table.is_empty(), "empty table name in ID ({s})");
        if index.is_some_and(str::is_empty) {
            bail!("empty index name in ID ({s})");
        }
        Ok(Self::new(table, index.map(str::to_owned)))
    }
}

/// Kinesis streaming destination of a table, encoded `<table>,<stream_arn>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamDestinationId {
    pub table_name: String,
    pub stream_arn: String,
}

impl StreamDestinationId {
    pub fn new(table_name: impl Into<String>, stream_arn: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            stream_arn: stream_arn.into(),
        }
    }
}

impl fmt::Display for StreamDestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.table_name, self.stream_arn)
    }
}

impl FromStr for StreamDestinationId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.split_once(',') {
            Some((table, arn)) if !table.is_empty() && !arn.is_empty() && !arn.contains(',') => {
                Ok(Self::new(table, arn))
            }
            _ => bail!("unexpected format of ID ({s}), expected TABLE_NAME,STREAM_ARN"),
        }
    }
}

/// Replica of a global table, encoded `<table>:<main_region>`.
///
/// `main_region` is the region the replica set is managed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicaId {
    pub table_name: String,
    pub main_region: String,
}

impl ReplicaId {
    pub fn new(table_name: impl Into<String>, main_region: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            main_region: main_region.into(),
        }
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_name, self.main_region)
    }
}

impl FromStr for ReplicaId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.split_once(':') {
            Some((table, region)) if !table.is_empty() && !region.is_empty() && !region.contains(':') => {
                Ok(Self::new(table, region))
            }
            _ => bail!("unexpected format of ID ({s}), expected TABLE_NAME:MAIN_REGION"),
        }
    }
}
