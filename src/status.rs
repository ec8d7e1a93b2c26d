//! Closed status enumerations for each remote resource type.
//!
//! Remote status strings are only ever parsed here, at the probe boundary.
use crate::error::UnrecognizedStatus;
use std::{fmt, str::FromStr};

macro_rules! remote_status {
    (
        $(#[$meta:meta])*
        $name:ident: $kind:literal {
            $($variant:ident => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnrecognizedStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    other => Err(UnrecognizedStatus {
                        kind: $kind,
                        label: other.to_owned(),
                    }),
                }
            }
        }
    };
}

remote_status! {
    /// Status of a table.
    TableStatus: "table" {
        Creating => "CREATING",
        Updating => "UPDATING",
        Deleting => "DELETING",
        Active => "ACTIVE",
        InaccessibleEncryptionCredentials => "INACCESSIBLE_ENCRYPTION_CREDENTIALS",
        Archiving => "ARCHIVING",
        Archived => "ARCHIVED",
        ReplicationNotAuthorized => "REPLICATION_NOT_AUTHORIZED",
    }
}

remote_status! {
    /// Status of a global secondary index.
    IndexStatus: "index" {
        Creating => "CREATING",
        Updating => "UPDATING",
        Deleting => "DELETING",
        Active => "ACTIVE",
    }
}

remote_status! {
    /// Status of a global table replica.
    ReplicaStatus: "replica" {
        Creating => "CREATING",
        CreationFailed => "CREATION_FAILED",
        Updating => "UPDATING",
        Deleting => "DELETING",
        Active => "ACTIVE",
        RegionDisabled => "REGION_DISABLED",
        InaccessibleEncryptionCredentials => "INACCESSIBLE_ENCRYPTION_CREDENTIALS",
        Archiving => "ARCHIVING",
        Archived => "ARCHIVED",
        ReplicationNotAuthorized => "REPLICATION_NOT_AUTHORIZED",
    }
}

remote_status! {
    TimeToLiveStatus: "time to live" {
        Enabling => "ENABLING",
        Disabling => "DISABLING",
        Enabled => "ENABLED",
        Disabled => "DISABLED",
    }
}

remote_status! {
    PointInTimeRecoveryStatus: "point in time recovery" {
        Enabled => "ENABLED",
        Disabled => "DISABLED",
    }
}

remote_status! {
    /// Server side encryption status.
    SseStatus: "server side encryption" {
        Enabling => "ENABLING",
        Enabled => "ENABLED",
        Disabling => "DISABLING",
        Disabled => "DISABLED",
        Updating => "UPDATING",
    }
}

remote_status! {
    ContributorInsightsStatus: "contributor insights" {
        Enabling => "ENABLING",
        Enabled => "ENABLED",
        Disabling => "DISABLING",
        Disabled => "DISABLED",
        Failed => "FAILED",
    }
}

remote_status! {
    /// Status of a Kinesis streaming destination.
    DestinationStatus: "kinesis streaming destination" {
        Enabling => "ENABLING",
        Active => "ACTIVE",
        Disabling => "DISABLING",
        Disabled => "DISABLED",
        EnableFailed => "ENABLE_FAILED",
        Updating => "UPDATING",
    }
}

remote_status! {
    BackupStatus: "backup" {
        Creating => "CREATING",
        Available => "AVAILABLE",
        Deleted => "DELETED",
    }
}

remote_status! {
    ImportStatus: "import" {
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Cancelling => "CANCELLING",
        Cancelled => "CANCELLED",
        Failed => "FAILED",
    }
}

/// Parses a remote status label, `None` meaning the describe call omitted it.
pub(crate) fn parse<S>(label: Option<&str>, kind: &'static str) -> anyhow::Result<S>
where
    S: FromStr<Err = UnrecognizedStatus>,
{
    let label = label.ok_or_else(|| anyhow::anyhow!("no {kind} status in description"))?;
    Ok(label.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_labels() {
        assert_eq!("ACTIVE".parse::<TableStatus>(), Ok(TableStatus::Active));
        assert_eq!(
            "ENABLE_FAILED".parse::<DestinationStatus>(),
            Ok(DestinationStatus::EnableFailed)
        );
        assert_eq!(
            "INACCESSIBLE_ENCRYPTION_CREDENTIALS".parse::<ReplicaStatus>(),
            Ok(ReplicaStatus::InaccessibleEncryptionCredentials)
        );
        assert_eq!(ImportStatus::InProgress.to_string(), "IN_PROGRESS");
    }

    #[test]
    fn unknown_label_is_an_error() {
        let err = "MELTING".parse::<BackupStatus>().unwrap_err();
        assert_eq!(
            err,
            UnrecognizedStatus {
                kind: "backup",
                label: "MELTING".into()
            }
        );
        assert_eq!(err.to_string(), "unrecognized backup status 'MELTING'");
    }

    #[test]
    fn missing_label() {
        let err = parse::<IndexStatus>(None, "index").unwrap_err();
        assert!(err.to_string().contains("no index status"), "{err}");
    }
}
