use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::upload::UploadStatus;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Splits a status into its `(upload_status, remote_id, failure_reason)` columns.
pub fn status_columns(status: &UploadStatus) -> (&'static str, Option<&str>, Option<&str>) {
    match status {
        UploadStatus::Succeeded { remote_id } => (status.as_str(), Some(remote_id.as_str()), None),
        UploadStatus::Failed { reason } => (status.as_str(), None, Some(reason.as_str())),
        _ => (status.as_str(), None, None),
    }
}

pub fn parse_status(
    value: &str,
    remote_id: Option<String>,
    failure_reason: Option<String>,
) -> Result<UploadStatus> {
    match value {
        "queued" => Ok(UploadStatus::Queued),
        "in_flight" => Ok(UploadStatus::InFlight),
        "succeeded" => Ok(UploadStatus::Succeeded {
            remote_id: remote_id.unwrap_or_default(),
        }),
        "failed" => Ok(UploadStatus::Failed {
            reason: failure_reason.unwrap_or_else(|| "unknown error".to_string()),
        }),
        other => Err(anyhow!("unknown upload status {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_columns_round_trip() {
        let failed = UploadStatus::Failed {
            reason: "timeout".into(),
        };
        let (name, remote, reason) = status_columns(&failed);
        assert_eq!(
            parse_status(name, remote.map(str::to_string), reason.map(str::to_string)).unwrap(),
            failed
        );
        assert!(parse_status("exploded", None, None).is_err());
    }

    #[test]
    fn test_integer_conversions() {
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_u64(-1, "attempts").is_err());
        assert_eq!(to_u64(7, "attempts").unwrap(), 7);
    }
}
