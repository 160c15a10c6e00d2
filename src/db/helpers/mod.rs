use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::{EntryStatus, ScanSessionStatus};

pub fn to_usize(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("row count {value} out of range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_entry_status(value: &str) -> Result<EntryStatus> {
    match value {
        "Present" => Ok(EntryStatus::Present),
        "Failed" => Ok(EntryStatus::Failed),
        other => Err(anyhow!("unknown entry status {other}")),
    }
}

pub fn parse_session_status(value: &str) -> Result<ScanSessionStatus> {
    match value {
        "Open" => Ok(ScanSessionStatus::Open),
        "Closed" => Ok(ScanSessionStatus::Closed),
        "Interrupted" => Ok(ScanSessionStatus::Interrupted),
        other => Err(anyhow!("unknown scan session status {other}")),
    }
}
