use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanSessionStatus {
    Open,
    Closed,
    Interrupted,
}

impl ScanSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSessionStatus::Open => "Open",
            ScanSessionStatus::Closed => "Closed",
            ScanSessionStatus::Interrupted => "Interrupted",
        }
    }
}

/// Audit row for one opened scanner view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSessionRecord {
    pub id: String,
    pub operator_id: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: ScanSessionStatus,
}
