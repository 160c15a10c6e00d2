pub mod client;
pub mod response;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ScanError;

pub use client::HttpAttendanceService;
pub use response::{
    normalize_pending_fees, AttendanceStats, MarkAttendanceReply, PendingFeeInfo,
    DEFAULT_SUCCESS_MESSAGE,
};

/// Body of the mark-attendance call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    pub qr_code_data: String,
    pub staff_id: String,
}

impl MarkAttendanceRequest {
    pub fn new(subject_id: impl Into<String>, staff_id: impl Into<String>) -> Self {
        Self {
            qr_code_data: subject_id.into(),
            staff_id: staff_id.into(),
        }
    }
}

/// Remote attendance service. Rejections come back as the service-reported
/// `ScanError` kinds, transport trouble as `NetworkUnavailable`.
#[async_trait]
pub trait AttendanceService: Send + Sync {
    async fn mark_attendance(
        &self,
        request: &MarkAttendanceRequest,
    ) -> Result<MarkAttendanceReply, ScanError>;
}
