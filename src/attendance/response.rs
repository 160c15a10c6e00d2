//! Normalisation of the attendance service's loosely shaped replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Attendance marked successfully!";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Outstanding fees reported with a successful mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFeeInfo {
    pub amount: f64,
    /// False when the service sent nothing usable.
    pub reported: bool,
}

impl PendingFeeInfo {
    pub fn reported(amount: f64) -> Self {
        if amount.is_finite() {
            Self {
                amount,
                reported: true,
            }
        } else {
            Self::default()
        }
    }

    pub fn has_outstanding(&self) -> bool {
        self.amount > 0.0
    }

    pub fn display_amount(&self) -> Option<f64> {
        self.reported.then_some(self.amount)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    #[serde(default)]
    pub total_scanned: u64,
    #[serde(default)]
    pub total_present: u64,
    #[serde(default)]
    pub total_absent: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceReply {
    pub message: Option<String>,
    pub pending_fees: PendingFeeInfo,
    pub stats: Option<AttendanceStats>,
}

impl MarkAttendanceReply {
    pub fn message_or_default(&self) -> &str {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
    }
}

/// The pending-fee field arrives as a bare number, a numeric string, or an
/// object carrying `pendingFees`. Anything else counts as zero.
pub fn normalize_pending_fees(value: Option<&Value>) -> PendingFeeInfo {
    match value {
        Some(Value::Number(number)) => number
            .as_f64()
            .map(PendingFeeInfo::reported)
            .unwrap_or_default(),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map(PendingFeeInfo::reported)
            .unwrap_or_default(),
        Some(Value::Object(map)) => normalize_pending_fees(map.get("pendingFees")),
        _ => PendingFeeInfo::default(),
    }
}

pub fn reply_from_response(response: ApiResponse) -> MarkAttendanceReply {
    let data = response.data.as_ref();
    let pending_fees = normalize_pending_fees(data.and_then(|d| d.get("pendingFees")));
    let stats = data
        .and_then(|d| d.get("stats"))
        .and_then(|stats| serde_json::from_value::<AttendanceStats>(stats.clone()).ok());

    MarkAttendanceReply {
        message: response.message,
        pending_fees,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> ApiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_pending_fee_shapes() {
        assert_eq!(
            normalize_pending_fees(Some(&json!(500))),
            PendingFeeInfo::reported(500.0)
        );
        assert_eq!(
            normalize_pending_fees(Some(&json!({"pendingFees": 1250.5, "dueDate": "2026-11-01"}))),
            PendingFeeInfo::reported(1250.5)
        );
        assert_eq!(
            normalize_pending_fees(Some(&json!(" 300 "))),
            PendingFeeInfo::reported(300.0)
        );
    }

    #[test]
    fn test_unusable_pending_fee_falls_back_to_zero() {
        for value in [json!(null), json!("soon"), json!([1, 2]), json!({"amount": 5})] {
            let info = normalize_pending_fees(Some(&value));
            assert_eq!(info.amount, 0.0);
            assert!(!info.reported);
        }
        assert_eq!(normalize_pending_fees(None), PendingFeeInfo::default());
    }

    #[test]
    fn test_reply_with_stats() {
        let reply = reply_from_response(response(json!({
            "message": "Attendance marked successfully!",
            "data": {"pendingFees": 0, "stats": {"totalScanned": 5, "totalPresent": 4, "totalAbsent": 1}}
        })));
        assert_eq!(reply.pending_fees, PendingFeeInfo::reported(0.0));
        assert!(!reply.pending_fees.has_outstanding());
        assert_eq!(
            reply.stats,
            Some(AttendanceStats {
                total_scanned: 5,
                total_present: 4,
                total_absent: 1
            })
        );
    }

    #[test]
    fn test_reply_without_data() {
        let reply = reply_from_response(response(json!({"message": "  "})));
        assert_eq!(reply.message_or_default(), DEFAULT_SUCCESS_MESSAGE);
        assert_eq!(reply.stats, None);
        assert_eq!(reply.pending_fees.display_amount(), None);
    }
}
