use serde::Serialize;
use thiserror::Error;

pub const NETWORK_FAILURE_MESSAGE: &str =
    "Network error. Please check your connection and try again.";

/// Failures the scanner reports to the operator.
///
/// "No code in this frame" never becomes a `ScanError`; the decode loop
/// absorbs it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ScanError {
    #[error("camera permission denied: {0}")]
    CameraPermissionDenied(String),

    #[error("no camera found: {0}")]
    NoCameraFound(String),

    #[error("camera is held by another session: {0}")]
    DeviceBusy(String),

    #[error("invalid QR format")]
    InvalidQrFormat,

    #[error("operator identity not found")]
    OperatorNotAuthenticated,

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("already marked: {0}")]
    AlreadyMarked(String),

    #[error("service rejected submission: {0}")]
    ServiceRejected(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("unexpected decoder failure: {0}")]
    UnexpectedDriverFailure(String),
}

impl ScanError {
    /// Classify a business-level rejection from the attendance service.
    /// The message is kept verbatim for display.
    pub fn from_service_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("already") {
            ScanError::AlreadyMarked(message)
        } else if lowered.contains("not found") || lowered.contains("invalid") {
            ScanError::SubjectNotFound(message)
        } else {
            ScanError::ServiceRejected(message)
        }
    }

    /// True when the camera itself has to be re-acquired by an explicit
    /// operator retry; the decode loop cannot simply be restarted.
    pub fn requires_device_retry(&self) -> bool {
        matches!(
            self,
            ScanError::CameraPermissionDenied(_)
                | ScanError::NoCameraFound(_)
                | ScanError::DeviceBusy(_)
        )
    }

    /// Short text for the toast or error panel.
    pub fn operator_message(&self) -> String {
        match self {
            ScanError::CameraPermissionDenied(_) => {
                "Camera permission denied. Allow camera access and press retry.".into()
            }
            ScanError::NoCameraFound(_) => "No camera found on this device.".into(),
            ScanError::DeviceBusy(_) => {
                "Camera is in use by another scanner. Close it and press retry.".into()
            }
            ScanError::InvalidQrFormat => "Invalid QR code format".into(),
            ScanError::OperatorNotAuthenticated => {
                "Staff ID not found. Please log in again.".into()
            }
            ScanError::SubjectNotFound(message)
            | ScanError::AlreadyMarked(message)
            | ScanError::ServiceRejected(message) => message.clone(),
            ScanError::NetworkUnavailable(_) => NETWORK_FAILURE_MESSAGE.into(),
            ScanError::UnexpectedDriverFailure(_) => {
                "The scanner stopped unexpectedly. Press retry to restart the camera.".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_messages_are_classified() {
        assert_eq!(
            ScanError::from_service_message("Student already marked present today"),
            ScanError::AlreadyMarked("Student already marked present today".into())
        );
        assert_eq!(
            ScanError::from_service_message("Student not found"),
            ScanError::SubjectNotFound("Student not found".into())
        );
        assert_eq!(
            ScanError::from_service_message("Outside working hours"),
            ScanError::ServiceRejected("Outside working hours".into())
        );
    }

    #[test]
    fn test_rejection_message_is_shown_verbatim() {
        let err = ScanError::from_service_message("Student already marked present today");
        assert_eq!(err.operator_message(), "Student already marked present today");
    }

    #[test]
    fn test_only_camera_errors_need_device_retry() {
        assert!(ScanError::CameraPermissionDenied("x".into()).requires_device_retry());
        assert!(ScanError::NoCameraFound("x".into()).requires_device_retry());
        assert!(!ScanError::InvalidQrFormat.requires_device_retry());
        assert!(!ScanError::NetworkUnavailable("timeout".into()).requires_device_retry());
        assert!(!ScanError::OperatorNotAuthenticated.requires_device_retry());
    }

    #[test]
    fn test_network_errors_use_generic_text() {
        let err = ScanError::NetworkUnavailable("connection refused".into());
        assert_eq!(err.operator_message(), NETWORK_FAILURE_MESSAGE);
    }
}
