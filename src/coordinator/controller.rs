use std::sync::Arc;
use std::time::Duration;

use crate::{
    attendance::{AttendanceService, MarkAttendanceReply, MarkAttendanceRequest},
    error::ScanError,
    models::{AttendanceRecord, OperatorIdentity, OperatorSource},
    payload::PayloadParser,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Parses, validates, and submits one decoded payload. Holds no session
/// state of its own.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    parser: PayloadParser,
    operators: Arc<dyn OperatorSource>,
    service: Arc<dyn AttendanceService>,
    request_timeout: Duration,
}

impl SubmissionCoordinator {
    pub fn new(
        parser: PayloadParser,
        operators: Arc<dyn OperatorSource>,
        service: Arc<dyn AttendanceService>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            parser,
            operators,
            service,
            request_timeout,
        }
    }

    pub fn current_operator(&self) -> Option<OperatorIdentity> {
        self.operators.current_operator()
    }

    pub fn parse(&self, payload: &str) -> Result<AttendanceRecord, ScanError> {
        self.parser.parse(payload).map_err(|failure| {
            log_debug!("rejecting payload: {failure}");
            ScanError::InvalidQrFormat
        })
    }

    /// The operator is resolved per scan so a re-login applies immediately.
    pub fn validate(&self, record: AttendanceRecord) -> Result<PendingSubmission, ScanError> {
        let operator = self
            .current_operator()
            .ok_or(ScanError::OperatorNotAuthenticated)?;

        Ok(PendingSubmission {
            request: MarkAttendanceRequest::new(record.subject_id.clone(), operator.id),
            record,
            service: Arc::clone(&self.service),
            timeout: self.request_timeout,
        })
    }

    /// Parse then validate; everything that can fail without a network call
    /// fails here.
    pub fn prepare(&self, payload: &str) -> Result<PendingSubmission, ScanError> {
        self.validate(self.parse(payload)?)
    }
}

/// A validated record ready for the single network call.
pub struct PendingSubmission {
    record: AttendanceRecord,
    request: MarkAttendanceRequest,
    service: Arc<dyn AttendanceService>,
    timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub record: AttendanceRecord,
    pub result: Result<MarkAttendanceReply, ScanError>,
}

impl PendingSubmission {
    pub fn record(&self) -> &AttendanceRecord {
        &self.record
    }

    /// No automatic retry; an elapsed timeout is a network failure.
    pub async fn submit(self) -> SubmissionResult {
        let result =
            match tokio::time::timeout(self.timeout, self.service.mark_attendance(&self.request))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    log_warn!(
                        "attendance submission for {} timed out after {:?}",
                        self.record.subject_id,
                        self.timeout
                    );
                    Err(ScanError::NetworkUnavailable(format!(
                        "no response within {}s",
                        self.timeout.as_secs()
                    )))
                }
            };

        SubmissionResult {
            record: self.record,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FixedOperator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowService {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl AttendanceService for SlowService {
        async fn mark_attendance(
            &self,
            request: &MarkAttendanceRequest,
        ) -> Result<MarkAttendanceReply, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.staff_id, "S-1");
            tokio::time::sleep(self.delay).await;
            Ok(MarkAttendanceReply::default())
        }
    }

    fn coordinator(
        operator: Option<&str>,
        delay: Duration,
        timeout: Duration,
    ) -> (SubmissionCoordinator, Arc<SlowService>) {
        let service = Arc::new(SlowService {
            calls: AtomicUsize::new(0),
            delay,
        });
        let coordinator = SubmissionCoordinator::new(
            PayloadParser::default(),
            Arc::new(FixedOperator(operator.map(OperatorIdentity::new))),
            service.clone(),
            timeout,
        );
        (coordinator, service)
    }

    #[test]
    fn test_prepare_rejects_payload_without_id() {
        let (coordinator, _) = coordinator(Some("S-1"), Duration::ZERO, Duration::from_secs(1));
        assert!(matches!(
            coordinator.prepare("Name: X"),
            Err(ScanError::InvalidQrFormat)
        ));
    }

    #[test]
    fn test_prepare_requires_operator() {
        let (coordinator, _) = coordinator(None, Duration::ZERO, Duration::from_secs(1));
        assert!(matches!(
            coordinator.prepare("ID: TB1"),
            Err(ScanError::OperatorNotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_submit_sends_subject_and_operator() {
        let (coordinator, service) =
            coordinator(Some("S-1"), Duration::ZERO, Duration::from_secs(1));
        let pending = coordinator.prepare("Name: Asha\nID: TB000123").unwrap();
        assert_eq!(pending.record().subject_id, "TB000123");

        let outcome = pending.submit().await;
        assert!(outcome.result.is_ok());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_timeout_is_network_error() {
        let (coordinator, _) = coordinator(
            Some("S-1"),
            Duration::from_secs(5),
            Duration::from_millis(50),
        );
        let outcome = coordinator.prepare("ID: TB1").unwrap().submit().await;
        assert!(matches!(
            outcome.result,
            Err(ScanError::NetworkUnavailable(_))
        ));
    }
}
