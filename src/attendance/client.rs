use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};

use crate::error::ScanError;

use super::response::{reply_from_response, ApiResponse, MarkAttendanceReply};
use super::{AttendanceService, MarkAttendanceRequest};

const USER_AGENT: &str = concat!("tb-scanner/", env!("CARGO_PKG_VERSION"));
const GENERIC_REJECTION: &str = "Failed to mark attendance";

pub struct HttpAttendanceService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAttendanceService {
    pub fn new(base_url: &str, path: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: join_url(base_url, path),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a status code and (possibly undecodable) body to an outcome.
pub fn interpret_response(
    status: u16,
    body: Option<ApiResponse>,
) -> Result<MarkAttendanceReply, ScanError> {
    let ok_status = (200..300).contains(&status);
    match body {
        Some(api) if ok_status && api.success != Some(false) => Ok(reply_from_response(api)),
        Some(ApiResponse {
            message: Some(message),
            ..
        }) if !message.trim().is_empty() => Err(ScanError::from_service_message(message)),
        Some(_) if ok_status => Err(ScanError::ServiceRejected(GENERIC_REJECTION.into())),
        None if ok_status => Ok(MarkAttendanceReply::default()),
        _ => Err(ScanError::NetworkUnavailable(format!(
            "attendance service responded with status {status}"
        ))),
    }
}

#[async_trait]
impl AttendanceService for HttpAttendanceService {
    async fn mark_attendance(
        &self,
        request: &MarkAttendanceRequest,
    ) -> Result<MarkAttendanceReply, ScanError> {
        debug!("POST {} for subject {}", self.endpoint, request.qr_code_data);

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| ScanError::NetworkUnavailable(err.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ScanError::NetworkUnavailable(err.to_string()))?;

        let body = match serde_json::from_slice::<ApiResponse>(&bytes) {
            Ok(body) => Some(body),
            Err(err) => {
                warn!("attendance response (status {status}) is not JSON: {err}");
                None
            }
        };

        interpret_response(status, body)
    }
}
