//! One open scanner view: the decoder driver, the display list, and the
//! per-decode orchestration from parse to resume.
//!
//! A `ScanSession` is only ever touched from its runner task. Decoder events
//! and submission results arrive there as messages, so no state in here is
//! shared or locked.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    audio::{Cue, FeedbackPlayer},
    db::Database,
    error::ScanError,
    events::{EventBus, ScanEvent},
    models::{DisplayEntry, DisplayList, ScanSessionRecord, ScanSessionStatus, UpsertKind},
    scanner::{
        CameraDevice, DecoderDriver, DecoderEvent, DecoderState, DriverOptions, DriverStatus,
        FacingMode, FrameDecoder,
    },
    settings::ScannerSettings,
};

use super::controller::{PendingSubmission, SubmissionCoordinator, SubmissionResult};
use super::outcome::{failure_outcome, success_outcome, Outcome};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, scan_info, scan_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CoordinatorPhase {
    Idle,
    Decoded,
    Parsing,
    Validating,
    Submitting,
    Feedback,
    Resuming,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub facing: FacingMode,
    pub toast_millis: u64,
    pub persist_entries: bool,
    pub driver: DriverOptions,
}

impl SessionSettings {
    pub fn from_settings(settings: &ScannerSettings, facing: FacingMode) -> Self {
        Self {
            facing,
            toast_millis: settings.toast_millis,
            persist_entries: settings.persist_entries,
            driver: DriverOptions {
                poll_interval: settings.poll_interval(),
                max_restart_attempts: settings.max_restart_attempts,
            },
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_settings(&ScannerSettings::default(), FacingMode::default())
    }
}

/// Everything a session needs, assembled by the caller.
pub struct SessionParts {
    pub camera: Box<dyn CameraDevice>,
    pub decoder: Arc<dyn FrameDecoder>,
    pub coordinator: SubmissionCoordinator,
    pub feedback: Arc<dyn FeedbackPlayer>,
    pub database: Option<Database>,
    pub settings: SessionSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: CoordinatorPhase,
    pub driver: DriverStatus,
    pub entries: Vec<DisplayEntry>,
}

pub struct ScanSession {
    id: String,
    driver: DecoderDriver,
    coordinator: SubmissionCoordinator,
    feedback: Arc<dyn FeedbackPlayer>,
    entries: DisplayList,
    database: Option<Database>,
    bus: EventBus,
    phase: CoordinatorPhase,
    settings: SessionSettings,
    teardown: CancellationToken,
}

impl ScanSession {
    /// Build the session and the channel its decode loop reports on. The
    /// camera is not touched until `open`.
    pub fn new(parts: SessionParts, bus: EventBus) -> (Self, mpsc::UnboundedReceiver<DecoderEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = DecoderDriver::new(
            parts.camera,
            parts.decoder,
            events_tx,
            bus.clone(),
            parts.settings.driver,
        );
        let database = if parts.settings.persist_entries {
            parts.database
        } else {
            None
        };

        let session = Self {
            id: Uuid::new_v4().to_string(),
            driver,
            coordinator: parts.coordinator,
            feedback: parts.feedback,
            entries: DisplayList::new(),
            database,
            bus,
            phase: CoordinatorPhase::Idle,
            settings: parts.settings,
            teardown: CancellationToken::new(),
        };
        (session, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.driver.state()
    }

    pub fn entries(&self) -> &DisplayList {
        &self.entries
    }

    pub fn is_closed(&self) -> bool {
        self.teardown.is_cancelled()
    }

    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    /// Restore the persisted list, record the session, and start scanning.
    /// A camera failure leaves the session open in `Error`, waiting for a
    /// retry.
    pub async fn open(&mut self) {
        if let Some(db) = self.database.clone() {
            match db.load_display_entries().await {
                Ok(entries) if !entries.is_empty() => {
                    scan_info!(self.short_id(), "restored {} display entries", entries.len());
                    self.entries = DisplayList::from_entries(entries);
                }
                Ok(_) => {}
                Err(err) => scan_warn!(self.short_id(), "could not restore display list: {err:#}"),
            }

            let record = ScanSessionRecord {
                id: self.id.clone(),
                operator_id: self.coordinator.current_operator().map(|op| op.id),
                opened_at: Utc::now(),
                closed_at: None,
                status: ScanSessionStatus::Open,
            };
            if let Err(err) = db.insert_scan_session(&record).await {
                scan_warn!(self.short_id(), "could not record scan session: {err:#}");
            }
        }

        scan_info!(self.short_id(), "scanner opened ({})", self.settings.facing.as_str());
        if let Err(err) = self.driver.start(self.settings.facing).await {
            self.report_device_error(err);
        }
    }

    /// Decode events are stopped-then-handled; anything from a stale epoch is
    /// dropped here. Returns the submission to run when the payload passed
    /// validation.
    pub async fn on_decoder_event(&mut self, event: DecoderEvent) -> Option<PendingSubmission> {
        if self.is_closed() {
            return None;
        }

        match event {
            DecoderEvent::Decoded { epoch, payload } => {
                if !self.driver.accept_decode(epoch) {
                    return None;
                }
                self.phase = CoordinatorPhase::Decoded;
                log_debug!("decode accepted (epoch {epoch}, {} bytes)", payload.len());

                self.phase = CoordinatorPhase::Parsing;
                let prepared = self.coordinator.parse(&payload).and_then(|record| {
                    self.phase = CoordinatorPhase::Validating;
                    self.coordinator.validate(record)
                });

                match prepared {
                    Ok(pending) => {
                        scan_info!(
                            self.short_id(),
                            "submitting attendance for {}",
                            pending.record().subject_id
                        );
                        self.phase = CoordinatorPhase::Submitting;
                        Some(pending)
                    }
                    Err(err) => {
                        scan_warn!(self.short_id(), "scan rejected before submit: {err}");
                        self.phase = CoordinatorPhase::Feedback;
                        self.deliver(failure_outcome(&err)).await;
                        self.resume().await;
                        None
                    }
                }
            }
            DecoderEvent::Fault { epoch, fault } => {
                if let Err(err) = self.driver.handle_fault(epoch, fault).await {
                    self.report_device_error(err);
                }
                None
            }
        }
    }

    /// Apply a submission result, then resume scanning. Results arriving
    /// after close are dropped.
    pub async fn finish(&mut self, submission: SubmissionResult) {
        if self.is_closed() {
            return;
        }

        self.phase = CoordinatorPhase::Feedback;
        let outcome = match &submission.result {
            Ok(reply) => {
                scan_info!(
                    self.short_id(),
                    "attendance marked for {}",
                    submission.record.subject_id
                );
                success_outcome(&submission.record, reply, Utc::now())
            }
            Err(err) => {
                scan_warn!(
                    self.short_id(),
                    "attendance for {} failed: {err}",
                    submission.record.subject_id
                );
                failure_outcome(err)
            }
        };
        self.deliver(outcome).await;
        self.resume().await;
    }

    /// Restart the decoder for the next subject.
    pub async fn resume(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = CoordinatorPhase::Resuming;
        if let Err(err) = self.driver.start(self.settings.facing).await {
            self.report_device_error(err);
        }
        self.phase = CoordinatorPhase::Idle;
    }

    /// Operator retry after a device error.
    pub async fn retry(&mut self) -> Result<(), ScanError> {
        if self.is_closed() {
            return Err(ScanError::UnexpectedDriverFailure(
                "scanner view is closed".into(),
            ));
        }
        if self.phase != CoordinatorPhase::Idle {
            // A submission is running; it resumes the decoder itself.
            return Ok(());
        }
        scan_info!(self.short_id(), "operator retry");
        if let Err(err) = self.driver.start(self.settings.facing).await {
            self.report_device_error(err.clone());
            return Err(err);
        }
        Ok(())
    }

    pub async fn clear_entries(&mut self) {
        self.entries.clear();
        if let Some(db) = &self.database {
            if let Err(err) = db.clear_display_entries().await {
                scan_warn!(self.short_id(), "could not clear stored entries: {err:#}");
            }
        }
    }

    /// Stop decoding, release the camera, and mark the session torn down.
    /// Idempotent.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.teardown.cancel();
        self.driver.destroy().await;
        self.phase = CoordinatorPhase::Idle;

        if let Some(db) = &self.database {
            if let Err(err) = db.close_scan_session(&self.id, Utc::now()).await {
                scan_warn!(self.short_id(), "could not close scan session record: {err:#}");
            }
        }

        scan_info!(self.short_id(), "scanner closed");
        self.bus.publish(ScanEvent::SessionClosed {
            session_id: self.id.clone(),
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase,
            driver: self.driver.status().clone(),
            entries: self.entries.entries().to_vec(),
        }
    }

    async fn deliver(&mut self, outcome: Outcome) {
        self.feedback.play(outcome.cue);

        if let Some(entry) = outcome.entry {
            let replaced = self.entries.upsert(entry.clone()) == UpsertKind::Replaced;
            if let Some(db) = &self.database {
                if let Err(err) = db.upsert_display_entry(&entry, Some(self.id.clone())).await {
                    scan_warn!(self.short_id(), "could not persist display entry: {err:#}");
                }
            }
            self.bus.publish(ScanEvent::EntryUpserted { entry, replaced });
        }

        self.bus.publish(ScanEvent::Toast {
            tone: outcome.tone,
            message: outcome.message,
            auto_clear_ms: self.settings.toast_millis,
        });
    }

    fn report_device_error(&mut self, err: ScanError) {
        scan_warn!(self.short_id(), "device error: {err}");
        self.feedback.play(Cue::Failure);
        self.bus.publish(ScanEvent::DeviceError {
            message: err.operator_message(),
            error: err,
        });
    }
}
