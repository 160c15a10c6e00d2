//! Attendance Submission Coordinator: turns decode events into at most one
//! remote submission at a time and keeps the scanner running afterwards.

pub mod controller;
pub mod outcome;
pub mod runner;
pub mod session;

pub use controller::{PendingSubmission, SubmissionCoordinator, SubmissionResult};
pub use outcome::{failure_outcome, format_amount, success_outcome, Outcome};
pub use runner::{spawn_session, SessionCommand, SessionHandle};
pub use session::{
    CoordinatorPhase, ScanSession, SessionParts, SessionSettings, SessionSnapshot,
};
