use chrono::{DateTime, Utc};

use crate::{
    attendance::MarkAttendanceReply,
    audio::Cue,
    error::ScanError,
    events::Tone,
    models::{AttendanceRecord, DisplayEntry, EntryStatus},
};

/// What the operator sees and hears after one decode event.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub tone: Tone,
    pub message: String,
    pub cue: Cue,
    /// Only successful submissions touch the display list.
    pub entry: Option<DisplayEntry>,
}

pub fn success_outcome(
    record: &AttendanceRecord,
    reply: &MarkAttendanceReply,
    now: DateTime<Utc>,
) -> Outcome {
    let mut message = reply.message_or_default().to_string();
    let mut tone = Tone::Success;

    // Outstanding fees turn a success into a warning.
    if reply.pending_fees.has_outstanding() {
        message.push_str(&format!(
            " | Pending fees: ₹{}",
            format_amount(reply.pending_fees.amount)
        ));
        tone = Tone::Warning;
    }

    if let Some(stats) = reply.stats {
        message.push_str(&format!(
            " | Scanned: {}, Present: {}, Absent: {}",
            stats.total_scanned, stats.total_present, stats.total_absent
        ));
    }

    let entry = DisplayEntry {
        subject_id: record.subject_id.clone(),
        subject_name: record.subject_name.clone(),
        course_label: record.course_label.clone(),
        status: EntryStatus::Present,
        pending_fee_amount: reply.pending_fees.display_amount(),
        timestamp: now,
    };

    Outcome {
        tone,
        message,
        cue: Cue::Success,
        entry: Some(entry),
    }
}

pub fn failure_outcome(err: &ScanError) -> Outcome {
    Outcome {
        tone: Tone::Error,
        message: err.operator_message(),
        cue: Cue::Failure,
        entry: None,
    }
}

pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}
