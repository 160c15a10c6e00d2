use serde::{Deserialize, Serialize};

/// Structured form of a scanned ID-card payload.
///
/// Only `subject_id` is required; the rest is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub contact: Option<String>,
    pub course_label: Option<String>,
}

impl AttendanceRecord {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.subject_name = Some(name.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course_label = Some(course.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.subject_id.trim().is_empty()
    }
}
