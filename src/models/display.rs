//! Operator-visible running list of processed subjects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    Present,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Present => "Present",
            EntryStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEntry {
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub course_label: Option<String>,
    pub status: EntryStatus,
    pub pending_fee_amount: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpsertKind {
    Inserted,
    Replaced,
}

/// Newest subjects first; one row per subject.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplayList {
    entries: Vec<DisplayEntry>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    /// `entries` must already be ordered newest first.
    pub fn from_entries(entries: Vec<DisplayEntry>) -> Self {
        let mut list = Self::new();
        for entry in entries.into_iter().rev() {
            list.upsert(entry);
        }
        list
    }

    /// Replace the row for the same subject in place (latest scan wins),
    /// otherwise prepend.
    pub fn upsert(&mut self, entry: DisplayEntry) -> UpsertKind {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.subject_id == entry.subject_id)
        {
            Some(existing) => {
                *existing = entry;
                UpsertKind::Replaced
            }
            None => {
                self.entries.insert(0, entry);
                UpsertKind::Inserted
            }
        }
    }

    pub fn get(&self, subject_id: &str) -> Option<&DisplayEntry> {
        self.entries.iter().find(|entry| entry.subject_id == subject_id)
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == EntryStatus::Present)
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject_id: &str, fee: Option<f64>) -> DisplayEntry {
        DisplayEntry {
            subject_id: subject_id.to_string(),
            subject_name: Some(format!("Student {subject_id}")),
            course_label: Some("12th".into()),
            status: EntryStatus::Present,
            pending_fee_amount: fee,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_new_subjects_are_prepended() {
        let mut list = DisplayList::new();
        assert_eq!(list.upsert(entry("TB1", None)), UpsertKind::Inserted);
        assert_eq!(list.upsert(entry("TB2", None)), UpsertKind::Inserted);

        let ids: Vec<_> = list.entries().iter().map(|e| e.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["TB2", "TB1"]);
    }

    #[test]
    fn test_same_subject_is_replaced_not_duplicated() {
        let mut list = DisplayList::new();
        list.upsert(entry("TB1", Some(100.0)));
        list.upsert(entry("TB2", None));
        assert_eq!(list.upsert(entry("TB1", Some(0.0))), UpsertKind::Replaced);

        assert_eq!(list.len(), 2);
        assert_eq!(list.get("TB1").unwrap().pending_fee_amount, Some(0.0));
        // replaced rows keep their position
        assert_eq!(list.entries()[1].subject_id, "TB1");
    }

    #[test]
    fn test_from_entries_keeps_order() {
        let list = DisplayList::from_entries(vec![entry("TB3", None), entry("TB2", None)]);
        assert_eq!(list.entries()[0].subject_id, "TB3");
        assert_eq!(list.present_count(), 2);
    }
}
