use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_entry_status, to_usize},
    Database,
};
use crate::models::DisplayEntry;

fn row_to_entry(row: &Row) -> Result<DisplayEntry> {
    let status: String = row.get("status")?;
    let scanned_at: String = row.get("scanned_at")?;

    Ok(DisplayEntry {
        subject_id: row.get("subject_id")?,
        subject_name: row.get("subject_name")?,
        course_label: row.get("course_label")?,
        status: parse_entry_status(&status)?,
        pending_fee_amount: row.get("pending_fee_amount")?,
        timestamp: parse_datetime(&scanned_at, "scanned_at")?,
    })
}

impl Database {
    /// A repeat scan overwrites the row but keeps its rowid, so the list
    /// order survives a reload.
    pub async fn upsert_display_entry(
        &self,
        entry: &DisplayEntry,
        session_id: Option<String>,
    ) -> Result<()> {
        let entry = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO display_entries
                    (subject_id, subject_name, course_label, status, pending_fee_amount, scanned_at, session_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(subject_id) DO UPDATE SET
                    subject_name = excluded.subject_name,
                    course_label = excluded.course_label,
                    status = excluded.status,
                    pending_fee_amount = excluded.pending_fee_amount,
                    scanned_at = excluded.scanned_at,
                    session_id = excluded.session_id",
                params![
                    entry.subject_id,
                    entry.subject_name,
                    entry.course_label,
                    entry.status.as_str(),
                    entry.pending_fee_amount,
                    entry.timestamp.to_rfc3339(),
                    session_id,
                ],
            )
            .with_context(|| format!("failed to store display entry {}", entry.subject_id))?;
            Ok(())
        })
        .await
    }

    /// Newest first, matching the on-screen order.
    pub async fn load_display_entries(&self) -> Result<Vec<DisplayEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT subject_id, subject_name, course_label, status, pending_fee_amount, scanned_at
                 FROM display_entries
                 ORDER BY rowid DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn clear_display_entries(&self) -> Result<usize> {
        self.execute(|conn| {
            let removed = conn
                .execute("DELETE FROM display_entries", [])
                .with_context(|| "failed to clear display entries")?;
            Ok(removed)
        })
        .await
    }

    pub async fn count_display_entries(&self) -> Result<usize> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM display_entries", [], |row| row.get(0))?;
            to_usize(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DisplayList, EntryStatus};
    use chrono::Utc;

    fn entry(id: &str, name: &str, fee: Option<f64>) -> DisplayEntry {
        DisplayEntry {
            subject_id: id.into(),
            subject_name: Some(name.into()),
            course_label: None,
            status: EntryStatus::Present,
            pending_fee_amount: fee,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_subject() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("scanner.sqlite3")).unwrap();

        db.upsert_display_entry(&entry("TB1", "Asha", None), None)
            .await
            .unwrap();
        db.upsert_display_entry(&entry("TB2", "Ravi", None), None)
            .await
            .unwrap();
        db.upsert_display_entry(&entry("TB1", "Asha K", Some(250.0)), None)
            .await
            .unwrap();

        assert_eq!(db.count_display_entries().await.unwrap(), 2);

        let loaded = db.load_display_entries().await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|e| e.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["TB2", "TB1"]);
        assert_eq!(loaded[1].subject_name.as_deref(), Some("Asha K"));
        assert_eq!(loaded[1].pending_fee_amount, Some(250.0));

        // Rebuilt list matches the in-memory ordering rules.
        let list = DisplayList::from_entries(loaded);
        assert_eq!(list.entries()[0].subject_id, "TB2");
    }

    #[tokio::test]
    async fn test_clear_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.upsert_display_entry(&entry("TB1", "Asha", None), None)
                .await
                .unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(db.load_display_entries().await.unwrap().len(), 1);
        assert_eq!(db.clear_display_entries().await.unwrap(), 1);
        assert!(db.load_display_entries().await.unwrap().is_empty());
    }
}
