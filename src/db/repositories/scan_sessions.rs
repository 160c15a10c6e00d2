use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_optional_datetime, parse_session_status, to_usize},
    Database,
};
use crate::models::{ScanSessionRecord, ScanSessionStatus};

fn row_to_session(row: &Row) -> Result<ScanSessionRecord> {
    let opened_at: String = row.get("opened_at")?;
    let closed_at: Option<String> = row.get("closed_at")?;
    let status: String = row.get("status")?;

    Ok(ScanSessionRecord {
        id: row.get("id")?,
        operator_id: row.get("operator_id")?,
        opened_at: parse_datetime(&opened_at, "opened_at")?,
        closed_at: parse_optional_datetime(closed_at, "closed_at")?,
        status: parse_session_status(&status)?,
    })
}

impl Database {
    pub async fn insert_scan_session(&self, session: &ScanSessionRecord) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO scan_sessions (id, operator_id, opened_at, closed_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.operator_id,
                    record.opened_at.to_rfc3339(),
                    record.closed_at.map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                ],
            )
            .with_context(|| "failed to insert scan session")?;
            Ok(())
        })
        .await
    }

    pub async fn close_scan_session(&self, session_id: &str, closed_at: DateTime<Utc>) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE scan_sessions SET status = ?1, closed_at = ?2 WHERE id = ?3",
                params![ScanSessionStatus::Closed.as_str(), closed_at.to_rfc3339(), session_id],
            )
            .with_context(|| "failed to close scan session")?;
            Ok(())
        })
        .await
    }

    /// Sessions still `Open` were never closed cleanly (crash, kill).
    pub async fn mark_open_sessions_interrupted(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE scan_sessions SET status = ?1, closed_at = ?2 WHERE status = ?3",
                    params![
                        ScanSessionStatus::Interrupted.as_str(),
                        now.to_rfc3339(),
                        ScanSessionStatus::Open.as_str(),
                    ],
                )
                .with_context(|| "failed to mark interrupted scan sessions")?;
            Ok(updated)
        })
        .await
    }

    pub async fn get_scan_session(&self, session_id: &str) -> Result<Option<ScanSessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, operator_id, opened_at, closed_at, status
                 FROM scan_sessions
                 WHERE id = ?1",
            )?;
            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    pub async fn count_scan_sessions(&self, status: ScanSessionStatus) -> Result<usize> {
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM scan_sessions WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            to_usize(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(id: &str) -> ScanSessionRecord {
        ScanSessionRecord {
            id: id.to_string(),
            operator_id: Some("S-1".into()),
            opened_at: Utc::now(),
            closed_at: None,
            status: ScanSessionStatus::Open,
        }
    }

    #[tokio::test]
    async fn test_close_and_recover_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("scanner.sqlite3")).unwrap();

        db.insert_scan_session(&open_session("a")).await.unwrap();
        db.insert_scan_session(&open_session("b")).await.unwrap();
        db.close_scan_session("a", Utc::now()).await.unwrap();

        let recovered = db.mark_open_sessions_interrupted(Utc::now()).await.unwrap();
        assert_eq!(recovered, 1);

        let a = db.get_scan_session("a").await.unwrap().unwrap();
        assert_eq!(a.status, ScanSessionStatus::Closed);
        assert!(a.closed_at.is_some());
        let b = db.get_scan_session("b").await.unwrap().unwrap();
        assert_eq!(b.status, ScanSessionStatus::Interrupted);

        assert_eq!(
            db.count_scan_sessions(ScanSessionStatus::Open).await.unwrap(),
            0
        );
        assert!(db.get_scan_session("missing").await.unwrap().is_none());
    }
}
