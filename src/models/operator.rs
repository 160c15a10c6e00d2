//! The authenticated staff member performing scans.
//!
//! The login flow lives outside this crate and leaves the staff record as a
//! JSON file; the scanner only reads it.

use std::{fs, path::PathBuf};

use log::debug;
use serde::Serialize;
use serde_json::Value;

const ID_FIELDS: [&str; 3] = ["_id", "id", "staffId"];
const NAME_FIELDS: [&str; 2] = ["name", "fullName"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorIdentity {
    pub id: String,
    pub name: Option<String>,
}

impl OperatorIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Accepts the staff object itself or a wrapper with a `staff` object.
    pub fn from_staff_record(value: &Value) -> Option<Self> {
        let record = value.as_object()?;
        let record = match record.get("staff").and_then(Value::as_object) {
            Some(inner) => inner,
            None => record,
        };

        let id = ID_FIELDS.iter().find_map(|field| match record.get(*field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })?;

        let name = NAME_FIELDS.iter().find_map(|field| {
            record
                .get(*field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        Some(Self { id, name })
    }
}

/// Resolves the operator at the moment a scan is submitted.
pub trait OperatorSource: Send + Sync {
    fn current_operator(&self) -> Option<OperatorIdentity>;
}

/// Staff record persisted by the login flow. Re-read on every call so a
/// fresh login is picked up without reopening the scanner.
#[derive(Debug, Clone)]
pub struct StaffSessionFile {
    path: PathBuf,
}

impl StaffSessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OperatorSource for StaffSessionFile {
    fn current_operator(&self) -> Option<OperatorIdentity> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!("staff record {} unavailable: {err}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(value) => OperatorIdentity::from_staff_record(&value),
            Err(err) => {
                debug!("staff record {} is not JSON: {err}", self.path.display());
                None
            }
        }
    }
}

/// Operator supplied up front, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedOperator(pub Option<OperatorIdentity>);

impl OperatorSource for FixedOperator {
    fn current_operator(&self) -> Option<OperatorIdentity> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_from_mongo_style_record() {
        let identity =
            OperatorIdentity::from_staff_record(&json!({"_id": "64f0a1", "name": "Ravi"}))
                .unwrap();
        assert_eq!(identity.id, "64f0a1");
        assert_eq!(identity.name.as_deref(), Some("Ravi"));
    }

    #[test]
    fn test_identity_from_wrapped_record() {
        let identity =
            OperatorIdentity::from_staff_record(&json!({"token": "t", "staff": {"staffId": 42}}))
                .unwrap();
        assert_eq!(identity.id, "42");
    }

    #[test]
    fn test_missing_or_blank_id_is_none() {
        assert!(OperatorIdentity::from_staff_record(&json!({"name": "Ravi"})).is_none());
        assert!(OperatorIdentity::from_staff_record(&json!({"_id": "  "})).is_none());
        assert!(OperatorIdentity::from_staff_record(&json!("staff")).is_none());
    }

    #[test]
    fn test_staff_file_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staff.json");
        let source = StaffSessionFile::new(&path);
        assert!(source.current_operator().is_none());

        fs::write(&path, r#"{"_id": "S-1"}"#).unwrap();
        assert_eq!(source.current_operator().unwrap().id, "S-1");

        fs::write(&path, "not json").unwrap();
        assert!(source.current_operator().is_none());
    }
}
