//! ID-card QR payload parsing.
//!
//! The card generator writes newline-separated `Key: value` lines using the
//! literal keys `Name:`, `ID:`, `Contact:` and `Course:`. Matching is exact
//! (case and whitespace sensitive) and unknown lines are skipped so newer
//! cards can carry extra fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::AttendanceRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPrefixes {
    pub name: String,
    pub id: String,
    pub contact: String,
    pub course: String,
}

impl Default for PayloadPrefixes {
    fn default() -> Self {
        Self {
            name: "Name:".into(),
            id: "ID:".into(),
            contact: "Contact:".into(),
            course: "Course:".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("payload is not text")]
    NotText,

    #[error("payload has no non-empty `{0}` line")]
    MissingSubjectId(String),
}

enum Field {
    Name,
    Id,
    Contact,
    Course,
}

#[derive(Debug, Clone, Default)]
pub struct PayloadParser {
    prefixes: PayloadPrefixes,
}

impl PayloadParser {
    pub fn new(prefixes: PayloadPrefixes) -> Self {
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &PayloadPrefixes {
        &self.prefixes
    }

    pub fn parse(&self, payload: &str) -> Result<AttendanceRecord, ParseFailure> {
        let mut record = AttendanceRecord::default();

        for line in payload.lines() {
            let Some((field, value)) = self.match_line(line) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let value = value.to_string();
            match field {
                Field::Name => record.subject_name = Some(value),
                Field::Id => record.subject_id = value,
                Field::Contact => record.contact = Some(value),
                Field::Course => record.course_label = Some(value),
            }
        }

        if record.is_valid() {
            Ok(record)
        } else {
            Err(ParseFailure::MissingSubjectId(self.prefixes.id.clone()))
        }
    }

    /// Decoder results arrive either as the bare text or as an object with a
    /// string `data` field.
    pub fn parse_value(&self, value: &Value) -> Result<AttendanceRecord, ParseFailure> {
        match value {
            Value::String(text) => self.parse(text),
            Value::Object(map) => match map.get("data") {
                Some(Value::String(text)) => self.parse(text),
                _ => Err(ParseFailure::NotText),
            },
            _ => Err(ParseFailure::NotText),
        }
    }

    /// Writes the card-side format for a record.
    pub fn render(&self, record: &AttendanceRecord) -> String {
        let mut lines = Vec::with_capacity(4);
        if let Some(name) = &record.subject_name {
            lines.push(format!("{} {}", self.prefixes.name, name));
        }
        lines.push(format!("{} {}", self.prefixes.id, record.subject_id));
        if let Some(contact) = &record.contact {
            lines.push(format!("{} {}", self.prefixes.contact, contact));
        }
        if let Some(course) = &record.course_label {
            lines.push(format!("{} {}", self.prefixes.course, course));
        }
        lines.join("\n")
    }

    fn match_line<'a>(&self, line: &'a str) -> Option<(Field, &'a str)> {
        let candidates = [
            (Field::Name, &self.prefixes.name),
            (Field::Id, &self.prefixes.id),
            (Field::Contact, &self.prefixes.contact),
            (Field::Course, &self.prefixes.course),
        ];
        candidates.into_iter().find_map(|(field, prefix)| {
            line.strip_prefix(prefix.as_str())
                .map(|rest| (field, rest.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CARD: &str = "Name: Asha Singh\nID: TB000123\nContact: +919999999999\nCourse: 12th";

    #[test]
    fn test_parses_full_card() {
        let record = PayloadParser::default().parse(CARD).unwrap();
        assert_eq!(record.subject_id, "TB000123");
        assert_eq!(record.subject_name.as_deref(), Some("Asha Singh"));
        assert_eq!(record.contact.as_deref(), Some("+919999999999"));
        assert_eq!(record.course_label.as_deref(), Some("12th"));
    }

    #[test]
    fn test_render_then_parse_recovers_fields() {
        let parser = PayloadParser::default();
        let records = [
            AttendanceRecord::new("TB1")
                .with_name("Meera Iyer")
                .with_contact("98450")
                .with_course("NEET Dropper"),
            AttendanceRecord::new("TB2").with_course("11th"),
            AttendanceRecord::new("TB3"),
        ];
        for record in records {
            assert_eq!(parser.parse(&parser.render(&record)).unwrap(), record);
        }
    }

    #[test]
    fn test_rejects_malformed_input() {
        let parser = PayloadParser::default();
        assert_eq!(
            parser.parse(""),
            Err(ParseFailure::MissingSubjectId("ID:".into()))
        );
        assert!(parser.parse("garbage text").is_err());
        assert!(parser.parse("Name: X").is_err());
        assert_eq!(
            parser.parse_value(&json!({"unexpected": true})),
            Err(ParseFailure::NotText)
        );
        assert_eq!(parser.parse_value(&json!(42)), Err(ParseFailure::NotText));
    }

    #[test]
    fn test_accepts_object_with_data_field() {
        let record = PayloadParser::default()
            .parse_value(&json!({"data": CARD}))
            .unwrap();
        assert_eq!(record.subject_id, "TB000123");
    }

    #[test]
    fn test_unknown_lines_are_ignored_and_crlf_is_tolerated() {
        let payload = "Batch: Morning\r\nID: TB9\r\nBlood Group: O+\r\n";
        let record = PayloadParser::default().parse(payload).unwrap();
        assert_eq!(record.subject_id, "TB9");
        assert_eq!(record.subject_name, None);
    }

    #[test]
    fn test_prefix_matching_is_exact() {
        let parser = PayloadParser::default();
        assert!(parser.parse("id: TB1").is_err());
        assert!(parser.parse("  ID: TB1").is_err());
        assert!(parser.parse("ID:").is_err());
    }

    #[test]
    fn test_custom_prefixes() {
        let parser = PayloadParser::new(PayloadPrefixes {
            id: "Roll:".into(),
            ..PayloadPrefixes::default()
        });
        assert_eq!(parser.parse("Roll: 17").unwrap().subject_id, "17");
        assert!(parser.parse("ID: 17").is_err());
    }
}
