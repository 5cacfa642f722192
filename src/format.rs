//! Text rendering of records and batches.
//!
//! A batch is rendered as a single block of text, one line per record, so
//! that a whole burst of events ends up in one outbound message.

use crate::record::LogRecord;
use chrono::SecondsFormat;
use std::fmt::Write as _;

/// Renders [`LogRecord`]s as plain text lines.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    /// Append structured fields as `key=value` after the message.
    pub include_fields: bool,
    /// Appended after every rendered record.
    pub terminator: String,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            include_fields: true,
            terminator: "\n".to_string(),
        }
    }
}

impl TextFormatter {
    /// `2024-08-29T10:00:00.000Z ERROR app::db: connection lost attempt=3`
    pub fn format_record(&self, record: &LogRecord) -> String {
        let mut line = format!(
            "{} {} {}: {}",
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            record.severity,
            record.target,
            record.message.as_deref().unwrap_or(""),
        );

        if self.include_fields {
            for (name, value) in &record.fields {
                match value {
                    serde_json::Value::String(s) => {
                        let _ = write!(line, " {}={}", name, s);
                    }
                    other => {
                        let _ = write!(line, " {}={}", name, other);
                    }
                }
            }
        }

        line
    }

    /// Concatenate every record of the batch, each followed by the terminator.
    pub fn format_batch(&self, batch: &[LogRecord]) -> String {
        let mut out = String::new();
        for record in batch {
            out.push_str(&self.format_record(record));
            out.push_str(&self.terminator);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use chrono::TimeZone;

    fn record(msg: &str) -> LogRecord {
        let mut r = LogRecord::new(Severity::Error, "app::db", msg);
        r.timestamp = chrono::Utc.with_ymd_and_hms(2024, 8, 29, 10, 0, 0).unwrap();
        r
    }

    #[test]
    fn formats_record_with_fields() {
        let r = record("connection lost").with_field("attempt", 3).with_field("host", "db1");
        let line = TextFormatter::default().format_record(&r);
        assert_eq!(
            line,
            "2024-08-29T10:00:00.000Z ERROR app::db: connection lost attempt=3 host=db1"
        );
    }

    #[test]
    fn batch_is_one_line_per_record() {
        let formatter = TextFormatter {
            include_fields: false,
            ..TextFormatter::default()
        };
        let text = formatter.format_batch(&[record("a"), record("b")]);
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with("app::db: b\n"));
    }
}
