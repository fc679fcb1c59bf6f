//! Projects and tasks as stored in the remote document store.

pub mod project;
pub mod task;

pub use project::Project;
pub use task::{NewTask, ParseStatusError, Task, TaskEdit, TaskStatus};

use chrono::NaiveDate;

use crate::error::SyncError;

/// Default ownership tag field, overridable through
/// [`CollectionConfig::owner_field`](crate::config::CollectionConfig).
pub const DEFAULT_OWNER_FIELD: &str = "ownerId";
/// Back-reference from a task to its project.
pub const PROJECT_FIELD: &str = "projectId";
/// Wire format of due dates.
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

/// A snapshot or point-read document that does not decode into a model type.
#[derive(Debug, thiserror::Error)]
#[error("malformed {kind} document {id}: {source}")]
pub struct DecodeError {
    pub kind: &'static str,
    pub id: String,
    #[source]
    pub source: serde_json::Error,
}

/// Trim a required text field, rejecting blanks.
pub(crate) fn required_text(field: &'static str, raw: &str) -> Result<String, SyncError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SyncError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Blank optional text is treated as absent.
pub(crate) fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validate an optional `YYYY-MM-DD` due date.
pub(crate) fn optional_due_date(raw: Option<&str>) -> Result<Option<String>, SyncError> {
    let Some(text) = optional_text(raw) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&text, DUE_DATE_FORMAT)
        .map_err(|err| SyncError::invalid("due date", format!("'{text}': {err}")))?;
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_trims_and_rejects_blank() {
        assert_eq!(required_text("name", "  Launch ").expect("valid"), "Launch");
        assert!(required_text("name", "   ").is_err());
    }

    #[test]
    fn due_date_must_be_calendar_date() {
        assert_eq!(
            optional_due_date(Some("2026-03-01")).expect("valid"),
            Some("2026-03-01".to_string())
        );
        assert_eq!(optional_due_date(Some("")).expect("blank"), None);
        assert_eq!(optional_due_date(None).expect("none"), None);
        assert!(optional_due_date(Some("2026-02-30")).is_err());
        assert!(optional_due_date(Some("next week")).is_err());
    }
}
