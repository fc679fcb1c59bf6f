use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{fmt, str::FromStr};

use super::{DUE_DATE_FORMAT, DecodeError, PROJECT_FIELD};
use crate::store::{Document, Fields, fields};

/// The three task states.
///
/// `InProgress` exists in stored data but no operation moves a task into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "inprogress",
            Self::Done => "done",
        }
    }

    /// Status after a toggle: `done -> todo`, anything else `-> done`.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Done => Self::Todo,
            Self::Todo | Self::InProgress => Self::Done,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a status from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task status: '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "inprogress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A unit of work inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    /// Empty when the stored document carries no ownership tag.
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    /// Calendar date as stored (`YYYY-MM-DD`).
    pub due_date: Option<String>,
    pub status: TaskStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskFields {
    project_id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
}

impl Task {
    /// Decode a store document whose ownership tag lives in `owner_field`.
    ///
    /// Blank `description`/`dueDate` become `None`; a missing or null
    /// `status` becomes [`TaskStatus::Todo`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when `projectId` or `title` is missing, or the
    /// status is not a known value.
    pub fn from_document(doc: &Document, owner_field: &str) -> Result<Self, DecodeError> {
        let raw: TaskFields = serde_json::from_value(Value::Object(doc.fields.clone()))
            .map_err(|source| DecodeError {
                kind: "task",
                id: doc.id.clone(),
                source,
            })?;
        Ok(Self {
            id: doc.id.clone(),
            project_id: raw.project_id,
            owner_id: doc.str_field(owner_field).unwrap_or_default().to_string(),
            title: raw.title,
            description: raw.description.filter(|s| !s.trim().is_empty()),
            due_date: raw.due_date.filter(|s| !s.trim().is_empty()),
            status: raw.status.unwrap_or_default(),
        })
    }

    /// Parsed due date. Unparseable text counts as no due date.
    #[must_use]
    pub fn due(&self) -> Option<NaiveDate> {
        self.due_date
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, DUE_DATE_FORMAT).ok())
    }

    pub(crate) fn status_fields(status: TaskStatus) -> Fields {
        fields(json!({ "status": status }))
    }
}

/// Input for creating a task under the selected project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    /// Defaults to [`TaskStatus::Todo`].
    pub status: Option<TaskStatus>,
}

impl NewTask {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn due(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    #[must_use]
    pub const fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Field map written on create. Absent optional fields are omitted.
    pub(crate) fn to_fields(
        &self,
        title: &str,
        description: Option<&str>,
        due_date: Option<&str>,
        project_id: &str,
        owner_field: &str,
        owner: &str,
    ) -> Fields {
        let mut out = fields(json!({
            PROJECT_FIELD: project_id,
            "title": title,
            "status": self.status.unwrap_or_default(),
        }));
        out.insert(owner_field.to_string(), json!(owner));
        if let Some(description) = description {
            out.insert("description".to_string(), json!(description));
        }
        if let Some(due_date) = due_date {
            out.insert("dueDate".to_string(), json!(due_date));
        }
        out
    }
}

/// Editable task fields. Status is changed only through toggling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
}

impl TaskEdit {
    /// Field map written on update. Absent optional fields are cleared.
    pub(crate) fn to_fields(title: &str, description: Option<&str>, due_date: Option<&str>) -> Fields {
        fields(json!({
            "title": title,
            "description": description,
            "dueDate": due_date,
        }))
    }
}
