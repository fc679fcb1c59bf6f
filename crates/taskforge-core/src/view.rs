//! Read-side helpers for the task list: status filtering, due-date sorting
//! and point-in-time copies of the mirrors.

use std::cmp::Ordering;

use serde::Serialize;

use crate::identity::Identity;
use crate::model::{Project, Task, TaskStatus};

/// Which tasks a list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TaskStatus),
}

impl StatusFilter {
    #[must_use]
    pub fn accepts(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Only(status) => task.status == status,
        }
    }
}

/// Due-date ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Compare by due date, treating a missing or unparseable date as later
/// than every real date.
fn compare_due(a: &Task, b: &Task) -> Ordering {
    match (a.due(), b.due()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Filter by status, then sort by due date.
///
/// Ascending puts undated tasks last, descending puts them first. The sort
/// is stable, so tasks with equal dates keep mirror order.
#[must_use]
pub fn filter_and_sort(tasks: &[Task], filter: StatusFilter, order: SortOrder) -> Vec<&Task> {
    let mut out: Vec<&Task> = tasks.iter().filter(|t| filter.accepts(t)).collect();
    match order {
        SortOrder::Ascending => out.sort_by(|a, b| compare_due(a, b)),
        SortOrder::Descending => out.sort_by(|a, b| compare_due(b, a)),
    }
    out
}

/// Point-in-time copy of everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorView {
    pub identity: Option<Identity>,
    pub selected_project: Option<String>,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    /// Increments on every mirror or selection change.
    pub revision: u64,
    /// Increments on every identity change. Work started under an older
    /// epoch belongs to a previous session.
    pub session_epoch: u64,
}

impl MirrorView {
    /// The selected project, when it is present in the mirror.
    #[must_use]
    pub fn selected(&self) -> Option<&Project> {
        let id = self.selected_project.as_deref()?;
        self.projects.iter().find(|p| p.id == id)
    }

    /// Tasks ready for display.
    #[must_use]
    pub fn visible_tasks(&self, filter: StatusFilter, order: SortOrder) -> Vec<&Task> {
        filter_and_sort(&self.tasks, filter, order)
    }
}
