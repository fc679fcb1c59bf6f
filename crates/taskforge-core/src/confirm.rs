//! Interactive confirmation seam for destructive operations.

use std::fmt;

/// What the user is being asked to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmRequest<'a> {
    /// Delete one task. Carries the task title when it is known.
    DeleteTask { title: Option<&'a str> },
    /// Delete a project and every task in it.
    DeleteProject { name: Option<&'a str> },
}

impl fmt::Display for ConfirmRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteTask { title: Some(title) } => write!(f, "Delete task '{title}'?"),
            Self::DeleteTask { title: None } => f.write_str("Delete this task?"),
            Self::DeleteProject { name: Some(name) } => {
                write!(f, "Delete project '{name}' and ALL of its tasks?")
            }
            Self::DeleteProject { name: None } => {
                f.write_str("Delete this project and ALL of its tasks?")
            }
        }
    }
}

/// Asks the user a yes/no question. Returning `false` aborts silently.
pub trait Confirm {
    fn confirm(&self, request: &ConfirmRequest<'_>) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&ConfirmRequest<'_>) -> bool,
{
    fn confirm(&self, request: &ConfirmRequest<'_>) -> bool {
        self(request)
    }
}

/// Fixed answer, for non-interactive callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Always(pub bool);

impl Confirm for Always {
    fn confirm(&self, _request: &ConfirmRequest<'_>) -> bool {
        self.0
    }
}
