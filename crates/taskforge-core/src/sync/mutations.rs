use tracing::info;

use super::{Outcome, Skip, SyncLayer};
use crate::confirm::{Confirm, ConfirmRequest};
use crate::error::SyncError;
use crate::model::{
    NewTask, Project, Task, TaskEdit, TaskStatus, optional_due_date, optional_text, required_text,
};
use crate::store::RemoteStore;

impl<S: RemoteStore + 'static> SyncLayer<S> {
    /// Create a project owned by the signed-in identity.
    ///
    /// The new project reaches the mirror through the project subscription.
    /// It becomes the selection only when it is the first mirrored project.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for a blank name, [`SyncError::Store`]
    /// when the write fails.
    pub fn create_project(&self, name: &str) -> Result<Outcome<String>, SyncError> {
        let Some(identity) = self.signed_in() else {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        };
        let name = required_text("project name", name)?;

        let id = self.inner.store.add_document(
            &self.collections().projects,
            Project::create_fields(&name, &self.collections().owner_field, identity.as_str()),
        )?;
        info!(project = %id, "project created");
        Ok(Outcome::Applied(id))
    }

    /// Rename a project in the mirror.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for a blank name, [`SyncError::Store`]
    /// when the write fails.
    pub fn update_project(&self, project_id: &str, name: &str) -> Result<Outcome<()>, SyncError> {
        if self.signed_in().is_none() {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        }
        let name = required_text("project name", name)?;
        if !self.state().projects.iter().any(|p| p.id == project_id) {
            return Ok(Outcome::Skipped(Skip::UnknownProject(project_id.to_string())));
        }

        self.inner.store.update_document(
            &self.collections().projects,
            project_id,
            Project::rename_fields(&name),
        )?;
        info!(project = %project_id, "project renamed");
        Ok(Outcome::Applied(()))
    }

    /// Create a task under the selected project. Status defaults to todo.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for a blank title or a malformed due
    /// date, [`SyncError::Store`] when the write fails.
    pub fn create_task(&self, input: &NewTask) -> Result<Outcome<String>, SyncError> {
        let Some(identity) = self.signed_in() else {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        };
        let Some(project_id) = self.selected_project() else {
            return Ok(Outcome::Skipped(Skip::NoProjectSelected));
        };
        let title = required_text("task title", &input.title)?;
        let description = optional_text(input.description.as_deref());
        let due_date = optional_due_date(input.due_date.as_deref())?;

        let id = self.inner.store.add_document(
            &self.collections().tasks,
            input.to_fields(
                &title,
                description.as_deref(),
                due_date.as_deref(),
                &project_id,
                &self.collections().owner_field,
                identity.as_str(),
            ),
        )?;
        info!(task = %id, project = %project_id, "task created");
        Ok(Outcome::Applied(id))
    }

    /// Overwrite a task's title, description and due date. Absent optional
    /// fields are cleared remotely; status and ownership are untouched.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for a blank title or a malformed due
    /// date, [`SyncError::Store`] when the write fails.
    pub fn update_task(&self, task_id: &str, edit: &TaskEdit) -> Result<Outcome<()>, SyncError> {
        if self.signed_in().is_none() {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        }
        let title = required_text("task title", &edit.title)?;
        let description = optional_text(edit.description.as_deref());
        let due_date = optional_due_date(edit.due_date.as_deref())?;
        if !self.state().tasks.iter().any(|t| t.id == task_id) {
            return Ok(Outcome::Skipped(Skip::UnknownTask(task_id.to_string())));
        }

        self.inner.store.update_document(
            &self.collections().tasks,
            task_id,
            TaskEdit::to_fields(&title, description.as_deref(), due_date.as_deref()),
        )?;
        info!(task = %task_id, "task updated");
        Ok(Outcome::Applied(()))
    }

    /// Flip a task between done and todo, based on its mirrored status.
    /// In-progress tasks become done.
    ///
    /// # Errors
    ///
    /// [`SyncError::Store`] when the write fails.
    pub fn toggle_task_status(&self, task_id: &str) -> Result<Outcome<TaskStatus>, SyncError> {
        if self.signed_in().is_none() {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        }
        let current = self
            .state()
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .map(|t| t.status);
        let Some(current) = current else {
            return Ok(Outcome::Skipped(Skip::UnknownTask(task_id.to_string())));
        };

        let next = current.toggled();
        self.inner.store.update_document(
            &self.collections().tasks,
            task_id,
            Task::status_fields(next),
        )?;
        info!(task = %task_id, from = %current, to = %next, "task status toggled");
        Ok(Outcome::Applied(next))
    }

    /// Delete one task after confirmation.
    ///
    /// # Errors
    ///
    /// [`SyncError::Store`] when the delete fails.
    pub fn delete_task(&self, task_id: &str, confirm: &impl Confirm) -> Result<Outcome<()>, SyncError> {
        if self.signed_in().is_none() {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        }
        let title = self
            .state()
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .map(|t| t.title.clone());
        if !confirm.confirm(&ConfirmRequest::DeleteTask {
            title: title.as_deref(),
        }) {
            info!(task = %task_id, "task deletion declined");
            return Ok(Outcome::Skipped(Skip::Declined));
        }

        self.inner
            .store
            .delete_document(&self.collections().tasks, task_id)?;
        info!(task = %task_id, "task deleted");
        Ok(Outcome::Applied(()))
    }
}
