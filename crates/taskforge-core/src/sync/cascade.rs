//! Project deletion: repair ownership tags, then delete the project and all
//! of its tasks in one atomic batch.
//!
//! Deletes are authorised against the owner field, and documents written by older
//! clients may carry a missing or foreign tag. Every such document is
//! re-tagged with the current identity first. With
//! [`CascadeConfig::fold_repairs`](crate::config::CascadeConfig) the repairs
//! travel in the delete batch instead of as separate writes.
//!
//! A failed commit leaves the repairs in place and deletes nothing.

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::{Outcome, Skip, SyncLayer};
use crate::confirm::{Confirm, ConfirmRequest};
use crate::error::SyncError;
use crate::model::PROJECT_FIELD;
use crate::store::{BatchOp, Fields, Query, RemoteStore, StoreError};

/// What a completed project deletion touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// The project document's ownership tag was rewritten.
    pub project_repaired: bool,
    /// Tasks whose ownership tag was rewritten.
    pub tasks_repaired: usize,
    /// Tasks removed by the batch.
    pub tasks_deleted: usize,
}

impl<S: RemoteStore + 'static> SyncLayer<S> {
    /// Delete a project and every task that references it.
    ///
    /// # Errors
    ///
    /// [`SyncError::Store`] from any read, repair or the final commit. Repairs
    /// already written are not rolled back.
    pub fn delete_project(
        &self,
        project_id: &str,
        confirm: &impl Confirm,
    ) -> Result<Outcome<CascadeReport>, SyncError> {
        let Some(identity) = self.signed_in() else {
            return Ok(Outcome::Skipped(Skip::SignedOut));
        };
        let name = self
            .state()
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .map(|p| p.name.clone());
        if !confirm.confirm(&ConfirmRequest::DeleteProject {
            name: name.as_deref(),
        }) {
            info!(project = %project_id, "project deletion declined");
            return Ok(Outcome::Skipped(Skip::Declined));
        }

        let store = &self.inner.store;
        let collections = self.collections();
        let owner = identity.as_str();
        let mut repairs = Repairs::new(
            self.inner.config.cascade.fold_repairs,
            &collections.owner_field,
        );
        let mut report = CascadeReport::default();

        if let Some(project) = store.get_document(&collections.projects, project_id)? {
            let tag = project.str_field(&collections.owner_field);
            if tag != Some(owner) {
                warn!(project = %project_id, found = ?tag, "repairing project owner before delete");
                repairs.apply(store, &collections.projects, project_id, owner)?;
                report.project_repaired = true;
            }
        }

        let tasks = store.get_documents(
            &Query::collection(&collections.tasks).where_eq(PROJECT_FIELD, project_id),
        )?;
        for task in &tasks {
            let tag = task.str_field(&collections.owner_field);
            if tag != Some(owner) {
                warn!(task = %task.id, project = %project_id, found = ?tag, "repairing task owner before delete");
                repairs.apply(store, &collections.tasks, &task.id, owner)?;
                report.tasks_repaired += 1;
            }
        }

        let mut batch = repairs.into_batch();
        batch.extend(
            tasks
                .iter()
                .map(|task| BatchOp::delete(&collections.tasks, &task.id)),
        );
        batch.push(BatchOp::delete(&collections.projects, project_id));
        store.commit_batch(batch)?;
        report.tasks_deleted = tasks.len();
        info!(
            project = %project_id,
            tasks_deleted = report.tasks_deleted,
            tasks_repaired = report.tasks_repaired,
            project_repaired = report.project_repaired,
            "project deleted"
        );

        let cleared = {
            let mut state = self.state();
            if state.selected.as_deref() == Some(project_id) {
                state.selected = None;
                state.touch();
                true
            } else {
                false
            }
        };
        if cleared {
            self.refresh_tasks()?;
        }

        Ok(Outcome::Applied(report))
    }
}

/// Ownership patches, written immediately or held for the delete batch.
struct Repairs<'a> {
    owner_field: &'a str,
    folded: Option<Vec<BatchOp>>,
}

impl<'a> Repairs<'a> {
    fn new(fold: bool, owner_field: &'a str) -> Self {
        Self {
            owner_field,
            folded: fold.then(Vec::new),
        }
    }

    fn apply<S: RemoteStore>(
        &mut self,
        store: &S,
        collection: &str,
        id: &str,
        owner: &str,
    ) -> Result<(), StoreError> {
        let mut patch = Fields::new();
        patch.insert(self.owner_field.to_string(), json!(owner));
        match &mut self.folded {
            Some(batch) => {
                batch.push(BatchOp::update(collection, id, patch));
                Ok(())
            }
            None => store.update_document(collection, id, patch),
        }
    }

    fn into_batch(self) -> Vec<BatchOp> {
        self.folded.unwrap_or_default()
    }
}
