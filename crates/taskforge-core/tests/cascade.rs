//! Project deletion against a store that enforces ownership on deletes.

use std::sync::Mutex;

use serde_json::json;
use taskforge_core::config::SyncConfig;
use taskforge_core::confirm::{Always, Confirm, ConfirmRequest};
use taskforge_core::identity::Identity;
use taskforge_core::model::{DEFAULT_OWNER_FIELD, PROJECT_FIELD};
use taskforge_core::store::memory::{FailPoint, InMemoryStore};
use taskforge_core::store::{RemoteStore, StoreError, fields};
use taskforge_core::sync::{CascadeReport, Outcome, Skip, SyncLayer};
use taskforge_core::SyncError;

const SEED: u64 = 0xCA5C_ADE0;

struct Fixture {
    store: InMemoryStore,
    project: String,
}

/// One project owned by alice, with one tagged task, one untagged task and
/// one task tagged with a stale owner.
fn fixture() -> Fixture {
    let store = InMemoryStore::with_seed(SEED);
    store.enforce_owner_rules(true);
    store.set_principal(Some("alice"));
    let project = store.seed_document("projects", fields(json!({"name": "Legacy", "ownerId": "alice"})));
    store.seed_document(
        "tasks",
        fields(json!({"projectId": project, "ownerId": "alice", "title": "tagged"})),
    );
    store.seed_document("tasks", fields(json!({"projectId": project, "title": "untagged"})));
    store.seed_document(
        "tasks",
        fields(json!({"projectId": project, "ownerId": "old-uid", "title": "stale"})),
    );
    store.seed_document("tasks", fields(json!({"projectId": "elsewhere", "ownerId": "alice", "title": "other"})));
    Fixture { store, project }
}

fn layer(store: &InMemoryStore, config: SyncConfig) -> SyncLayer<InMemoryStore> {
    let layer = SyncLayer::with_config(store.clone(), config);
    layer
        .set_identity(Some(Identity::new("alice")))
        .expect("sign in");
    layer
}

fn tasks_referencing(store: &InMemoryStore, project: &str) -> usize {
    store
        .dump("tasks")
        .iter()
        .filter(|doc| doc.str_field(PROJECT_FIELD) == Some(project))
        .count()
}

#[test]
fn deletes_every_task_of_the_project_regardless_of_tag() {
    let Fixture { store, project } = fixture();
    let layer = layer(&store, SyncConfig::default());
    assert_eq!(layer.tasks().len(), 1, "mirror only shows the tagged task");

    let report = layer
        .delete_project(&project, &Always(true))
        .expect("delete")
        .applied()
        .expect("confirmed");
    assert_eq!(
        report,
        CascadeReport {
            project_repaired: false,
            tasks_repaired: 2,
            tasks_deleted: 3,
        }
    );
    assert_eq!(tasks_referencing(&store, &project), 0);
    assert!(store.dump("projects").is_empty());
    assert_eq!(store.dump("tasks").len(), 1, "unrelated task survives");
}

#[test]
fn repairs_are_separate_writes_by_default() {
    let Fixture { store, project } = fixture();
    let layer = layer(&store, SyncConfig::default());
    let before = store.stats();

    layer
        .delete_project(&project, &Always(true))
        .expect("delete");
    let after = store.stats();
    assert_eq!(after.writes - before.writes, 2);
    assert_eq!(after.batches - before.batches, 1);
    assert_eq!(after.reads - before.reads, 1);
    assert_eq!(after.queries - before.queries, 1);
}

#[test]
fn folded_repairs_travel_in_the_batch() {
    let Fixture { store, project } = fixture();
    let mut config = SyncConfig::default();
    config.cascade.fold_repairs = true;
    let layer = layer(&store, config);
    let before = store.stats();

    let report = layer
        .delete_project(&project, &Always(true))
        .expect("delete")
        .applied()
        .expect("confirmed");
    assert_eq!(report.tasks_repaired, 2);
    assert_eq!(store.stats().writes, before.writes);
    assert_eq!(tasks_referencing(&store, &project), 0);
}

#[test]
fn failed_batch_leaves_repaired_documents_in_place() {
    let Fixture { store, project } = fixture();
    let layer = layer(&store, SyncConfig::default());
    store.fail_next(FailPoint::Commit, StoreError::Unavailable("connection reset".into()));

    let err = layer
        .delete_project(&project, &Always(true))
        .expect_err("commit fails");
    assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));

    assert_eq!(store.dump("projects").len(), 1);
    assert_eq!(tasks_referencing(&store, &project), 3);
    assert!(
        store
            .dump("tasks")
            .iter()
            .all(|doc| doc.str_field(DEFAULT_OWNER_FIELD) == Some("alice")),
        "repairs are not rolled back"
    );
    assert_eq!(layer.selected_project(), Some(project.clone()));
    assert_eq!(layer.tasks().len(), 3);

    let retry = layer
        .delete_project(&project, &Always(true))
        .expect("retry")
        .applied()
        .expect("confirmed");
    assert_eq!(retry.tasks_repaired, 0);
    assert_eq!(retry.tasks_deleted, 3);
}

#[test]
fn folded_failure_writes_nothing() {
    let Fixture { store, project } = fixture();
    let mut config = SyncConfig::default();
    config.cascade.fold_repairs = true;
    let layer = layer(&store, config);
    store.fail_next(FailPoint::Commit, StoreError::Unavailable("offline".into()));

    layer
        .delete_project(&project, &Always(true))
        .expect_err("commit fails");
    let stale = store
        .dump("tasks")
        .iter()
        .filter(|doc| doc.str_field(DEFAULT_OWNER_FIELD) != Some("alice"))
        .count();
    assert_eq!(stale, 2);
}

#[test]
fn unrepaired_delete_is_rejected_by_owner_rules() {
    let Fixture { store, project } = fixture();
    let layer = layer(&store, SyncConfig::default());
    let err = store
        .dump("tasks")
        .iter()
        .find(|doc| doc.str_field(DEFAULT_OWNER_FIELD).is_none())
        .map(|doc| store.delete_document("tasks", &doc.id))
        .expect("untagged task exists")
        .expect_err("owner rule");
    assert!(matches!(err, StoreError::PermissionDenied(_)));

    // The cascade still succeeds because it repairs first.
    assert!(
        layer
            .delete_project(&project, &Always(true))
            .expect("delete")
            .is_applied()
    );
}

#[test]
fn foreign_project_tag_is_repaired() {
    let store = InMemoryStore::with_seed(SEED);
    store.enforce_owner_rules(true);
    store.set_principal(Some("alice"));
    let project = store.seed_document("projects", fields(json!({"name": "imported"})));
    let layer = layer(&store, SyncConfig::default());

    let report = layer
        .delete_project(&project, &Always(true))
        .expect("delete")
        .applied()
        .expect("confirmed");
    assert!(report.project_repaired);
    assert_eq!(report.tasks_deleted, 0);
    assert!(store.dump("projects").is_empty());
}

/// Records the prompt and declines.
struct Decline(Mutex<String>);

impl Confirm for Decline {
    fn confirm(&self, request: &ConfirmRequest<'_>) -> bool {
        *self.0.lock().expect("prompt lock") = request.to_string();
        false
    }
}

#[test]
fn confirmation_names_the_project() {
    let Fixture { store, project } = fixture();
    let layer = layer(&store, SyncConfig::default());
    let decline = Decline(Mutex::new(String::new()));

    assert_eq!(
        layer.delete_project(&project, &decline).expect("no error"),
        Outcome::Skipped(Skip::Declined)
    );
    assert_eq!(
        *decline.0.lock().expect("prompt lock"),
        "Delete project 'Legacy' and ALL of its tasks?"
    );
    assert_eq!(tasks_referencing(&store, &project), 3);
}

#[test]
fn deleting_the_selected_project_leaves_nothing_selected() {
    let Fixture { store, project } = fixture();
    let other = store.seed_document("projects", fields(json!({"name": "Keep", "ownerId": "alice"})));
    let layer = layer(&store, SyncConfig::default());
    layer.select_project(Some(&project)).expect("select");
    assert_eq!(layer.tasks().len(), 1);

    layer
        .delete_project(&project, &Always(true))
        .expect("delete")
        .applied()
        .expect("confirmed");

    assert!(layer.selected_project().is_none());
    assert!(layer.tasks().is_empty());
    let remaining: Vec<String> = layer.projects().into_iter().map(|p| p.id).collect();
    assert_eq!(remaining, vec![other]);
    assert_eq!(store.subscriber_count(), 1);
}

#[test]
fn deleting_an_unselected_project_keeps_the_selection() {
    let Fixture { store, project } = fixture();
    let other = store.seed_document("projects", fields(json!({"name": "Keep", "ownerId": "alice"})));
    let layer = layer(&store, SyncConfig::default());
    layer.select_project(Some(&other)).expect("select");

    layer
        .delete_project(&project, &Always(true))
        .expect("delete")
        .applied()
        .expect("confirmed");

    assert_eq!(layer.selected_project(), Some(other));
    assert_eq!(tasks_referencing(&store, &project), 0);
}
