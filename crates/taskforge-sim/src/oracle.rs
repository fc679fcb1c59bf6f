use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use taskforge_core::config::CollectionConfig;
use taskforge_core::model::{PROJECT_FIELD, Project, Task};
use taskforge_core::store::memory::InMemoryStore;
use taskforge_core::view::MirrorView;

use crate::device::{DeviceId, SimulatedDevice};

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic for one failed invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A device's project mirror differs from the projects its identity owns.
    ProjectMirror {
        device: DeviceId,
        /// In the store but not mirrored.
        missing: Vec<String>,
        /// Mirrored but not (or no longer) in the store.
        unexpected: Vec<String>,
        /// Present in both with different contents.
        stale: Vec<String>,
    },

    /// A device's task mirror differs from the identity's tasks in the
    /// selected project.
    TaskMirror {
        device: DeviceId,
        missing: Vec<String>,
        unexpected: Vec<String>,
        stale: Vec<String>,
    },

    /// Selection points outside the mirror, or survives sign-out.
    Selection {
        device: DeviceId,
        selected: Option<String>,
        mirrored: usize,
    },

    /// A task references a project that no longer exists.
    OrphanTask { task: String, project: String },

    /// A failed project deletion removed something.
    PartialCascade {
        project: String,
        project_present: bool,
        tasks_before: usize,
        tasks_after: usize,
    },

    /// An operation failed without an injected fault.
    UnexpectedError {
        device: DeviceId,
        action: String,
        error: String,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectMirror {
                device,
                missing,
                unexpected,
                stale,
            } => write!(
                f,
                "ProjectMirror: device {device} (missing={missing:?}, unexpected={unexpected:?}, stale={stale:?})"
            ),
            Self::TaskMirror {
                device,
                missing,
                unexpected,
                stale,
            } => write!(
                f,
                "TaskMirror: device {device} (missing={missing:?}, unexpected={unexpected:?}, stale={stale:?})"
            ),
            Self::Selection {
                device,
                selected,
                mirrored,
            } => write!(
                f,
                "Selection: device {device} selects {selected:?} with {mirrored} mirrored projects"
            ),
            Self::OrphanTask { task, project } => {
                write!(f, "OrphanTask: task {task} references missing project {project}")
            }
            Self::PartialCascade {
                project,
                project_present,
                tasks_before,
                tasks_after,
            } => write!(
                f,
                "PartialCascade: project {project} present={project_present}, tasks {tasks_before} -> {tasks_after}"
            ),
            Self::UnexpectedError {
                device,
                action,
                error,
            } => write!(f, "UnexpectedError: device {device} {action}: {error}"),
        }
    }
}

// ── Oracle ───────────────────────────────────────────────────────────────────

/// Compares device mirrors against the store's ground truth.
///
/// The in-memory store delivers snapshots synchronously, so after every step
/// each device must already agree with the store.
#[derive(Debug, Clone, Default)]
pub struct MirrorOracle {
    collections: CollectionConfig,
}

impl MirrorOracle {
    #[must_use]
    pub const fn new(collections: CollectionConfig) -> Self {
        Self { collections }
    }

    /// Every per-device check plus the global orphan check.
    #[must_use]
    pub fn check_all(&self, store: &InMemoryStore, devices: &[SimulatedDevice]) -> OracleResult {
        devices
            .iter()
            .map(|device| self.check_device(store, device))
            .fold(self.check_orphans(store), OracleResult::merge)
    }

    #[must_use]
    pub fn check_device(&self, store: &InMemoryStore, device: &SimulatedDevice) -> OracleResult {
        let view = device.view();
        let mut violations = Vec::new();

        let Some(identity) = view.identity.as_ref() else {
            if !view.projects.is_empty() || !view.tasks.is_empty() || view.selected_project.is_some() {
                violations.push(InvariantViolation::Selection {
                    device: device.id(),
                    selected: view.selected_project.clone(),
                    mirrored: view.projects.len(),
                });
            }
            return OracleResult::from_violations(violations);
        };
        let uid = identity.as_str();
        let owner_field = self.collections.owner_field.as_str();

        let expected_projects: Vec<Project> = store
            .dump(&self.collections.projects)
            .iter()
            .filter(|doc| doc.str_field(owner_field) == Some(uid))
            .filter_map(|doc| Project::from_document(doc, owner_field).ok())
            .collect();
        let (missing, unexpected, stale) =
            diff_by_id(&expected_projects, &view.projects, |p| p.id.as_str());
        if !(missing.is_empty() && unexpected.is_empty() && stale.is_empty()) {
            violations.push(InvariantViolation::ProjectMirror {
                device: device.id(),
                missing,
                unexpected,
                stale,
            });
        }

        if let Some(violation) = selection_violation(device.id(), &view) {
            violations.push(violation);
        }

        let expected_tasks: Vec<Task> = match view.selected_project.as_deref() {
            Some(project) => store
                .dump(&self.collections.tasks)
                .iter()
                .filter(|doc| {
                    doc.str_field(owner_field) == Some(uid)
                        && doc.str_field(PROJECT_FIELD) == Some(project)
                })
                .filter_map(|doc| Task::from_document(doc, owner_field).ok())
                .collect(),
            None => Vec::new(),
        };
        let (missing, unexpected, stale) =
            diff_by_id(&expected_tasks, &view.tasks, |t| t.id.as_str());
        if !(missing.is_empty() && unexpected.is_empty() && stale.is_empty()) {
            violations.push(InvariantViolation::TaskMirror {
                device: device.id(),
                missing,
                unexpected,
                stale,
            });
        }

        OracleResult::from_violations(violations)
    }

    /// No task may reference a project that does not exist.
    #[must_use]
    pub fn check_orphans(&self, store: &InMemoryStore) -> OracleResult {
        let projects: Vec<String> = store
            .dump(&self.collections.projects)
            .into_iter()
            .map(|d| d.id)
            .collect();
        let violations = store
            .dump(&self.collections.tasks)
            .into_iter()
            .filter_map(|doc| {
                let project = doc.str_field(PROJECT_FIELD)?.to_string();
                (!projects.contains(&project)).then(|| InvariantViolation::OrphanTask {
                    task: doc.id.clone(),
                    project,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// After a failed deletion the project and every task that referenced it
    /// must still be present.
    #[must_use]
    pub fn check_failed_cascade(
        &self,
        store: &InMemoryStore,
        project: &str,
        tasks_before: usize,
    ) -> OracleResult {
        let project_present = store
            .dump(&self.collections.projects)
            .iter()
            .any(|doc| doc.id == project);
        let tasks_after = self.tasks_referencing(store, project);
        if project_present && tasks_after == tasks_before {
            return OracleResult::pass();
        }
        OracleResult::from_violations(vec![InvariantViolation::PartialCascade {
            project: project.to_string(),
            project_present,
            tasks_before,
            tasks_after,
        }])
    }

    /// Tasks in the store whose `projectId` is `project`, whatever their
    /// owner.
    #[must_use]
    pub fn tasks_referencing(&self, store: &InMemoryStore, project: &str) -> usize {
        store
            .dump(&self.collections.tasks)
            .iter()
            .filter(|doc| doc.str_field(PROJECT_FIELD) == Some(project))
            .count()
    }
}

/// A selection must name a mirrored project. No selection is always valid:
/// it follows a deselect or the deletion of the selected project.
fn selection_violation(device: DeviceId, view: &MirrorView) -> Option<InvariantViolation> {
    let ok = view
        .selected_project
        .as_deref()
        .is_none_or(|selected| view.projects.iter().any(|p| p.id == selected));
    (!ok).then(|| InvariantViolation::Selection {
        device,
        selected: view.selected_project.clone(),
        mirrored: view.projects.len(),
    })
}

/// Split two collections keyed by id into missing, unexpected and stale ids.
fn diff_by_id<T: PartialEq>(
    expected: &[T],
    actual: &[T],
    key: impl Fn(&T) -> &str,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let expected: BTreeMap<&str, &T> = expected.iter().map(|v| (key(v), v)).collect();
    let actual: BTreeMap<&str, &T> = actual.iter().map(|v| (key(v), v)).collect();

    let missing = expected
        .keys()
        .filter(|id| !actual.contains_key(*id))
        .map(|id| (*id).to_string())
        .collect();
    let unexpected = actual
        .keys()
        .filter(|id| !expected.contains_key(*id))
        .map(|id| (*id).to_string())
        .collect();
    let stale = expected
        .iter()
        .filter(|(id, value)| actual.get(*id).is_some_and(|other| other != *value))
        .map(|(id, _)| (*id).to_string())
        .collect();
    (missing, unexpected, stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskforge_core::identity::Identity;
    use taskforge_core::store::fields;
    use taskforge_core::SyncConfig;

    fn device(store: &InMemoryStore, user: &str) -> SimulatedDevice {
        let device = SimulatedDevice::new(0, Identity::new(user), store.clone(), SyncConfig::default());
        device
            .layer()
            .set_identity(Some(Identity::new(user)))
            .expect("sign in");
        device
    }

    #[test]
    fn settled_device_passes() {
        let store = InMemoryStore::with_seed(1);
        let p = store.seed_document("projects", fields(json!({"name": "a", "ownerId": "u"})));
        store.seed_document("tasks", fields(json!({"projectId": p, "ownerId": "u", "title": "t"})));
        let d = device(&store, "u");
        let result = MirrorOracle::default().check_all(&store, std::slice::from_ref(&d));
        assert!(result.passed, "{:?}", result.violations);
    }

    #[test]
    fn deselected_device_with_projects_passes() {
        let store = InMemoryStore::with_seed(4);
        store.seed_document("projects", fields(json!({"name": "a", "ownerId": "u"})));
        let d = device(&store, "u");
        d.layer().select_project(None).expect("deselect");
        let result = MirrorOracle::default().check_device(&store, &d);
        assert!(result.passed, "{:?}", result.violations);
    }

    #[test]
    fn selection_outside_the_mirror_is_reported() {
        let store = InMemoryStore::with_seed(5);
        store.seed_document("projects", fields(json!({"name": "a", "ownerId": "u"})));
        let d = device(&store, "u");
        d.layer().select_project(Some("elsewhere")).expect("select");
        let result = MirrorOracle::default().check_device(&store, &d);
        assert!(result
            .violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::Selection { .. })));
    }

    #[test]
    fn orphan_tasks_are_reported() {
        let store = InMemoryStore::with_seed(2);
        store.seed_document("tasks", fields(json!({"projectId": "gone", "title": "t"})));
        let result = MirrorOracle::default().check_orphans(&store);
        assert!(!result.passed);
        assert!(matches!(
            &result.violations[0],
            InvariantViolation::OrphanTask { project, .. } if project == "gone"
        ));
    }

    #[test]
    fn partial_cascade_is_reported() {
        let store = InMemoryStore::with_seed(3);
        let p = store.seed_document("projects", fields(json!({"name": "a"})));
        store.seed_document("tasks", fields(json!({"projectId": p, "title": "t"})));
        let oracle = MirrorOracle::default();
        assert!(oracle.check_failed_cascade(&store, &p, 1).passed);
        assert!(!oracle.check_failed_cascade(&store, &p, 2).passed);
    }

    #[test]
    fn diff_separates_missing_unexpected_and_stale() {
        let expected = vec![("a", 1), ("b", 2), ("c", 3)];
        let actual = vec![("b", 2), ("c", 4), ("d", 5)];
        let (missing, unexpected, stale) = diff_by_id(&expected, &actual, |v| v.0);
        assert_eq!(missing, vec!["a"]);
        assert_eq!(unexpected, vec!["d"]);
        assert_eq!(stale, vec!["c"]);
    }

    #[test]
    fn violations_render_readably() {
        let v = InvariantViolation::OrphanTask {
            task: "t1".into(),
            project: "p1".into(),
        };
        assert_eq!(v.to_string(), "OrphanTask: task t1 references missing project p1");
    }
}
