//! taskforge-sim library.
//!
//! Drives several devices, each with its own sync layer, against one shared
//! in-memory store. Every step picks a device and an action from a seeded
//! RNG, optionally plants documents the way older clients wrote them, and
//! optionally injects a commit failure into project deletion. After every
//! step the [`oracle::MirrorOracle`] compares each device's mirrors with the
//! store.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod device;
pub mod oracle;
pub mod rng;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskforge_core::config::CollectionConfig;
use taskforge_core::confirm::Always;
use taskforge_core::identity::Identity;
use taskforge_core::model::{NewTask, PROJECT_FIELD, TaskEdit, TaskStatus};
use taskforge_core::store::memory::{FailPoint, InMemoryStore};
use taskforge_core::store::{StoreError, fields};
use taskforge_core::sync::{CascadeReport, Outcome};
use taskforge_core::{SyncConfig, SyncError};
use tracing::{debug, info, warn};

use crate::device::{DeviceId, DeviceState, SimulatedDevice};
use crate::oracle::{InvariantViolation, MirrorOracle};
use crate::rng::DeterministicRng;

/// Owner tag carried by documents from accounts that no longer exist.
const RETIRED_OWNER: &str = "retired-account";
/// Share of select actions that clear the selection instead.
const DESELECT_PERCENT: u8 = 20;

/// Parameters for one seeded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub device_count: usize,
    /// Devices are assigned to accounts round-robin, so several devices can
    /// share one account.
    pub user_count: usize,
    pub steps: u64,
    /// Chance that a project deletion meets an injected commit failure.
    pub commit_fault_percent: u8,
    /// Chance per step of planting a task with a missing or stale owner tag.
    pub legacy_write_percent: u8,
    pub fold_repairs: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            device_count: 3,
            user_count: 2,
            steps: 64,
            commit_fault_percent: 20,
            legacy_write_percent: 10,
            fold_repairs: false,
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.device_count == 0 {
            bail!("device_count must be > 0");
        }
        if self.user_count == 0 {
            bail!("user_count must be > 0");
        }
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        if self.commit_fault_percent > 100 || self.legacy_write_percent > 100 {
            bail!("percentages must be within 0..=100");
        }
        Ok(())
    }
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub step: u64,
    pub device: DeviceId,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    SignIn,
    SignOut,
    CreateProject { project: String },
    RenameProject { project: String },
    SelectProject { project: String },
    DeselectProject,
    CreateTask { task: String, project: String },
    EditTask { task: String },
    ToggleTask { task: String, status: TaskStatus },
    DeleteTask { task: String },
    DeleteProject { project: String, report: CascadeReport },
    /// Deletion stopped by an injected commit failure.
    DeleteProjectFailed { project: String, error: String },
    /// A task planted with a missing or foreign owner tag.
    LegacyWrite { task: String, project: String },
    /// The operation returned a guarded no-op.
    Skipped { action: String, reason: String },
    /// Nothing to act on.
    Idle { action: String },
}

/// A violation and the step after which it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepViolation {
    pub step: u64,
    pub violation: InvariantViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub states: Vec<DeviceState>,
    pub violations: Vec<StepViolation>,
    /// A deletion needed repairs or hit an injected failure.
    pub interesting_state_reached: bool,
    pub projects_remaining: usize,
    pub tasks_remaining: usize,
}

impl SimulationResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    SignOut,
    CreateProject,
    RenameProject,
    SelectProject,
    CreateTask,
    EditTask,
    ToggleTask,
    DeleteTask,
    DeleteProject,
}

impl Action {
    const ALL: [Self; 9] = [
        Self::SignOut,
        Self::CreateProject,
        Self::RenameProject,
        Self::SelectProject,
        Self::CreateTask,
        Self::EditTask,
        Self::ToggleTask,
        Self::DeleteTask,
        Self::DeleteProject,
    ];
    const WEIGHTS: [u32; 9] = [2, 6, 2, 3, 10, 3, 6, 3, 3];

    const fn name(self) -> &'static str {
        match self {
            Self::SignOut => "sign_out",
            Self::CreateProject => "create_project",
            Self::RenameProject => "rename_project",
            Self::SelectProject => "select_project",
            Self::CreateTask => "create_task",
            Self::EditTask => "edit_task",
            Self::ToggleTask => "toggle_task",
            Self::DeleteTask => "delete_task",
            Self::DeleteProject => "delete_project",
        }
    }
}

/// Deterministic multi-device simulator.
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    store: InMemoryStore,
    collections: CollectionConfig,
    oracle: MirrorOracle,
    devices: Vec<SimulatedDevice>,
    trace: Vec<TraceEvent>,
    violations: Vec<StepViolation>,
    next_label: u64,
    interesting: bool,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let store = InMemoryStore::with_seed(config.seed);
        store.enforce_owner_rules(true);

        let mut core = SyncConfig::default();
        core.cascade.fold_repairs = config.fold_repairs;
        let devices = (0..config.device_count)
            .map(|id| {
                let user = Identity::new(format!("user-{}", id % config.user_count));
                SimulatedDevice::new(id, user, store.clone(), core.clone())
            })
            .collect();

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            oracle: MirrorOracle::new(core.collections.clone()),
            collections: core.collections,
            config,
            store,
            devices,
            trace: Vec::new(),
            violations: Vec::new(),
            next_label: 0,
            interesting: false,
        })
    }

    /// Run every step and return the trace, final device states and any
    /// invariant violations.
    ///
    /// # Errors
    ///
    /// Reserved for harness failures; invariant violations are reported in
    /// the result.
    pub fn run(&mut self) -> Result<SimulationResult> {
        info!(
            seed = self.config.seed,
            devices = self.config.device_count,
            steps = self.config.steps,
            fold_repairs = self.config.fold_repairs,
            "simulation started"
        );

        for idx in 0..self.devices.len() {
            let kind = self.sign_in(idx);
            self.record(0, idx, kind);
        }
        self.check(0);

        for step in 1..=self.config.steps {
            self.step(step);
        }

        let result = SimulationResult {
            seed: self.config.seed,
            trace: self.trace.clone(),
            states: self.devices.iter().map(SimulatedDevice::snapshot).collect(),
            violations: self.violations.clone(),
            interesting_state_reached: self.interesting,
            projects_remaining: self.store.dump(&self.collections.projects).len(),
            tasks_remaining: self.store.dump(&self.collections.tasks).len(),
        };
        info!(
            seed = result.seed,
            trace_events = result.trace.len(),
            violations = result.violations.len(),
            "simulation complete"
        );
        Ok(result)
    }

    fn step(&mut self, step: u64) {
        let idx = self.rng.next_index(self.devices.len());
        let user = self.devices[idx].user().clone();
        self.store.set_principal(Some(user.as_str()));

        if self.rng.hit_rate_percent(self.config.legacy_write_percent) {
            if let Some(kind) = self.legacy_write() {
                self.record(step, idx, kind);
            }
        }

        let kind = if self.devices[idx].layer().identity().is_none() {
            self.sign_in(idx)
        } else {
            let action = Action::ALL[self.rng.weighted(&Action::WEIGHTS)];
            self.act(step, idx, action)
        };
        self.record(step, idx, kind);
        self.check(step);
    }

    fn record(&mut self, step: u64, device: DeviceId, kind: TraceEventKind) {
        debug!(step, device, ?kind, "step");
        self.trace.push(TraceEvent { step, device, kind });
    }

    fn check(&mut self, step: u64) {
        let result = self.oracle.check_all(&self.store, &self.devices);
        for violation in result.violations {
            warn!(step, %violation, "invariant violated");
            self.violations.push(StepViolation { step, violation });
        }
    }

    fn label(&mut self, prefix: &str) -> String {
        self.next_label += 1;
        format!("{prefix} {}", self.next_label)
    }

    fn unexpected(&mut self, step: u64, device: DeviceId, action: Action, err: &SyncError) -> TraceEventKind {
        self.violations.push(StepViolation {
            step,
            violation: InvariantViolation::UnexpectedError {
                device,
                action: action.name().to_string(),
                error: err.to_string(),
            },
        });
        TraceEventKind::Skipped {
            action: action.name().to_string(),
            reason: format!("error: {err}"),
        }
    }

    fn sign_in(&self, idx: usize) -> TraceEventKind {
        let device = &self.devices[idx];
        match device.layer().set_identity(Some(device.user().clone())) {
            Ok(()) => TraceEventKind::SignIn,
            Err(err) => TraceEventKind::Skipped {
                action: "sign_in".to_string(),
                reason: err.to_string(),
            },
        }
    }

    /// Plant a task the way an older client would have written it.
    fn legacy_write(&mut self) -> Option<TraceEventKind> {
        let docs = self.store.dump(&self.collections.projects);
        let project = self.rng.pick(&docs)?.id.clone();
        let title = self.label("imported");
        let mut doc = fields(json!({ PROJECT_FIELD: project, "title": title }));
        if self.rng.hit_rate_percent(50) {
            doc.insert(self.collections.owner_field.clone(), json!(RETIRED_OWNER));
        }
        let task = self.store.seed_document(&self.collections.tasks, doc);
        Some(TraceEventKind::LegacyWrite { task, project })
    }

    fn act(&mut self, step: u64, idx: usize, action: Action) -> TraceEventKind {
        match self.try_act(step, idx, action) {
            Ok(kind) => kind,
            Err(err) => self.unexpected(step, idx, action, &err),
        }
    }

    fn try_act(&mut self, step: u64, idx: usize, action: Action) -> Result<TraceEventKind, SyncError> {
        let view = self.devices[idx].view();
        let project = self.rng.pick(&view.projects).map(|p| p.id.clone());
        let task = self.rng.pick(&view.tasks).map(|t| t.id.clone());
        let idle = || TraceEventKind::Idle {
            action: action.name().to_string(),
        };

        let kind = match action {
            Action::SignOut => {
                self.devices[idx].layer().set_identity(None)?;
                TraceEventKind::SignOut
            }
            Action::CreateProject => {
                let name = self.label("project");
                match self.devices[idx].layer().create_project(&name)? {
                    Outcome::Applied(project) => TraceEventKind::CreateProject { project },
                    Outcome::Skipped(skip) => skipped(action, &skip),
                }
            }
            Action::RenameProject => {
                let Some(project) = project else { return Ok(idle()) };
                let name = self.label("renamed");
                match self.devices[idx].layer().update_project(&project, &name)? {
                    Outcome::Applied(()) => TraceEventKind::RenameProject { project },
                    Outcome::Skipped(skip) => skipped(action, &skip),
                }
            }
            Action::SelectProject => {
                if self.rng.hit_rate_percent(DESELECT_PERCENT) {
                    self.devices[idx].layer().select_project(None)?;
                    return Ok(TraceEventKind::DeselectProject);
                }
                let Some(project) = project else { return Ok(idle()) };
                self.devices[idx].layer().select_project(Some(&project))?;
                TraceEventKind::SelectProject { project }
            }
            Action::CreateTask => {
                let input = self.new_task();
                let layer = self.devices[idx].layer();
                match layer.create_task(&input)? {
                    Outcome::Applied(task) => TraceEventKind::CreateTask {
                        task,
                        project: layer.selected_project().unwrap_or_default(),
                    },
                    Outcome::Skipped(skip) => skipped(action, &skip),
                }
            }
            Action::EditTask => {
                let Some(task) = task else { return Ok(idle()) };
                let edit = TaskEdit {
                    title: self.label("edited"),
                    description: self.rng.hit_rate_percent(50).then(|| "notes".to_string()),
                    due_date: self.due_date(),
                };
                match self.devices[idx].layer().update_task(&task, &edit)? {
                    Outcome::Applied(()) => TraceEventKind::EditTask { task },
                    Outcome::Skipped(skip) => skipped(action, &skip),
                }
            }
            Action::ToggleTask => {
                let Some(task) = task else { return Ok(idle()) };
                match self.devices[idx].layer().toggle_task_status(&task)? {
                    Outcome::Applied(status) => TraceEventKind::ToggleTask { task, status },
                    Outcome::Skipped(skip) => skipped(action, &skip),
                }
            }
            Action::DeleteTask => {
                let Some(task) = task else { return Ok(idle()) };
                match self.devices[idx].layer().delete_task(&task, &Always(true))? {
                    Outcome::Applied(()) => TraceEventKind::DeleteTask { task },
                    Outcome::Skipped(skip) => skipped(action, &skip),
                }
            }
            Action::DeleteProject => {
                let Some(project) = project else { return Ok(idle()) };
                return self.delete_project(step, idx, project);
            }
        };
        Ok(kind)
    }

    fn delete_project(
        &mut self,
        step: u64,
        idx: usize,
        project: String,
    ) -> Result<TraceEventKind, SyncError> {
        let inject = self.rng.hit_rate_percent(self.config.commit_fault_percent);
        let tasks_before = self.oracle.tasks_referencing(&self.store, &project);
        if inject {
            self.store.fail_next(
                FailPoint::Commit,
                StoreError::Unavailable("injected commit failure".to_string()),
            );
        }

        let outcome = self.devices[idx]
            .layer()
            .delete_project(&project, &Always(true));
        self.store.clear_faults();

        match outcome {
            Ok(Outcome::Applied(report)) => {
                if report.project_repaired || report.tasks_repaired > 0 {
                    self.interesting = true;
                }
                Ok(TraceEventKind::DeleteProject { project, report })
            }
            Ok(Outcome::Skipped(skip)) => Ok(skipped(Action::DeleteProject, &skip)),
            Err(SyncError::Store(err @ StoreError::Unavailable(_))) if inject => {
                self.interesting = true;
                let check = self
                    .oracle
                    .check_failed_cascade(&self.store, &project, tasks_before);
                self.violations.extend(
                    check
                        .violations
                        .into_iter()
                        .map(|violation| StepViolation { step, violation }),
                );
                Ok(TraceEventKind::DeleteProjectFailed {
                    project,
                    error: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    fn new_task(&mut self) -> NewTask {
        let mut input = NewTask::titled(self.label("task"));
        if let Some(due) = self.due_date() {
            input = input.due(due);
        }
        if self.rng.hit_rate_percent(10) {
            input = input.status(TaskStatus::InProgress);
        }
        input
    }

    fn due_date(&mut self) -> Option<String> {
        if !self.rng.hit_rate_percent(60) {
            return None;
        }
        let month = self.rng.next_bounded(12) + 1;
        let day = self.rng.next_bounded(28) + 1;
        Some(format!("2026-{month:02}-{day:02}"))
    }
}

fn skipped(action: Action, skip: &taskforge_core::sync::Skip) -> TraceEventKind {
    TraceEventKind::Skipped {
        action: action.name().to_string(),
        reason: format!("{skip:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configs_are_rejected() {
        for config in [
            SimulationConfig {
                device_count: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                user_count: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                steps: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                commit_fault_percent: 101,
                ..SimulationConfig::default()
            },
        ] {
            assert!(Simulator::new(config).is_err());
        }
    }

    #[test]
    fn default_run_passes() {
        let mut sim = Simulator::new(SimulationConfig::default()).expect("valid config");
        let result = sim.run().expect("run");
        assert!(result.passed(), "{:?}", result.violations);
        assert_eq!(result.states.len(), 3);
        assert!(result.trace.len() >= 64);
    }

    #[test]
    fn same_seed_same_trace() {
        let config = SimulationConfig {
            seed: 17,
            ..SimulationConfig::default()
        };
        let a = Simulator::new(config.clone()).expect("config").run().expect("run");
        let b = Simulator::new(config).expect("config").run().expect("run");
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.states, b.states);
    }

    #[test]
    fn devices_share_accounts_round_robin() {
        let sim = Simulator::new(SimulationConfig {
            device_count: 4,
            user_count: 2,
            ..SimulationConfig::default()
        })
        .expect("config");
        let users: Vec<&str> = sim.devices.iter().map(|d| d.user().as_str()).collect();
        assert_eq!(users, vec!["user-0", "user-1", "user-0", "user-1"]);
    }
}
