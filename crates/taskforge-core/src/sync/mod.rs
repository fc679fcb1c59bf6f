//! The sync layer: mirrors of remote collections kept current by live
//! subscriptions, plus the mutation operations the presentation layer calls.
//!
//! # Subscriptions
//!
//! | Feed | Open while | Query |
//! |---|---|---|
//! | projects | signed in | `owner == identity` |
//! | tasks | signed in and a project is selected | `projectId == selected && owner == identity` |
//!
//! `owner` is [`CollectionConfig::owner_field`], `ownerId` by default.
//!
//! # Selection
//!
//! The first project is auto-selected only when the project mirror goes from
//! empty to non-empty with nothing selected. A selected project that leaves
//! the mirror clears the selection, and an explicit `select_project(None)`
//! stays in force across later snapshots.
//!
//! Every snapshot replaces its mirror wholesale. Writes never touch the
//! mirrors directly; the store echoes them back through the subscriptions.
//!
//! # Locking
//!
//! All mutable state sits behind one mutex that is never held while calling
//! into the store: a store may deliver snapshots synchronously on the
//! calling thread, and the snapshot handlers take the same mutex. Each feed
//! carries a token; a snapshot from a subscription that has since been
//! replaced is dropped.

mod cascade;
mod mutations;

pub use cascade::CascadeReport;

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::config::{CollectionConfig, SyncConfig};
use crate::error::SyncError;
use crate::identity::{Identity, IdentityProvider};
use crate::listener::{ListenerHandle, lock};
use crate::model::{DecodeError, PROJECT_FIELD, Project, Task};
use crate::session::Session;
use crate::store::{Document, Query, RemoteStore, SnapshotListener};
use crate::view::MirrorView;

/// Result of a guarded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The write was acknowledged by the store.
    Applied(T),
    /// A guard stopped the operation before anything was written.
    Skipped(Skip),
}

impl<T> Outcome<T> {
    /// The applied value, if any.
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub const fn skip_reason(&self) -> Option<&Skip> {
        match self {
            Self::Applied(_) => None,
            Self::Skipped(skip) => Some(skip),
        }
    }
}

/// Why a mutation did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// No identity is signed in.
    SignedOut,
    /// Task creation needs a selected project.
    NoProjectSelected,
    /// The project id is not in the project mirror.
    UnknownProject(String),
    /// The task id is not in the task mirror.
    UnknownTask(String),
    /// The user declined the confirmation prompt.
    Declined,
}

#[derive(Clone, Copy, Debug)]
enum FeedKind {
    Projects,
    Tasks,
}

/// One subscription slot. Snapshots are accepted only for `token`.
#[derive(Default)]
struct Feed {
    token: Option<u64>,
    handle: Option<ListenerHandle>,
}

impl Feed {
    /// Stop accepting snapshots and hand back the registration so the
    /// caller can drop it outside the state lock.
    fn retire(&mut self) -> Option<ListenerHandle> {
        self.token = None;
        self.handle.take()
    }
}

#[derive(Default)]
struct State {
    session: Session,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    selected: Option<String>,
    revision: u64,
    project_feed: Feed,
    task_feed: Feed,
    next_token: u64,
}

impl State {
    fn feed_mut(&mut self, kind: FeedKind) -> &mut Feed {
        match kind {
            FeedKind::Projects => &mut self.project_feed,
            FeedKind::Tasks => &mut self.task_feed,
        }
    }

    fn arm(&mut self, kind: FeedKind) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.feed_mut(kind).token = Some(token);
        token
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

struct Inner<S> {
    store: S,
    config: SyncConfig,
    state: Mutex<State>,
}

/// Mirrors and mutations on behalf of the signed-in identity.
///
/// Cheap to clone; clones share mirrors and subscriptions. Subscriptions are
/// torn down when the last clone is dropped.
pub struct SyncLayer<S: RemoteStore + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: RemoteStore + 'static> Clone for SyncLayer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RemoteStore + 'static> SyncLayer<S> {
    /// Signed-out layer with default configuration.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    #[must_use]
    pub fn with_config(store: S, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    fn collections(&self) -> &CollectionConfig {
        &self.inner.config.collections
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state().session.identity().cloned()
    }

    /// Project mirror. Order follows the last snapshot and is not stable.
    #[must_use]
    pub fn projects(&self) -> Vec<Project> {
        self.state().projects.clone()
    }

    /// Task mirror for the selected project.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    #[must_use]
    pub fn selected_project(&self) -> Option<String> {
        self.state().selected.clone()
    }

    /// Counter bumped on every mirror or selection change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    /// Counter bumped on every identity change.
    #[must_use]
    pub fn session_epoch(&self) -> u64 {
        self.state().session.epoch()
    }

    /// Consistent copy of identity, selection and both mirrors.
    #[must_use]
    pub fn view(&self) -> MirrorView {
        let state = self.state();
        MirrorView {
            identity: state.session.identity().cloned(),
            selected_project: state.selected.clone(),
            projects: state.projects.clone(),
            tasks: state.tasks.clone(),
            revision: state.revision,
            session_epoch: state.session.epoch(),
        }
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Follow `provider`'s identity changes until the handle is dropped.
    ///
    /// The provider fires once on registration, so the layer picks up an
    /// existing session immediately.
    #[must_use]
    pub fn bind_identity<P: IdentityProvider + ?Sized>(&self, provider: &P) -> ListenerHandle {
        let weak = Arc::downgrade(&self.inner);
        provider.subscribe(Box::new(move |identity| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(err) = (Self { inner }).set_identity(identity) {
                error!(error = %err, code = %err.code(), "identity change left subscriptions closed");
            }
        }))
    }

    /// Replace the session identity.
    ///
    /// Any change clears both mirrors and the selection and closes both
    /// subscriptions; a non-null identity then opens a fresh project
    /// subscription. Re-delivering the current identity does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the project subscription cannot be
    /// opened.
    pub fn set_identity(&self, identity: Option<Identity>) -> Result<(), SyncError> {
        let (stale_projects, stale_tasks, next) = {
            let mut state = self.state();
            if !state.session.replace(identity) {
                return Ok(());
            }
            state.projects.clear();
            state.tasks.clear();
            state.selected = None;
            state.touch();
            let stale_projects = state.project_feed.retire();
            let stale_tasks = state.task_feed.retire();
            (stale_projects, stale_tasks, state.session.identity().cloned())
        };
        drop(stale_tasks);
        drop(stale_projects);

        match next {
            Some(identity) => {
                info!(uid = %identity, "identity changed");
                self.open_projects(&identity)
            }
            None => {
                info!("signed out; subscriptions closed");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Select a project (or none) and re-scope the task subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the task subscription cannot be
    /// opened.
    pub fn select_project(&self, project_id: Option<&str>) -> Result<(), SyncError> {
        let changed = {
            let mut state = self.state();
            let next = project_id.map(str::to_string);
            if state.selected == next {
                false
            } else {
                state.selected = next;
                state.touch();
                true
            }
        };
        if changed {
            self.refresh_tasks()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subscription management
    // -----------------------------------------------------------------------

    fn listener(&self, apply: impl Fn(&Self, Vec<Document>) + Send + 'static) -> SnapshotListener {
        let weak = Arc::downgrade(&self.inner);
        Box::new(move |docs| {
            if let Some(inner) = weak.upgrade() {
                apply(&Self { inner }, docs);
            }
        })
    }

    /// Keep `handle` if `token` is still the feed's current token.
    fn install(&self, kind: FeedKind, token: u64, handle: ListenerHandle) {
        let superseded = {
            let mut state = self.state();
            let feed = state.feed_mut(kind);
            if feed.token == Some(token) {
                feed.handle.replace(handle)
            } else {
                Some(handle)
            }
        };
        drop(superseded);
    }

    fn disarm(&self, kind: FeedKind, token: u64) {
        let mut state = self.state();
        let feed = state.feed_mut(kind);
        if feed.token == Some(token) {
            feed.token = None;
        }
    }

    fn open_projects(&self, identity: &Identity) -> Result<(), SyncError> {
        let token = {
            let mut state = self.state();
            if state.session.identity() != Some(identity) {
                return Ok(());
            }
            state.arm(FeedKind::Projects)
        };

        let collections = self.collections();
        let query = Query::collection(&collections.projects)
            .where_eq(collections.owner_field.as_str(), identity.as_str());
        let listener = self.listener(move |layer, docs| layer.apply_projects(token, &docs));
        match self.inner.store.subscribe(query, listener) {
            Ok(handle) => {
                self.install(FeedKind::Projects, token, handle);
                info!(uid = %identity, "project subscription opened");
                Ok(())
            }
            Err(err) => {
                self.disarm(FeedKind::Projects, token);
                Err(err.into())
            }
        }
    }

    /// Close the task subscription and reopen it for the current
    /// selection and identity, if both are present.
    fn refresh_tasks(&self) -> Result<(), SyncError> {
        let (stale, target) = {
            let mut state = self.state();
            let stale = state.task_feed.retire();
            if !state.tasks.is_empty() {
                state.tasks.clear();
                state.touch();
            }
            let scope = state.selected.clone().zip(state.session.identity().cloned());
            let target = scope.map(|(project, identity)| (project, identity, state.arm(FeedKind::Tasks)));
            (stale, target)
        };
        drop(stale);

        let Some((project_id, identity, token)) = target else {
            debug!("no project selected; task subscription closed");
            return Ok(());
        };

        let collections = self.collections();
        let query = Query::collection(&collections.tasks)
            .where_eq(PROJECT_FIELD, project_id.as_str())
            .where_eq(collections.owner_field.as_str(), identity.as_str());
        let listener = self.listener(move |layer, docs| layer.apply_tasks(token, &docs));
        match self.inner.store.subscribe(query, listener) {
            Ok(handle) => {
                self.install(FeedKind::Tasks, token, handle);
                info!(project = %project_id, "task subscription opened");
                Ok(())
            }
            Err(err) => {
                self.disarm(FeedKind::Tasks, token);
                Err(err.into())
            }
        }
    }

    fn apply_projects(&self, token: u64, docs: &[Document]) {
        let projects = decode_all(docs, |doc| {
            Project::from_document(doc, &self.collections().owner_field)
        });
        let selection_changed = {
            let mut state = self.state();
            if state.project_feed.token != Some(token) {
                debug!(token, "dropping snapshot from retired project subscription");
                return;
            }

            let previous = state.selected.clone();
            if let Some(selected) = previous.as_deref() {
                let was_mirrored = state.projects.iter().any(|p| p.id == selected);
                let still_present = projects.iter().any(|p| p.id == selected);
                if was_mirrored && !still_present {
                    debug!(project = %selected, "selected project disappeared; selection cleared");
                    state.selected = None;
                }
            } else if state.projects.is_empty() {
                // Auto-select only on the empty -> non-empty transition.
                state.selected = projects.first().map(|p| p.id.clone());
            }

            state.projects = projects;
            state.touch();
            debug!(count = state.projects.len(), "applied project snapshot");
            state.selected != previous
        };

        if selection_changed {
            if let Err(err) = self.refresh_tasks() {
                error!(error = %err, code = %err.code(), "task subscription failed after selection change");
            }
        }
    }

    fn apply_tasks(&self, token: u64, docs: &[Document]) {
        let tasks = decode_all(docs, |doc| Task::from_document(doc, &self.collections().owner_field));
        let mut state = self.state();
        if state.task_feed.token != Some(token) {
            debug!(token, "dropping snapshot from retired task subscription");
            return;
        }
        state.tasks = tasks;
        state.touch();
        debug!(count = state.tasks.len(), "applied task snapshot");
    }

    fn signed_in(&self) -> Option<Identity> {
        self.state().session.identity().cloned()
    }
}

/// Decode every document, skipping ones that do not fit the model.
fn decode_all<T>(
    docs: &[Document],
    decode: impl Fn(&Document) -> Result<T, DecodeError>,
) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(doc) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "skipping undecodable document");
                None
            }
        })
        .collect()
}
