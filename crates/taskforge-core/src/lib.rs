//! taskforge-core library.
//!
//! Keeps per-identity mirrors of projects and tasks in step with a remote
//! document store and exposes the mutations a task-manager front end needs.
//! The store and the identity provider sit behind traits; in-memory
//! implementations of both live in [`store::memory`] and
//! [`identity::memory`].
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`SyncError`]; guard failures are
//!   [`Outcome::Skipped`], not errors. Config loading uses `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod config;
pub mod confirm;
pub mod error;
pub mod identity;
pub mod listener;
pub mod model;
pub mod session;
pub mod store;
pub mod sync;
pub mod view;

pub use config::{ConfigError, SyncConfig};
pub use confirm::{Always, Confirm, ConfirmRequest};
pub use error::{ErrorCode, SyncError};
pub use identity::{AuthError, Identity, IdentityProvider};
pub use listener::ListenerHandle;
pub use model::{NewTask, Project, Task, TaskEdit, TaskStatus};
pub use store::{RemoteStore, StoreError};
pub use sync::{CascadeReport, Outcome, Skip, SyncLayer};
pub use view::{MirrorView, SortOrder, StatusFilter};
