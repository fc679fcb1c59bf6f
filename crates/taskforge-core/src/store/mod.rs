//! Remote document store seam.
//!
//! The hosted document database is an external collaborator. The sync layer
//! only talks to it through [`RemoteStore`]: equality-filtered queries,
//! realtime snapshot subscriptions, single-document reads and writes, and
//! all-or-nothing batch commits.
//!
//! The store is schemaless; documents carry a JSON object of fields and an
//! opaque id assigned by the store. [`memory::InMemoryStore`] is a complete
//! in-process implementation used by tests and the simulator.

pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::listener::ListenerHandle;

/// Field map of a schemaless document.
pub type Fields = serde_json::Map<String, Value>;

/// Callback receiving every snapshot of a live query.
///
/// Each snapshot is the complete result set at delivery time. A store
/// delivers the snapshots of one subscription serially.
pub type SnapshotListener = Box<dyn FnMut(Vec<Document>) + Send>;

/// Turn a `json!` object literal into a field map. Non-objects yield an
/// empty map.
#[must_use]
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

// ---------------------------------------------------------------------------
// Documents and queries
// ---------------------------------------------------------------------------

/// A document as returned by reads and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// String value of `name`, if present and a string.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Equality predicate on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// Collection query with conjunctive equality filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
}

impl Query {
    /// Match every document of `collection`.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    /// Add an equality predicate.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// True when every filter matches. A missing field never matches.
    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters
            .iter()
            .all(|f| fields.get(&f.field).is_some_and(|v| *v == f.value))
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Merge `fields` into an existing document.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Remove a document. Deleting an absent document is not an error.
    Delete { collection: String, id: String },
}

impl BatchOp {
    #[must_use]
    pub fn update(collection: &str, id: &str, fields: Fields) -> Self {
        Self::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    #[must_use]
    pub fn delete(collection: &str, id: &str) -> Self {
        Self::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Update { collection, .. } | Self::Delete { collection, .. } => collection,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`RemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Update of a document that does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// The store's security rules refused the write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Network or backend failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A batch commit failed; no operation in it took effect.
    #[error("batch rejected: {reason}")]
    BatchRejected { reason: String },
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::DocumentNotFound,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Unavailable(_) => ErrorCode::StoreUnavailable,
            Self::BatchRejected { .. } => ErrorCode::BatchRejected,
        }
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Abstraction over the hosted document database.
///
/// Implementations must deliver an initial snapshot for every subscription
/// and at least one snapshot after each change that affects its query.
/// Listeners may be invoked on any thread, including the thread performing
/// the write, so implementations must not hold internal locks while calling
/// a listener.
pub trait RemoteStore: Send + Sync {
    /// Open a live query. The returned handle unsubscribes on drop.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the listener cannot be registered.
    fn subscribe(
        &self,
        query: Query,
        listener: SnapshotListener,
    ) -> Result<ListenerHandle, StoreError>;

    /// Create a document and return its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    fn add_document(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Merge `fields` into an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the id is absent.
    fn update_document(&self, collection: &str, id: &str, fields: Fields)
    -> Result<(), StoreError>;

    /// Delete a single document.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend or permission failure.
    fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Point read of a single document.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// One-shot query.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    fn get_documents(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Apply every operation or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BatchRejected`] with no partial effect.
    fn commit_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;
}
