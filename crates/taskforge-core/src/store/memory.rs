//! In-process [`RemoteStore`] used by tests and the simulator.
//!
//! Semantics follow the hosted store closely enough for the sync layer:
//!
//! - ids are 20-character alphanumeric strings drawn from a seedable RNG;
//! - every subscription receives an initial snapshot and one snapshot per
//!   write touching its collection (possibly redundant, never missed);
//! - snapshots are computed at delivery time while holding the
//!   subscription's delivery lock, so the last snapshot a listener sees
//!   always reflects the latest committed state;
//! - batches are staged on a copy and swapped in only when every operation
//!   succeeds.
//!
//! Optional ownership rules make deletes fail unless the document's owner
//! field (`ownerId` unless reconfigured) equals the current principal, which is how the hosted store's
//! security rules behave for this application. Faults can be queued per
//! operation kind to exercise failure paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{BatchOp, Document, Fields, Query, RemoteStore, SnapshotListener, StoreError};
use crate::listener::{ListenerHandle, lock};
use crate::model::DEFAULT_OWNER_FIELD;

const DOCUMENT_ID_LEN: usize = 20;

/// Operation kinds that accept injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Subscribe,
    Add,
    Update,
    Delete,
    Get,
    Query,
    Commit,
}

/// Operation counters, for asserting on write patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Point reads.
    pub reads: u64,
    /// One-shot queries.
    pub queries: u64,
    /// Single-document writes (add, update, delete).
    pub writes: u64,
    /// Successful batch commits.
    pub batches: u64,
    /// Snapshots delivered to listeners.
    pub notifications: u64,
}

/// Shared in-memory document store. Clones share state.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
}

struct State {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    subscribers: BTreeMap<u64, Arc<Subscriber>>,
    next_subscriber: u64,
    faults: HashMap<FailPoint, VecDeque<StoreError>>,
    owner_rules: bool,
    owner_field: String,
    principal: Option<String>,
    rng: StdRng,
    stats: StoreStats,
}

struct Subscriber {
    query: Query,
    listener: Mutex<SnapshotListener>,
    active: AtomicBool,
}

impl InMemoryStore {
    /// Empty store with entropy-seeded id generation.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Empty store whose generated ids are reproducible for `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    collections: HashMap::new(),
                    subscribers: BTreeMap::new(),
                    next_subscriber: 0,
                    faults: HashMap::new(),
                    owner_rules: false,
                    owner_field: DEFAULT_OWNER_FIELD.to_string(),
                    principal: None,
                    rng,
                    stats: StoreStats::default(),
                }),
            }),
        }
    }

    /// Turn the ownership delete rule on or off.
    pub fn enforce_owner_rules(&self, enabled: bool) {
        lock(&self.inner.state).owner_rules = enabled;
    }

    /// Field the ownership rule reads.
    pub fn set_owner_field(&self, field: &str) {
        lock(&self.inner.state).owner_field = field.to_string();
    }

    /// Set the identity the store evaluates rules against.
    pub fn set_principal(&self, principal: Option<&str>) {
        lock(&self.inner.state).principal = principal.map(str::to_string);
    }

    /// Queue `error` to be returned by the next operation of kind `point`.
    pub fn fail_next(&self, point: FailPoint, error: StoreError) {
        lock(&self.inner.state)
            .faults
            .entry(point)
            .or_default()
            .push_back(error);
    }

    /// Drop every queued fault.
    pub fn clear_faults(&self) {
        lock(&self.inner.state).faults.clear();
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        lock(&self.inner.state).stats
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).subscribers.len()
    }

    /// Write a document directly, bypassing rules, faults and counters.
    ///
    /// Used to seed data written by other clients or older schema versions.
    /// Returns the document id.
    pub fn seed_document(&self, collection: &str, fields: Fields) -> String {
        let id = {
            let mut state = lock(&self.inner.state);
            let id = state.fresh_id(collection);
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), fields);
            id
        };
        self.inner.notify(&[collection]);
        id
    }

    /// Every document of `collection`, bypassing faults and counters.
    #[must_use]
    pub fn dump(&self, collection: &str) -> Vec<Document> {
        lock(&self.inner.state).run_query(&Query::collection(collection))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("InMemoryStore")
            .field("collections", &state.collections.len())
            .field("subscribers", &state.subscribers.len())
            .field("stats", &state.stats)
            .finish_non_exhaustive()
    }
}

impl State {
    fn take_fault(&mut self, point: FailPoint) -> Result<(), StoreError> {
        match self.faults.get_mut(&point).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fresh_id(&mut self, collection: &str) -> String {
        loop {
            let id = random_id(&mut self.rng, DOCUMENT_ID_LEN);
            let taken = self
                .collections
                .get(collection)
                .is_some_and(|docs| docs.contains_key(&id));
            if !taken {
                return id;
            }
        }
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        self.collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| query.matches(fields))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ownership rule for deletes. Absent documents always pass.
    fn check_delete(&self, collection: &str, id: &str, existing: Option<&Fields>) -> Result<(), StoreError> {
        if !self.owner_rules {
            return Ok(());
        }
        let Some(fields) = existing else {
            return Ok(());
        };
        let owner = fields.get(&self.owner_field).and_then(serde_json::Value::as_str);
        match (owner, self.principal.as_deref()) {
            (Some(owner), Some(principal)) if owner == principal => Ok(()),
            _ => Err(StoreError::PermissionDenied(format!(
                "delete of {collection}/{id} requires ownership"
            ))),
        }
    }
}

impl Inner {
    fn notify(&self, touched: &[&str]) {
        let subscribers: Vec<Arc<Subscriber>> = {
            let state = lock(&self.state);
            state
                .subscribers
                .values()
                .filter(|s| touched.contains(&s.query.collection.as_str()))
                .cloned()
                .collect()
        };
        for subscriber in subscribers {
            self.deliver(&subscriber);
        }
    }

    fn deliver(&self, subscriber: &Subscriber) {
        let mut listener = lock(&subscriber.listener);
        if !subscriber.active.load(Ordering::Acquire) {
            return;
        }
        let docs = {
            let mut state = lock(&self.state);
            state.stats.notifications += 1;
            state.run_query(&subscriber.query)
        };
        let callback: &mut (dyn FnMut(Vec<Document>) + Send) = &mut **listener;
        callback(docs);
    }
}

impl RemoteStore for InMemoryStore {
    fn subscribe(
        &self,
        query: Query,
        listener: SnapshotListener,
    ) -> Result<ListenerHandle, StoreError> {
        let (key, subscriber) = {
            let mut state = lock(&self.inner.state);
            state.take_fault(FailPoint::Subscribe)?;
            let key = state.next_subscriber;
            state.next_subscriber += 1;
            let subscriber = Arc::new(Subscriber {
                query,
                listener: Mutex::new(listener),
                active: AtomicBool::new(true),
            });
            state.subscribers.insert(key, Arc::clone(&subscriber));
            (key, subscriber)
        };

        self.inner.deliver(&subscriber);

        let weak = Arc::downgrade(&self.inner);
        Ok(ListenerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = lock(&inner.state).subscribers.remove(&key);
                if let Some(subscriber) = removed {
                    subscriber.active.store(false, Ordering::Release);
                }
            }
        }))
    }

    fn add_document(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = {
            let mut state = lock(&self.inner.state);
            state.take_fault(FailPoint::Add)?;
            let id = state.fresh_id(collection);
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), fields);
            state.stats.writes += 1;
            id
        };
        self.inner.notify(&[collection]);
        Ok(id)
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        {
            let mut state = lock(&self.inner.state);
            state.take_fault(FailPoint::Update)?;
            let doc = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            doc.extend(fields);
            state.stats.writes += 1;
        }
        self.inner.notify(&[collection]);
        Ok(())
    }

    fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        {
            let mut state = lock(&self.inner.state);
            state.take_fault(FailPoint::Delete)?;
            let existing = state.collections.get(collection).and_then(|docs| docs.get(id));
            state.check_delete(collection, id, existing)?;
            if let Some(docs) = state.collections.get_mut(collection) {
                docs.remove(id);
            }
            state.stats.writes += 1;
        }
        self.inner.notify(&[collection]);
        Ok(())
    }

    fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let mut state = lock(&self.inner.state);
        state.take_fault(FailPoint::Get)?;
        state.stats.reads += 1;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    fn get_documents(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut state = lock(&self.inner.state);
        state.take_fault(FailPoint::Query)?;
        state.stats.queries += 1;
        Ok(state.run_query(query))
    }

    fn commit_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let touched: Vec<String> = {
            let mut state = lock(&self.inner.state);
            state.take_fault(FailPoint::Commit)?;

            let mut staged: HashMap<String, BTreeMap<String, Fields>> = HashMap::new();
            for op in &ops {
                let name = op.collection();
                if !staged.contains_key(name) {
                    let current = state.collections.get(name).cloned().unwrap_or_default();
                    staged.insert(name.to_string(), current);
                }
            }

            for op in ops {
                match op {
                    BatchOp::Update {
                        collection,
                        id,
                        fields,
                    } => {
                        let doc = staged
                            .get_mut(&collection)
                            .and_then(|docs| docs.get_mut(&id))
                            .ok_or_else(|| StoreError::BatchRejected {
                                reason: format!("document {collection}/{id} not found"),
                            })?;
                        doc.extend(fields);
                    }
                    BatchOp::Delete { collection, id } => {
                        let docs = staged.entry(collection.clone()).or_default();
                        state
                            .check_delete(&collection, &id, docs.get(&id))
                            .map_err(|err| StoreError::BatchRejected {
                                reason: err.to_string(),
                            })?;
                        docs.remove(&id);
                    }
                }
            }

            let touched = staged.keys().cloned().collect();
            state.collections.extend(staged);
            state.stats.batches += 1;
            touched
        };

        let names: Vec<&str> = touched.iter().map(String::as_str).collect();
        self.inner.notify(&names);
        Ok(())
    }
}

/// Random alphanumeric identifier of `len` characters.
pub(crate) fn random_id(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Vec<Document>>>>, SnapshotListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: SnapshotListener = Box::new(move |docs| {
            sink.lock().expect("recorder lock").push(docs);
        });
        (seen, listener)
    }

    #[test]
    fn add_then_get_round_trips_fields() {
        let store = InMemoryStore::with_seed(1);
        let id = store
            .add_document("projects", fields(json!({"name": "Launch"})))
            .expect("add");
        assert_eq!(id.len(), DOCUMENT_ID_LEN);

        let doc = store.get_document("projects", &id).expect("get").expect("exists");
        assert_eq!(doc.str_field("name"), Some("Launch"));
        assert!(store.get_document("projects", "nope").expect("get").is_none());
    }

    #[test]
    fn seeded_ids_are_reproducible() {
        let a = InMemoryStore::with_seed(7);
        let b = InMemoryStore::with_seed(7);
        let id_a = a.add_document("tasks", Fields::new()).expect("add");
        let id_b = b.add_document("tasks", Fields::new()).expect("add");
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn update_of_missing_document_is_not_found() {
        let store = InMemoryStore::with_seed(2);
        let err = store
            .update_document("tasks", "ghost", fields(json!({"status": "done"})))
            .expect_err("must fail");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn update_merges_fields() {
        let store = InMemoryStore::with_seed(3);
        let id = store
            .add_document("tasks", fields(json!({"title": "a", "status": "todo"})))
            .expect("add");
        store
            .update_document("tasks", &id, fields(json!({"status": "done"})))
            .expect("update");
        let doc = store.get_document("tasks", &id).expect("get").expect("exists");
        assert_eq!(doc.str_field("title"), Some("a"));
        assert_eq!(doc.str_field("status"), Some("done"));
    }

    #[test]
    fn subscription_gets_initial_and_change_snapshots() {
        let store = InMemoryStore::with_seed(4);
        store.seed_document("projects", fields(json!({"ownerId": "alice", "name": "A"})));
        store.seed_document("projects", fields(json!({"ownerId": "bob", "name": "B"})));

        let (seen, listener) = recorder();
        let handle = store
            .subscribe(
                Query::collection("projects").where_eq("ownerId", "alice"),
                listener,
            )
            .expect("subscribe");

        store
            .add_document("projects", fields(json!({"ownerId": "alice", "name": "C"})))
            .expect("add");

        let snapshots = seen.lock().expect("lock").clone();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].len(), 1);
        assert_eq!(snapshots[1].len(), 2);
        drop(handle);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let store = InMemoryStore::with_seed(5);
        let (seen, listener) = recorder();
        let handle = store
            .subscribe(Query::collection("tasks"), listener)
            .expect("subscribe");
        handle.cancel();
        store.add_document("tasks", Fields::new()).expect("add");
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = InMemoryStore::with_seed(6);
        let keep = store.add_document("tasks", Fields::new()).expect("add");

        let err = store
            .commit_batch(vec![
                BatchOp::delete("tasks", &keep),
                BatchOp::update("tasks", "missing", fields(json!({"x": 1}))),
            ])
            .expect_err("batch must fail");
        assert!(matches!(err, StoreError::BatchRejected { .. }));
        assert!(store.get_document("tasks", &keep).expect("get").is_some());
        assert_eq!(store.stats().batches, 0);
    }

    #[test]
    fn owner_rules_guard_deletes() {
        let store = InMemoryStore::with_seed(8);
        let id = store.seed_document("projects", fields(json!({"ownerId": "bob"})));
        store.enforce_owner_rules(true);
        store.set_principal(Some("alice"));

        let err = store.delete_document("projects", &id).expect_err("denied");
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        let err = store
            .commit_batch(vec![BatchOp::delete("projects", &id)])
            .expect_err("denied in batch");
        assert!(matches!(err, StoreError::BatchRejected { .. }));

        // Patch then delete inside one batch is evaluated in order.
        store
            .commit_batch(vec![
                BatchOp::update("projects", &id, fields(json!({"ownerId": "alice"}))),
                BatchOp::delete("projects", &id),
            ])
            .expect("repaired batch commits");
        assert!(store.dump("projects").is_empty());
    }

    #[test]
    fn owner_rules_follow_configured_field() {
        let store = InMemoryStore::with_seed(11);
        let id = store.seed_document("projects", fields(json!({"userId": "alice"})));
        store.enforce_owner_rules(true);
        store.set_principal(Some("alice"));

        let err = store.delete_document("projects", &id).expect_err("ownerId absent");
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        store.set_owner_field("userId");
        store.delete_document("projects", &id).expect("userId matches");
    }

    #[test]
    fn injected_fault_fires_once() {
        let store = InMemoryStore::with_seed(9);
        store.fail_next(FailPoint::Add, StoreError::Unavailable("offline".into()));
        assert!(store.add_document("tasks", Fields::new()).is_err());
        assert!(store.add_document("tasks", Fields::new()).is_ok());
    }

    #[test]
    fn listener_may_subscribe_reentrantly() {
        let store = InMemoryStore::with_seed(10);
        let inner_store = store.clone();
        let nested: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&nested);
        let _outer = store
            .subscribe(
                Query::collection("projects"),
                Box::new(move |_docs| {
                    let handle = inner_store
                        .subscribe(Query::collection("tasks"), Box::new(|_| {}))
                        .expect("nested subscribe");
                    *slot.lock().expect("slot") = Some(handle);
                }),
            )
            .expect("subscribe");
        assert_eq!(store.subscriber_count(), 2);
    }
}
