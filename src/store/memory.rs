//! In-process graph store.
//!
//! Behaves like the REST store for the operations the service uses (graphs create their
//! collections, key collisions are conflicts, missing documents are not found) and keeps
//! a log of every call so tests can assert on what was sent. `set_offline(true)` turns
//! every call into a transport failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{Connector, GraphDefinition, SharedClient, StoreClient, StoreEndpoint, StoreError, StoreResult};

const MEMORY_VERSION: &str = "memory-1";

/// A call received by [`MemoryStoreClient`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Version,
    DatabaseExists(String),
    CreateDatabase(String),
    GraphExists(String, String),
    CreateGraph(String, String),
    ReadGraph(String, String),
    DocumentExists(String, String, String),
    CreateDocument(String, String),
    ReadDocument(String, String, String),
    ReadAllDocuments(String, String),
    ReplaceDocument(String, String, String),
    RemoveDocument(String, String, String),
}

impl StoreCall {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            StoreCall::CreateDatabase(_)
                | StoreCall::CreateGraph(..)
                | StoreCall::CreateDocument(..)
                | StoreCall::ReplaceDocument(..)
                | StoreCall::RemoveDocument(..)
        )
    }
}

#[derive(Default)]
struct Database {
    graphs: BTreeMap<String, GraphDefinition>,
    collections: BTreeMap<String, BTreeMap<String, Value>>,
}

#[derive(Default)]
pub struct MemoryStoreClient {
    databases: RwLock<BTreeMap<String, Database>>,
    calls: Mutex<Vec<StoreCall>>,
    offline: AtomicBool,
    hide_next_lookup: AtomicBool,
}

impl MemoryStoreClient {
    pub fn new() -> Self { Self::default() }

    pub fn shared() -> Arc<Self> { Arc::new(Self::new()) }

    pub fn calls(&self) -> Vec<StoreCall> { self.calls.lock().clone() }

    pub fn mutating_call_count(&self) -> usize { self.calls.lock().iter().filter(|c| c.is_mutating()).count() }

    pub fn clear_calls(&self) { self.calls.lock().clear(); }

    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

    /// Make the next database or graph existence check report "absent" even if the
    /// element exists, as if another process created it right after the check.
    pub fn simulate_creation_race(&self) { self.hide_next_lookup.store(true, Ordering::SeqCst); }

    /// Seed a graph directly, bypassing the call log.
    pub fn seed_graph(&self, db: &str, graph: &str, definition: GraphDefinition) {
        let mut dbs = self.databases.write();
        let database = dbs.entry(db.to_string()).or_default();
        for c in definition.vertex_collections() {
            database.collections.entry(c).or_default();
        }
        for e in &definition.edge_definitions {
            database.collections.entry(e.collection.clone()).or_default();
        }
        database.graphs.insert(graph.to_string(), definition);
    }

    pub fn collection_names(&self, db: &str) -> Vec<String> {
        self.databases
            .read()
            .get(db)
            .map(|d| d.collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: StoreCall) -> StoreResult<()> {
        self.calls.lock().push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("memory store is offline".into()));
        }
        Ok(())
    }

    fn take_hidden(&self) -> bool { self.hide_next_lookup.swap(false, Ordering::SeqCst) }

    fn with_collection<T>(
        &self,
        db: &str,
        collection: &str,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut dbs = self.databases.write();
        let database = dbs
            .get_mut(db)
            .ok_or_else(|| StoreError::NotFound(format!("database '{db}' not found")))?;
        let docs = database
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(format!("collection '{collection}' not found")))?;
        f(docs)
    }
}

#[async_trait]
impl StoreClient for MemoryStoreClient {
    async fn version(&self) -> StoreResult<String> {
        self.record(StoreCall::Version)?;
        Ok(MEMORY_VERSION.to_string())
    }

    async fn database_exists(&self, name: &str) -> StoreResult<bool> {
        self.record(StoreCall::DatabaseExists(name.into()))?;
        if self.take_hidden() {
            return Ok(false);
        }
        Ok(self.databases.read().contains_key(name))
    }

    async fn create_database(&self, name: &str) -> StoreResult<()> {
        self.record(StoreCall::CreateDatabase(name.into()))?;
        let mut dbs = self.databases.write();
        if dbs.contains_key(name) {
            return Err(StoreError::Conflict(format!("duplicate database name '{name}'")));
        }
        dbs.insert(name.to_string(), Database::default());
        Ok(())
    }

    async fn graph_exists(&self, db: &str, graph: &str) -> StoreResult<bool> {
        self.record(StoreCall::GraphExists(db.into(), graph.into()))?;
        if self.take_hidden() {
            return Ok(false);
        }
        let dbs = self.databases.read();
        let database = dbs.get(db).ok_or_else(|| StoreError::NotFound(format!("database '{db}' not found")))?;
        Ok(database.graphs.contains_key(graph))
    }

    async fn create_graph(&self, db: &str, graph: &str, definition: &GraphDefinition) -> StoreResult<GraphDefinition> {
        self.record(StoreCall::CreateGraph(db.into(), graph.into()))?;
        let mut dbs = self.databases.write();
        let database = dbs.get_mut(db).ok_or_else(|| StoreError::NotFound(format!("database '{db}' not found")))?;
        if database.graphs.contains_key(graph) {
            return Err(StoreError::Conflict(format!("graph '{graph}' already exists")));
        }
        for c in definition.vertex_collections() {
            database.collections.entry(c).or_default();
        }
        for e in &definition.edge_definitions {
            database.collections.entry(e.collection.clone()).or_default();
        }
        database.graphs.insert(graph.to_string(), definition.clone());
        Ok(definition.clone())
    }

    async fn read_graph(&self, db: &str, graph: &str) -> StoreResult<GraphDefinition> {
        self.record(StoreCall::ReadGraph(db.into(), graph.into()))?;
        let dbs = self.databases.read();
        dbs.get(db)
            .and_then(|d| d.graphs.get(graph))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("graph '{graph}' not found")))
    }

    async fn document_exists(&self, db: &str, collection: &str, key: &str) -> StoreResult<bool> {
        self.record(StoreCall::DocumentExists(db.into(), collection.into(), key.into()))?;
        self.with_collection(db, collection, |docs| Ok(docs.contains_key(key)))
    }

    async fn create_document(&self, db: &str, collection: &str, document: Value) -> StoreResult<()> {
        self.record(StoreCall::CreateDocument(db.into(), collection.into()))?;
        let key = document
            .get("_key")
            .and_then(|k| k.as_str())
            .filter(|k| !k.is_empty())
            .map(|k| k.to_string())
            .ok_or_else(|| StoreError::Status { code: 400, error_num: 1221, message: "illegal document key".into() })?;
        self.with_collection(db, collection, |docs| {
            if docs.contains_key(&key) {
                return Err(StoreError::Conflict(format!("unique constraint violated for key '{key}'")));
            }
            docs.insert(key, document);
            Ok(())
        })
    }

    async fn read_document(&self, db: &str, collection: &str, key: &str) -> StoreResult<Value> {
        self.record(StoreCall::ReadDocument(db.into(), collection.into(), key.into()))?;
        self.with_collection(db, collection, |docs| {
            docs.get(key).cloned().ok_or_else(|| StoreError::NotFound(format!("document '{key}' not found")))
        })
    }

    async fn read_all_documents(&self, db: &str, collection: &str) -> StoreResult<Vec<Value>> {
        self.record(StoreCall::ReadAllDocuments(db.into(), collection.into()))?;
        self.with_collection(db, collection, |docs| Ok(docs.values().cloned().collect()))
    }

    async fn replace_document(&self, db: &str, collection: &str, key: &str, document: Value) -> StoreResult<()> {
        self.record(StoreCall::ReplaceDocument(db.into(), collection.into(), key.into()))?;
        self.with_collection(db, collection, |docs| match docs.get_mut(key) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("document '{key}' not found"))),
        })
    }

    async fn remove_document(&self, db: &str, collection: &str, key: &str) -> StoreResult<()> {
        self.record(StoreCall::RemoveDocument(db.into(), collection.into(), key.into()))?;
        self.with_collection(db, collection, |docs| {
            docs.remove(key).map(|_| ()).ok_or_else(|| StoreError::NotFound(format!("document '{key}' not found")))
        })
    }
}

/// Hands out the same in-memory client on every connect and counts the calls.
#[derive(Clone)]
pub struct MemoryConnector {
    client: Arc<MemoryStoreClient>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(client: Arc<MemoryStoreClient>) -> Self {
        Self { client, connects: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn client(&self) -> Arc<MemoryStoreClient> { self.client.clone() }

    pub fn connect_count(&self) -> usize { self.connects.load(Ordering::SeqCst) }
}

impl Connector for MemoryConnector {
    fn connect(&self, _endpoint: &StoreEndpoint) -> StoreResult<SharedClient> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn duplicate_keys_conflict_and_keep_original() {
        let store = MemoryStoreClient::new();
        store.create_database("db").await.unwrap();
        store.seed_graph("db", "g", GraphDefinition { edge_definitions: vec![], orphan_collections: vec!["c".into()] });

        store.create_document("db", "c", json!({"_key": "k", "v": 1})).await.unwrap();
        let err = store.create_document("db", "c", json!({"_key": "k", "v": 2})).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.read_document("db", "c", "k").await.unwrap(), json!({"_key": "k", "v": 1}));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call_but_still_logs_it() {
        let store = MemoryStoreClient::new();
        store.set_offline(true);
        assert!(store.version().await.unwrap_err().is_transport());
        assert_eq!(store.calls(), vec![StoreCall::Version]);
        store.set_offline(false);
        assert_eq!(store.version().await.unwrap(), MEMORY_VERSION);
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let store = MemoryStoreClient::new();
        store.create_database("db").await.unwrap();
        let err = store.read_all_documents("db", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn creation_race_hides_exactly_one_lookup() {
        let store = MemoryStoreClient::new();
        store.create_database("db").await.unwrap();
        store.simulate_creation_race();
        assert!(!store.database_exists("db").await.unwrap());
        assert!(store.database_exists("db").await.unwrap());
        assert!(store.create_database("db").await.unwrap_err().is_conflict());
    }
}
