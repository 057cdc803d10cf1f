//!
//! Graph store client seam
//! -----------------------
//! Everything above this module talks to the graph store through [`StoreClient`], an
//! object-safe async trait shaped after the document/graph REST API of an
//! ArangoDB-compatible server. Two implementations live underneath:
//!
//! - [`http::HttpStoreClient`]: the real REST client (reqwest, basic auth).
//! - [`memory::MemoryStoreClient`]: an in-process store used by tests and by the
//!   `--memory-store` development mode. It records every call it receives.
//!
//! A [`Connector`] turns a resolved [`StoreEndpoint`] into a shared client handle so the
//! provisioner can be exercised without touching the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod memory;

/// Errors surfaced by a store client. HTTP-level conflicts and missing documents get
/// their own variants because callers branch on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("store returned HTTP {code} (errorNum {error_num}): {message}")]
    Status { code: u16, error_num: i64, message: String },
    #[error("failed to decode store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool { matches!(self, StoreError::Conflict(_)) }
    pub fn is_not_found(&self) -> bool { matches!(self, StoreError::NotFound(_)) }
    pub fn is_transport(&self) -> bool { matches!(self, StoreError::Transport(_)) }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One edge collection and the vertex collections its edges may start from and end at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

/// Topology of a named graph as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    #[serde(default)]
    pub edge_definitions: Vec<EdgeDefinition>,
    #[serde(default)]
    pub orphan_collections: Vec<String>,
}

impl GraphDefinition {
    /// Copy with every list sorted; the store is free to reorder collections.
    pub fn normalized(&self) -> Self {
        let mut edge_definitions: Vec<EdgeDefinition> = self
            .edge_definitions
            .iter()
            .map(|e| {
                let mut from = e.from.clone();
                let mut to = e.to.clone();
                from.sort();
                to.sort();
                EdgeDefinition { collection: e.collection.clone(), from, to }
            })
            .collect();
        edge_definitions.sort_by(|a, b| a.collection.cmp(&b.collection));
        let mut orphan_collections = self.orphan_collections.clone();
        orphan_collections.sort();
        Self { edge_definitions, orphan_collections }
    }

    pub fn same_topology(&self, other: &GraphDefinition) -> bool {
        self.normalized() == other.normalized()
    }

    /// Every vertex collection referenced by an edge definition or listed as an orphan.
    pub fn vertex_collections(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .edge_definitions
            .iter()
            .flat_map(|e| e.from.iter().chain(e.to.iter()).cloned())
            .chain(self.orphan_collections.iter().cloned())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// Async access to the graph store. Database-scoped operations take the database name
/// explicitly; nothing is cached on the client side.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Lightweight connectivity probe; returns the server version string.
    async fn version(&self) -> StoreResult<String>;

    async fn database_exists(&self, name: &str) -> StoreResult<bool>;
    async fn create_database(&self, name: &str) -> StoreResult<()>;

    async fn graph_exists(&self, db: &str, graph: &str) -> StoreResult<bool>;
    async fn create_graph(&self, db: &str, graph: &str, definition: &GraphDefinition) -> StoreResult<GraphDefinition>;
    async fn read_graph(&self, db: &str, graph: &str) -> StoreResult<GraphDefinition>;

    async fn document_exists(&self, db: &str, collection: &str, key: &str) -> StoreResult<bool>;
    /// Insert a new document; the key is taken from the document's `_key` field. A key
    /// collision is reported as [`StoreError::Conflict`].
    async fn create_document(&self, db: &str, collection: &str, document: serde_json::Value) -> StoreResult<()>;
    async fn read_document(&self, db: &str, collection: &str, key: &str) -> StoreResult<serde_json::Value>;
    async fn read_all_documents(&self, db: &str, collection: &str) -> StoreResult<Vec<serde_json::Value>>;
    async fn replace_document(&self, db: &str, collection: &str, key: &str, document: serde_json::Value) -> StoreResult<()>;
    async fn remove_document(&self, db: &str, collection: &str, key: &str) -> StoreResult<()>;
}

pub type SharedClient = Arc<dyn StoreClient>;

/// Resolved connection parameters handed to a [`Connector`].
#[derive(Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for StoreEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEndpoint")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &StoreEndpoint) -> StoreResult<SharedClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(c: &str, from: &[&str], to: &[&str]) -> EdgeDefinition {
        EdgeDefinition {
            collection: c.into(),
            from: from.iter().map(|s| s.to_string()).collect(),
            to: to.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn topology_comparison_ignores_ordering() {
        let a = GraphDefinition {
            edge_definitions: vec![edge("e1", &["a", "b"], &["c"]), edge("e2", &["x"], &["y"])],
            orphan_collections: vec!["o1".into(), "o2".into()],
        };
        let b = GraphDefinition {
            edge_definitions: vec![edge("e2", &["x"], &["y"]), edge("e1", &["b", "a"], &["c"])],
            orphan_collections: vec!["o2".into(), "o1".into()],
        };
        assert!(a.same_topology(&b));

        let c = GraphDefinition { edge_definitions: vec![edge("e1", &["a"], &["c"])], orphan_collections: vec![] };
        assert!(!a.same_topology(&c));
    }

    #[test]
    fn vertex_collections_are_deduplicated() {
        let g = GraphDefinition {
            edge_definitions: vec![edge("e", &["a", "b"], &["b", "a"])],
            orphan_collections: vec!["z".into()],
        };
        assert_eq!(g.vertex_collections(), vec!["a", "b", "z"]);
    }

    #[test]
    fn endpoint_debug_hides_password() {
        let ep = StoreEndpoint { url: "http://localhost:8529".into(), user: "root".into(), password: "hunter2".into(), timeout: Duration::from_secs(1) };
        let s = format!("{:?}", ep);
        assert!(!s.contains("hunter2"));
        assert!(s.contains("root"));
    }
}
