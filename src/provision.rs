//!
//! Schema provisioning
//! -------------------
//! Makes sure the provisioning database and graph exist before anything else talks to
//! the store. Provisioning is create-or-load at every level and safe to run on every
//! process start:
//!
//! 1. resolve connection settings (user and password are mandatory) and connect;
//! 2. open the database, creating it when absent;
//! 3. open the graph, creating it with the fixed topology when absent.
//!
//! An existing graph is loaded as it is and never altered. Losing a creation race to
//! another process ("already exists") counts as success.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use crate::config::{
    Configuration, KEY_DB_GRAPH, KEY_DB_NAME, KEY_DB_PASSWORD, KEY_DB_TIMEOUT_SECS, KEY_DB_URL, KEY_DB_USER,
};
use crate::store::{Connector, GraphDefinition, SharedClient, StoreEndpoint, StoreError};

pub mod schema;

pub use schema::GraphSchema;

pub const DEFAULT_URL: &str = "http://localhost:8529";
pub const DEFAULT_DATABASE: &str = "provisioning";
pub const DEFAULT_GRAPH: &str = "graph-provisioning";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("the configuration value named '{value}' was missing; it is required to connect to the database")]
    ConfigMissing { value: String },
    #[error("invalid connection configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to reach the graph store: {0}")]
    Connection(#[source] StoreError),
    #[error("graph '{graph}' in database '{database}' exists with a different topology")]
    SchemaConflict { database: String, graph: String },
    #[error("graph store error: {0}")]
    Store(#[source] StoreError),
}

impl ProvisionError {
    fn from_store(err: StoreError) -> Self {
        if err.is_transport() { ProvisionError::Connection(err) } else { ProvisionError::Store(err) }
    }
}

/// Connection information; every field is optional until provisioning resolves it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub graph: Option<String>,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("graph", &self.graph)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn from_config(cfg: &Configuration) -> Result<Self, ProvisionError> {
        let timeout = cfg
            .get_u64(KEY_DB_TIMEOUT_SECS)
            .map_err(|e| ProvisionError::InvalidConfig(e.to_string()))?
            .map(Duration::from_secs);
        Ok(Self {
            url: cfg.get_string(KEY_DB_URL).map(str::to_string),
            user: cfg.get_string(KEY_DB_USER).map(str::to_string),
            password: cfg.get_string(KEY_DB_PASSWORD).map(str::to_string),
            database: cfg.get_string(KEY_DB_NAME).map(str::to_string),
            graph: cfg.get_string(KEY_DB_GRAPH).map(str::to_string),
            timeout,
        })
    }

    pub fn database_name(&self) -> &str { non_empty(&self.database).unwrap_or(DEFAULT_DATABASE) }

    pub fn graph_name(&self) -> &str { non_empty(&self.graph).unwrap_or(DEFAULT_GRAPH) }

    /// Resolve the endpoint; fails on a missing user or password.
    pub fn endpoint(&self) -> Result<StoreEndpoint, ProvisionError> {
        let user = non_empty(&self.user).ok_or_else(|| {
            error!("User name for connection to database not specified.");
            ProvisionError::ConfigMissing { value: KEY_DB_USER.to_string() }
        })?;
        let password = non_empty(&self.password).ok_or_else(|| {
            error!("User password for connection to database not specified.");
            ProvisionError::ConfigMissing { value: KEY_DB_PASSWORD.to_string() }
        })?;
        Ok(StoreEndpoint {
            url: non_empty(&self.url).unwrap_or(DEFAULT_URL).to_string(),
            user: user.to_string(),
            password: password.to_string(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.trim().is_empty())
}

/// An opened graph plus the client that reaches it. Two handles are equal when they
/// point at the same database and graph with the same topology.
#[derive(Clone)]
pub struct GraphHandle {
    database: String,
    name: String,
    definition: GraphDefinition,
    client: SharedClient,
}

impl GraphHandle {
    pub fn new(database: impl Into<String>, name: impl Into<String>, definition: GraphDefinition, client: SharedClient) -> Self {
        Self { database: database.into(), name: name.into(), definition, client }
    }

    pub fn database(&self) -> &str { &self.database }
    pub fn name(&self) -> &str { &self.name }
    pub fn definition(&self) -> &GraphDefinition { &self.definition }
    pub fn client(&self) -> &SharedClient { &self.client }

    pub fn has_vertex_collection(&self, collection: &str) -> bool {
        self.definition.vertex_collections().iter().any(|c| c == collection)
    }
}

impl PartialEq for GraphHandle {
    fn eq(&self, other: &Self) -> bool {
        self.database == other.database && self.name == other.name && self.definition.same_topology(&other.definition)
    }
}

impl std::fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphHandle")
            .field("database", &self.database)
            .field("name", &self.name)
            .field("definition", &self.definition)
            .finish()
    }
}

pub struct SchemaProvisioner<C: Connector> {
    connector: C,
    schema: GraphSchema,
}

impl<C: Connector> SchemaProvisioner<C> {
    pub fn new(connector: C) -> Self { Self { connector, schema: GraphSchema::provisioning() } }

    /// Connect and ensure database and graph exist. Errors are returned, never retried.
    pub async fn provision(&self, settings: &ConnectionSettings) -> Result<GraphHandle, ProvisionError> {
        let endpoint = settings.endpoint()?;
        info!(url = %endpoint.url, user = %endpoint.user, "Connecting to database engine");
        let client = self.connector.connect(&endpoint).map_err(|e| {
            error!(error = %e, url = %endpoint.url, "Failed to connect to the database");
            ProvisionError::from_store(e)
        })?;

        let database = settings.database_name();
        self.ensure_database(&client, database).await?;

        let graph = settings.graph_name();
        let definition = self.ensure_graph(&client, database, graph).await?;
        Ok(GraphHandle::new(database, graph, definition, client))
    }

    async fn ensure_database(&self, client: &SharedClient, database: &str) -> Result<(), ProvisionError> {
        let exists = client.database_exists(database).await.map_err(|e| {
            error!(error = %e, database, "Failed to determine if database exists");
            ProvisionError::from_store(e)
        })?;
        if exists {
            info!(database, "Connecting to existing database instance.");
            return Ok(());
        }

        info!(database, "Database does not exist. Creating new database.");
        match client.create_database(database).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                info!(database, "Database was created concurrently by another instance; using it.");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, database, "Failed to create database");
                Err(ProvisionError::from_store(e))
            }
        }
    }

    async fn ensure_graph(&self, client: &SharedClient, database: &str, graph: &str) -> Result<GraphDefinition, ProvisionError> {
        let exists = client.graph_exists(database, graph).await.map_err(|e| {
            error!(error = %e, database, graph, "Failed to determine if graph exists");
            ProvisionError::from_store(e)
        })?;
        if exists {
            return client.read_graph(database, graph).await.map_err(|e| {
                error!(error = %e, database, graph, "Failed to load the existing graph from the database.");
                ProvisionError::from_store(e)
            });
        }

        info!(database, graph, "The database does not have a graph with the appropriate name. Creating a new one.");
        let wanted = self.schema.definition();
        match client.create_graph(database, graph, &wanted).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_conflict() => {
                let existing = client.read_graph(database, graph).await.map_err(ProvisionError::from_store)?;
                if existing.same_topology(&wanted) {
                    info!(database, graph, "Graph was created concurrently by another instance; using it.");
                    Ok(existing)
                } else {
                    error!(database, graph, "A conflicting graph was created concurrently.");
                    Err(ProvisionError::SchemaConflict { database: database.to_string(), graph: graph.to_string() })
                }
            }
            Err(e) => {
                error!(error = %e, database, graph, "Failed to create a new graph in the database.");
                Err(ProvisionError::from_store(e))
            }
        }
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod provision_tests;
