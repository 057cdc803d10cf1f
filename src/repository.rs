//!
//! Environment repository
//! ----------------------
//! CRUD over the `environment` vertex collection of a provisioned graph. There is no
//! caching: every call goes to the store. Operations are plain futures, so a caller
//! cancels a request by dropping it.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::provision::schema::ENVIRONMENT_VERTEX;
use crate::provision::GraphHandle;
use crate::store::StoreError;

pub mod environment;

pub use environment::Environment;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("an environment with the ID '{id}' was already defined")]
    Duplicate { id: String, name: String },
    #[error("no environment with the ID '{id}' exists")]
    UnknownEnvironment { id: String },
    #[error("the environment data is missing information for field {field}")]
    InvalidField { field: &'static str },
    #[error("graph store request failed: {0}")]
    Transport(#[source] StoreError),
    #[error("environment document could not be (de)serialized: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl RepositoryError {
    pub fn http_status(&self) -> u16 {
        match self {
            RepositoryError::Duplicate { .. } => 409,
            RepositoryError::UnknownEnvironment { .. } => 404,
            RepositoryError::InvalidField { .. } => 400,
            RepositoryError::Transport(_) => 503,
            RepositoryError::Serialization(_) => 500,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Clone, Debug)]
pub struct EnvironmentRepository {
    graph: GraphHandle,
}

impl EnvironmentRepository {
    pub fn new(graph: GraphHandle) -> Self { Self { graph } }

    pub fn graph(&self) -> &GraphHandle { &self.graph }

    /// Insert a new environment. An existing ID is rejected, never overwritten.
    pub async fn create(&self, env: &Environment) -> RepositoryResult<()> {
        validate(env)?;
        let doc = to_document(env)?;
        match self.graph.client().create_document(self.graph.database(), ENVIRONMENT_VERTEX, doc).await {
            Ok(()) => {
                debug!(id = %env.id, name = %env.name, "environment stored");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                error!(id = %env.id, name = %env.name, "An environment with the given ID already exists");
                Err(RepositoryError::Duplicate { id: env.id.clone(), name: env.name.clone() })
            }
            Err(e) => {
                error!(error = %e, id = %env.id, "Failed to store the new environment");
                Err(RepositoryError::Transport(e))
            }
        }
    }

    pub async fn fetch_by_id(&self, id: &str) -> RepositoryResult<Environment> {
        self.ensure_exists(id).await?;
        let doc = self
            .graph
            .client()
            .read_document(self.graph.database(), ENVIRONMENT_VERTEX, id)
            .await
            .map_err(|e| not_found_as_unknown(e, id))?;
        serde_json::from_value(doc).map_err(RepositoryError::Serialization)
    }

    /// All environments, in whatever order the store returns them.
    pub async fn fetch_all(&self) -> RepositoryResult<Vec<Environment>> {
        let docs = self
            .graph
            .client()
            .read_all_documents(self.graph.database(), ENVIRONMENT_VERTEX)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to read the environment vertex collection");
                RepositoryError::Transport(e)
            })?;
        docs.into_iter()
            .map(|d| serde_json::from_value(d).map_err(RepositoryError::Serialization))
            .collect()
    }

    /// Replace the stored document of an existing environment.
    pub async fn update(&self, env: &Environment) -> RepositoryResult<()> {
        validate(env)?;
        self.ensure_exists(&env.id).await?;
        let doc = to_document(env)?;
        self.graph
            .client()
            .replace_document(self.graph.database(), ENVIRONMENT_VERTEX, &env.id, doc)
            .await
            .map_err(|e| not_found_as_unknown(e, &env.id))?;
        debug!(id = %env.id, "environment updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> RepositoryResult<()> {
        self.ensure_exists(id).await?;
        self.graph
            .client()
            .remove_document(self.graph.database(), ENVIRONMENT_VERTEX, id)
            .await
            .map_err(|e| not_found_as_unknown(e, id))?;
        debug!(id, "environment removed");
        Ok(())
    }

    async fn ensure_exists(&self, id: &str) -> RepositoryResult<()> {
        if id.is_empty() {
            return Err(RepositoryError::UnknownEnvironment { id: String::new() });
        }
        let exists = self
            .graph
            .client()
            .document_exists(self.graph.database(), ENVIRONMENT_VERTEX, id)
            .await
            .map_err(RepositoryError::Transport)?;
        if exists { Ok(()) } else { Err(RepositoryError::UnknownEnvironment { id: id.to_string() }) }
    }
}

fn validate(env: &Environment) -> RepositoryResult<()> {
    if env.id.trim().is_empty() {
        return Err(RepositoryError::InvalidField { field: "ID" });
    }
    if env.name.trim().is_empty() {
        return Err(RepositoryError::InvalidField { field: "Name" });
    }
    Ok(())
}

/// Serialize with the current schema version stamped in.
fn to_document(env: &Environment) -> RepositoryResult<Value> {
    let mut stamped = env.clone();
    stamped.version = Environment::schema_version();
    serde_json::to_value(&stamped).map_err(RepositoryError::Serialization)
}

// A document can vanish between the existence check and the follow-up call.
fn not_found_as_unknown(err: StoreError, id: &str) -> RepositoryError {
    if err.is_not_found() {
        RepositoryError::UnknownEnvironment { id: id.to_string() }
    } else {
        RepositoryError::Transport(err)
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod repository_tests;
