use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provision::schema::SCHEMA_VERSION;

/// A logical collection of resource instances and services that work together towards
/// one or more goals, e.g. serving customers of a note-taking product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique identity of the environment.
    #[serde(rename = "_key")]
    pub id: String,

    /// Schema version that was active when the document was stored.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Human readable name, e.g. `production`.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// When the environment was created; `None` until it has been.
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,

    /// When the environment was destroyed; `None` while it is alive.
    #[serde(default)]
    pub destroyed_on: Option<DateTime<Utc>>,

    /// When destruction is planned; `None` if it is not planned.
    #[serde(default)]
    pub destruction_planned_on: Option<DateTime<Utc>>,
}

fn default_version() -> u32 { SCHEMA_VERSION }

impl Environment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: SCHEMA_VERSION,
            name: name.into(),
            description: String::new(),
            created_on: None,
            destroyed_on: None,
            destruction_planned_on: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schema_version() -> u32 { SCHEMA_VERSION }
}
