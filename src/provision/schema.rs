//! Fixed graph topology for the provisioning graph.

use crate::store::{EdgeDefinition, GraphDefinition};

pub const SCHEMA_VERSION: u32 = 1;

pub const ENVIRONMENT_VERTEX: &str = "environment";
pub const RESOURCE_VERTEX: &str = "resource";
pub const TEMPLATE_VERTEX: &str = "template";
pub const SERVICE_VERTEX: &str = "service";

pub const ENVIRONMENT_EDGES: &str = "environment-edges";
pub const RESOURCE_EDGES: &str = "resource-edges";
pub const SERVICE_EDGES: &str = "service-edges";

/// Vertex collections plus edge collections with their allowed endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSchema {
    pub version: u32,
    pub vertex_collections: Vec<String>,
    pub edges: Vec<EdgeDefinition>,
}

fn names(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

impl GraphSchema {
    pub fn provisioning() -> Self {
        // environment -> resource/template/service and back
        let environment_edges = EdgeDefinition {
            collection: ENVIRONMENT_EDGES.into(),
            from: names(&[ENVIRONMENT_VERTEX, RESOURCE_VERTEX, TEMPLATE_VERTEX, SERVICE_VERTEX]),
            to: names(&[ENVIRONMENT_VERTEX, RESOURCE_VERTEX, TEMPLATE_VERTEX, SERVICE_VERTEX]),
        };
        let resource_edges = EdgeDefinition {
            collection: RESOURCE_EDGES.into(),
            from: names(&[RESOURCE_VERTEX, TEMPLATE_VERTEX]),
            to: names(&[RESOURCE_VERTEX, TEMPLATE_VERTEX]),
        };
        let service_edges = EdgeDefinition {
            collection: SERVICE_EDGES.into(),
            from: names(&[SERVICE_VERTEX, RESOURCE_VERTEX]),
            to: names(&[SERVICE_VERTEX, RESOURCE_VERTEX]),
        };
        Self {
            version: SCHEMA_VERSION,
            vertex_collections: names(&[ENVIRONMENT_VERTEX, RESOURCE_VERTEX, TEMPLATE_VERTEX, SERVICE_VERTEX]),
            edges: vec![environment_edges, resource_edges, service_edges],
        }
    }

    /// Vertex collections that no edge definition references. The store refuses a
    /// collection that is both an orphan and an edge endpoint.
    pub fn orphan_collections(&self) -> Vec<String> {
        self.vertex_collections
            .iter()
            .filter(|v| !self.edges.iter().any(|e| e.from.contains(v) || e.to.contains(v)))
            .cloned()
            .collect()
    }

    pub fn definition(&self) -> GraphDefinition {
        GraphDefinition { edge_definitions: self.edges.clone(), orphan_collections: self.orphan_collections() }
    }
}
