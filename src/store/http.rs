//! REST client for an ArangoDB-compatible graph store.
//!
//! Status mapping: 409 -> `Conflict`, 404 -> `NotFound`, 401/403 -> `Unauthorized`,
//! connection and timeout failures -> `Transport`. Everything else keeps the HTTP code
//! and the server's `errorNum`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::{Connector, GraphDefinition, SharedClient, StoreClient, StoreEndpoint, StoreError, StoreResult};

const CURSOR_BATCH_SIZE: u32 = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error_num: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionBody {
    version: String,
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    graph: GraphDefinition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorBody {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Clone)]
pub struct HttpStoreClient {
    base: String,
    user: String,
    password: String,
    client: Client,
}

impl HttpStoreClient {
    pub fn new(endpoint: &StoreEndpoint) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: endpoint.url.trim_end_matches('/').to_string(),
            user: endpoint.user.clone(),
            password: endpoint.password.clone(),
            client,
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        trace!(target: "provisioning::store", %method, %url, "store request");
        self.client.request(method, url).basic_auth(&self.user, Some(&self.password))
    }

    fn db_url(&self, db: &str, path: &str) -> String {
        format!("{}/_db/{}/{}", self.base, urlencoding::encode(db), path)
    }

    fn document_url(&self, db: &str, collection: &str, key: &str) -> String {
        self.db_url(
            db,
            &format!("_api/document/{}/{}", urlencoding::encode(collection), urlencoding::encode(key)),
        )
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        builder.send().await.map_err(transport)
    }

    /// Run an existence probe: 2xx -> true, 404 -> false, anything else is an error.
    async fn exists(&self, builder: RequestBuilder, what: &str) -> StoreResult<bool> {
        let resp = self.send(builder).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp, what).await.map(|_| true)
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    if err.is_decode() {
        StoreError::Decode(err.to_string())
    } else {
        StoreError::Transport(err.to_string())
    }
}

async fn check(resp: Response, what: &str) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: ErrorBody = resp.json().await.unwrap_or_default();
    let message = body.error_message.unwrap_or_else(|| format!("{what} failed with HTTP {}", status.as_u16()));
    Err(match status {
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        other => StoreError::Status { code: other.as_u16(), error_num: body.error_num.unwrap_or(0), message },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> StoreResult<T> {
    resp.json::<T>().await.map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn version(&self) -> StoreResult<String> {
        let resp = self.send(self.request(Method::GET, format!("{}/_api/version", self.base))).await?;
        let body: VersionBody = decode(check(resp, "version").await?).await?;
        Ok(body.version)
    }

    async fn database_exists(&self, name: &str) -> StoreResult<bool> {
        let url = self.db_url(name, "_api/database/current");
        self.exists(self.request(Method::GET, url), "database lookup").await
    }

    async fn create_database(&self, name: &str) -> StoreResult<()> {
        let url = format!("{}/_api/database", self.base);
        let resp = self.send(self.request(Method::POST, url).json(&json!({ "name": name }))).await?;
        check(resp, "create database").await?;
        debug!(target: "provisioning::store", database = name, "database created");
        Ok(())
    }

    async fn graph_exists(&self, db: &str, graph: &str) -> StoreResult<bool> {
        let url = self.db_url(db, &format!("_api/gharial/{}", urlencoding::encode(graph)));
        self.exists(self.request(Method::GET, url), "graph lookup").await
    }

    async fn create_graph(&self, db: &str, graph: &str, definition: &GraphDefinition) -> StoreResult<GraphDefinition> {
        let url = self.db_url(db, "_api/gharial");
        let body = json!({
            "name": graph,
            "edgeDefinitions": definition.edge_definitions,
            "orphanCollections": definition.orphan_collections,
        });
        let resp = self.send(self.request(Method::POST, url).json(&body)).await?;
        let created: GraphBody = decode(check(resp, "create graph").await?).await?;
        Ok(created.graph)
    }

    async fn read_graph(&self, db: &str, graph: &str) -> StoreResult<GraphDefinition> {
        let url = self.db_url(db, &format!("_api/gharial/{}", urlencoding::encode(graph)));
        let resp = self.send(self.request(Method::GET, url)).await?;
        let body: GraphBody = decode(check(resp, "read graph").await?).await?;
        Ok(body.graph)
    }

    async fn document_exists(&self, db: &str, collection: &str, key: &str) -> StoreResult<bool> {
        let url = self.document_url(db, collection, key);
        self.exists(self.request(Method::HEAD, url), "document lookup").await
    }

    async fn create_document(&self, db: &str, collection: &str, document: Value) -> StoreResult<()> {
        let url = self.db_url(db, &format!("_api/document/{}", urlencoding::encode(collection)));
        let resp = self.send(self.request(Method::POST, url).json(&document)).await?;
        check(resp, "create document").await?;
        Ok(())
    }

    async fn read_document(&self, db: &str, collection: &str, key: &str) -> StoreResult<Value> {
        let url = self.document_url(db, collection, key);
        let resp = self.send(self.request(Method::GET, url)).await?;
        decode(check(resp, "read document").await?).await
    }

    async fn read_all_documents(&self, db: &str, collection: &str) -> StoreResult<Vec<Value>> {
        let url = self.db_url(db, "_api/cursor");
        let body = json!({
            "query": "FOR d IN @@collection RETURN d",
            "bindVars": { "@collection": collection },
            "batchSize": CURSOR_BATCH_SIZE,
        });
        let resp = self.send(self.request(Method::POST, url).json(&body)).await?;
        let mut page: CursorBody = decode(check(resp, "open cursor").await?).await?;
        let mut out = std::mem::take(&mut page.result);
        while page.has_more {
            let Some(id) = page.id.clone() else {
                return Err(StoreError::Decode("cursor reported more results without an id".into()));
            };
            let next = self.db_url(db, &format!("_api/cursor/{}", urlencoding::encode(&id)));
            let resp = self.send(self.request(Method::PUT, next)).await?;
            page = decode(check(resp, "read cursor").await?).await?;
            out.append(&mut page.result);
        }
        Ok(out)
    }

    async fn replace_document(&self, db: &str, collection: &str, key: &str, document: Value) -> StoreResult<()> {
        let url = self.document_url(db, collection, key);
        let resp = self.send(self.request(Method::PUT, url).json(&document)).await?;
        check(resp, "replace document").await?;
        Ok(())
    }

    async fn remove_document(&self, db: &str, collection: &str, key: &str) -> StoreResult<()> {
        let url = self.document_url(db, collection, key);
        let resp = self.send(self.request(Method::DELETE, url)).await?;
        check(resp, "remove document").await?;
        Ok(())
    }
}

/// Builds a fresh [`HttpStoreClient`] per connect call.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, endpoint: &StoreEndpoint) -> StoreResult<SharedClient> {
        Ok(Arc::new(HttpStoreClient::new(endpoint)?))
    }
}
