//! End-to-end tests of the HTTP API against the in-process graph store.
//! Each test serves the router on an ephemeral localhost port and talks to it with reqwest.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use provisioning_controller::config::Configuration;
use provisioning_controller::health::HealthCenter;
use provisioning_controller::server::{self, AppState};
use provisioning_controller::store::memory::{MemoryConnector, MemoryStoreClient};
use provisioning_controller::store::StoreClient;

struct TestServer {
    base: String,
    state: AppState,
    store: Arc<MemoryStoreClient>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let connector = MemoryConnector::new(MemoryStoreClient::shared());
        let cfg = Configuration::from_pairs([("db.user", "root"), ("db.password", "pw")]);
        let state = server::bootstrap(&cfg, connector.clone()).await.expect("bootstrap");
        Self::start_with(state, connector.client()).await
    }

    async fn start_with(state: AppState, store: Arc<MemoryStoreClient>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind 127.0.0.1:0");
        let port = listener.local_addr().unwrap().port();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::serve(listener, state.clone(), async move {
            let _ = stopped.await;
        }));
        Self { base: format!("http://127.0.0.1:{}/api/v1", port), state, store, stop: Some(stop), handle }
    }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base, path) }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.expect("server task").expect("server result");
    }
}

async fn body(resp: reqwest::Response) -> Value { resp.json::<Value>().await.expect("json body") }

#[tokio::test]
async fn liveliness_is_failed_until_the_database_probe_has_run() {
    let srv = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client.get(srv.url("self/liveliness")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    assert_eq!(body(resp).await, json!({"status": "failed", "checks": {"db-liveliness": "failed"}}));

    let resp = client.get(srv.url("self/liveliness?type=detailed")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let v = body(resp).await;
    assert_eq!(v["status"], "failed");
    assert!(v["time"].as_str().is_some());
    assert_eq!(v["checks"][0]["name"], "db-liveliness");
    assert_eq!(v["checks"].as_array().unwrap().len(), 1);

    srv.shutdown().await;
}

#[tokio::test]
async fn liveliness_reports_success_when_all_checks_pass() {
    let template = TestServer::start().await;
    // same repository, but a center without the delayed database probe
    let state = AppState { repository: template.state.repository.clone(), health: HealthCenter::new() };
    let store = template.store.clone();
    template.shutdown().await;

    let srv = TestServer::start_with(state, store).await;
    let resp = reqwest::get(srv.url("self/liveliness?type=summary")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(body(resp).await, json!({"status": "success", "checks": {}}));
    srv.shutdown().await;
}

#[tokio::test]
async fn self_routes_answer() {
    let srv = TestServer::start().await;

    let resp = reqwest::get(srv.url("self/ping")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let v = body(resp).await;
    assert!(v["response"].as_str().unwrap().starts_with("Pong - "));

    let v = body(reqwest::get(srv.url("self/info")).await.unwrap()).await;
    assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
    assert!(v.get("buildtime").is_some());
    assert!(v.get("revision").is_some());

    for path in ["self/readiness", "self/started"] {
        let resp = reqwest::get(srv.url(path)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 501);
        let v = body(resp).await;
        assert_eq!(v["status"], "error");
        assert_eq!(v["code"], "not_implemented");
        assert_eq!(v["message"], format!("/api/v1/{} is not implemented", path));
    }
    srv.shutdown().await;
}

#[tokio::test]
async fn environment_crud_round_trip() {
    let srv = TestServer::start().await;
    let client = reqwest::Client::new();
    let env = json!({
        "_key": "prod-1",
        "name": "production",
        "description": "customer facing",
        "created_on": "2021-03-04T05:06:07Z",
        "destroyed_on": null,
        "destruction_planned_on": null
    });

    let resp = client.put(srv.url("environment")).json(&env).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    assert_eq!(body(resp).await, env);

    let resp = client.get(srv.url("environment/prod-1")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(body(resp).await, env);

    // the stored document carries the schema version
    let stored = srv.store.read_document("provisioning", "environment", "prod-1").await.unwrap();
    assert_eq!(stored["version"], 1);

    let mut changed = env.clone();
    changed["name"] = json!("prod");
    let resp = client.put(srv.url("environment/prod-1")).json(&changed).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let list = body(client.get(srv.url("environment")).send().await.unwrap()).await;
    assert_eq!(list, json!([changed]));

    let resp = client.delete(srv.url("environment/prod-1")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    let resp = client.get(srv.url("environment/prod-1")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(body(resp).await["code"], "unknown_environment");

    srv.shutdown().await;
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
    let srv = TestServer::start().await;
    let client = reqwest::Client::new();
    let first = json!({"_key": "prod-1", "name": "production"});
    assert_eq!(client.put(srv.url("environment")).json(&first).send().await.unwrap().status().as_u16(), 201);

    let resp = client.put(srv.url("environment")).json(&json!({"_key": "prod-1", "name": "other"})).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let v = body(resp).await;
    assert_eq!(v["status"], "error");
    assert_eq!(v["code"], "duplicate_environment");

    let kept = body(client.get(srv.url("environment/prod-1")).send().await.unwrap()).await;
    assert_eq!(kept["name"], "production");
    srv.shutdown().await;
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let srv = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client.put(srv.url("environment")).json(&json!({"name": "no id"})).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(body(resp).await["code"], "invalid_environment");

    let resp = client
        .put(srv.url("environment"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(body(resp).await["code"], "malformed_request");

    let resp = client.put(srv.url("environment/a")).json(&json!({"_key": "b", "name": "n"})).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(body(resp).await["code"], "id_mismatch");

    let resp = client.put(srv.url("environment/ghost")).json(&json!({"name": "n"})).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    srv.shutdown().await;
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let srv = TestServer::start().await;
    srv.store.set_offline(true);
    let resp = reqwest::get(srv.url("environment")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    assert_eq!(body(resp).await["code"], "store_unavailable");
    srv.shutdown().await;
}

#[tokio::test]
async fn startup_fails_without_credentials() {
    let connector = MemoryConnector::new(MemoryStoreClient::shared());
    let cfg = Configuration::from_pairs([("db.password", "pw")]);
    let err = server::bootstrap(&cfg, connector.clone()).await.err().expect("bootstrap must fail");
    assert!(format!("{:#}", err).contains("db.user"));
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn shutdown_deregisters_checks() {
    let srv = TestServer::start().await;
    let health = srv.state.health.clone();
    assert_eq!(health.snapshot().await.checks.len(), 1);
    srv.shutdown().await;
    assert!(health.is_shut_down());
}
