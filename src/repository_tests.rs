use super::*;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::provision::{ConnectionSettings, SchemaProvisioner};
use crate::store::memory::{MemoryConnector, MemoryStoreClient, StoreCall};
use crate::store::StoreClient;

async fn repository() -> (EnvironmentRepository, Arc<MemoryStoreClient>) {
    let connector = MemoryConnector::new(MemoryStoreClient::shared());
    let settings = ConnectionSettings { user: Some("root".into()), password: Some("pw".into()), ..Default::default() };
    let graph = SchemaProvisioner::new(connector.clone()).provision(&settings).await.unwrap();
    (EnvironmentRepository::new(graph), connector.client())
}

#[tokio::test]
async fn create_then_fetch_round_trips_optional_timestamps() {
    let (repo, _) = repository().await;
    let mut env = Environment::new("prod-1", "production").with_description("customer facing");
    env.destruction_planned_on = Some(Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap());
    env.version = 0;

    repo.create(&env).await.unwrap();
    let got = repo.fetch_by_id("prod-1").await.unwrap();
    assert_eq!(got.name, "production");
    assert_eq!(got.description, "customer facing");
    assert_eq!(got.version, Environment::schema_version());
    assert_eq!(got.created_on, None);
    assert_eq!(got.destroyed_on, None);
    assert_eq!(got.destruction_planned_on, env.destruction_planned_on);
}

#[tokio::test]
async fn duplicate_id_is_a_conflict_and_leaves_original_untouched() {
    let (repo, store) = repository().await;
    repo.create(&Environment::new("prod-1", "production")).await.unwrap();
    let before = store.read_document("provisioning", "environment", "prod-1").await.unwrap();

    let err = repo.create(&Environment::new("prod-1", "imposter").with_description("x")).await.unwrap_err();
    match err {
        RepositoryError::Duplicate { id, name } => {
            assert_eq!(id, "prod-1");
            assert_eq!(name, "imposter");
        }
        other => panic!("unexpected error {other:?}"),
    }
    let after = store.read_document("provisioning", "environment", "prod-1").await.unwrap();
    assert_eq!(serde_json::to_vec(&before).unwrap(), serde_json::to_vec(&after).unwrap());
}

#[tokio::test]
async fn unknown_id_is_a_typed_not_found() {
    let (repo, store) = repository().await;
    store.clear_calls();
    let err = repo.fetch_by_id("missing").await.unwrap_err();
    assert!(matches!(err, RepositoryError::UnknownEnvironment { ref id } if id == "missing"));
    // existence is checked before any read
    assert_eq!(
        store.calls(),
        vec![StoreCall::DocumentExists("provisioning".into(), "environment".into(), "missing".into())]
    );
}

#[tokio::test]
async fn fetch_all_returns_every_environment() {
    let (repo, _) = repository().await;
    assert!(repo.fetch_all().await.unwrap().is_empty());
    for (id, name) in [("a", "alpha"), ("b", "beta"), ("c", "gamma")] {
        repo.create(&Environment::new(id, name)).await.unwrap();
    }
    let mut ids: Vec<String> = repo.fetch_all().await.unwrap().into_iter().map(|e| e.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn update_replaces_existing_and_rejects_unknown() {
    let (repo, _) = repository().await;
    repo.create(&Environment::new("e1", "before")).await.unwrap();

    let mut changed = Environment::new("e1", "after");
    changed.destroyed_on = Some(Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap());
    repo.update(&changed).await.unwrap();
    let got = repo.fetch_by_id("e1").await.unwrap();
    assert_eq!(got.name, "after");
    assert_eq!(got.destroyed_on, changed.destroyed_on);

    let err = repo.update(&Environment::new("ghost", "x")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::UnknownEnvironment { .. }));
}

#[tokio::test]
async fn delete_removes_and_then_reports_unknown() {
    let (repo, _) = repository().await;
    repo.create(&Environment::new("e1", "n")).await.unwrap();
    repo.delete("e1").await.unwrap();
    assert!(matches!(repo.fetch_by_id("e1").await, Err(RepositoryError::UnknownEnvironment { .. })));
    assert!(matches!(repo.delete("e1").await, Err(RepositoryError::UnknownEnvironment { .. })));
}

#[tokio::test]
async fn missing_fields_are_rejected_without_store_calls() {
    let (repo, store) = repository().await;
    store.clear_calls();
    assert!(matches!(repo.create(&Environment::new("", "n")).await, Err(RepositoryError::InvalidField { field: "ID" })));
    assert!(matches!(repo.create(&Environment::new("id", " ")).await, Err(RepositoryError::InvalidField { field: "Name" })));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn store_outage_is_a_transport_error() {
    let (repo, store) = repository().await;
    store.set_offline(true);
    let err = repo.create(&Environment::new("e", "n")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Transport(_)));
    assert_eq!(err.http_status(), 503);
    assert!(matches!(repo.fetch_by_id("e").await, Err(RepositoryError::Transport(_))));
    assert!(matches!(repo.fetch_all().await, Err(RepositoryError::Transport(_))));
}
