//! Profile store tests against a real MongoDB.
//!
//! Requirements:
//! - Docker running (for testcontainers)

use air3_auth::config::ProfileConfig;
use air3_auth::storage::{CreateOutcome, ProfileStore, UserProfile};
use air3_auth_mongo::{MongoConfig, MongoProfileStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::mongo::Mongo;

async fn start_mongo() -> (ContainerAsync<Mongo>, MongoProfileStore) {
    let container = Mongo::default()
        .start()
        .await
        .expect("start mongo container");
    let host_port = container.get_host_port_ipv4(27017).await.expect("get port");

    let config = MongoConfig {
        url: format!("mongodb://127.0.0.1:{host_port}"),
        database: "air3_test".to_string(),
        collection: format!("users_{}", uuid::Uuid::new_v4().simple()),
        ..MongoConfig::default()
    };
    let store = MongoProfileStore::connect(&config).await.expect("connect");
    store.ping().await.expect("ping");
    store.ensure_indexes().await.expect("indexes");
    (container, store)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn create_find_and_set_role() {
    let (_container, store) = start_mongo().await;

    let profile = UserProfile::provisioned(
        "abcdef12-0000",
        Some("a@example.com".to_string()),
        &ProfileConfig::default(),
    );

    let outcome = store.create_profile(&profile).await.unwrap();
    assert!(matches!(outcome, CreateOutcome::Created(_)));

    let found = store.find_by_subject("abcdef12-0000").await.unwrap().unwrap();
    assert_eq!(found.username, "username_abcde");
    assert!(found.id.is_some());
    assert_eq!(
        store.find_by_subject("abcdef12-0000").await.unwrap(),
        Some(found)
    );

    assert!(store.set_role("abcdef12-0000", "judge").await.unwrap());
    let found = store.find_by_subject("abcdef12-0000").await.unwrap().unwrap();
    assert_eq!(found.role.as_deref(), Some("judge"));

    assert!(!store.set_role("nobody", "judge").await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn duplicate_subject_reports_already_exists() {
    let (_container, store) = start_mongo().await;

    let profile = UserProfile::provisioned("dup-subject", None, &ProfileConfig::default());
    assert!(matches!(
        store.create_profile(&profile).await.unwrap(),
        CreateOutcome::Created(_)
    ));
    assert_eq!(
        store.create_profile(&profile).await.unwrap(),
        CreateOutcome::AlreadyExists
    );
}
