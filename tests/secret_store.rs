//! Local secret store behaviour through the public API.

use agentflow::agent::{SecretSource, SecretSpec};
use agentflow::env::{MapEnv, SharedEnv};
use agentflow::secrets::{validate_secrets, LocalSecretStore, SecretsResolver, StoreKey};
use std::collections::BTreeMap;
use std::sync::Arc;

fn spec(source: SecretSource, value: &str) -> SecretSpec {
    SecretSpec {
        source,
        value: value.to_string(),
    }
}

#[tokio::test]
async fn corrupt_entry_does_not_hide_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    let store = LocalSecretStore::new(&path, StoreKey::from_secret("passphrase"));
    store.store_secret("openai", "sk-openai").await.unwrap();
    store.store_secret("github", "ghp-token").await.unwrap();

    let mut file: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    file["entries"]["openai"] = serde_json::Value::String("AQID-not-a-real-entry".into());
    std::fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

    let loaded = store.load_secrets().await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get("github").map(String::as_str), Some("ghp-token"));
}

#[tokio::test]
async fn environment_secrets_are_cached_for_later_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    let mut declarations = BTreeMap::new();
    declarations.insert("anthropic".to_string(), spec(SecretSource::Env, ""));
    declarations.insert("missing".to_string(), spec(SecretSource::Env, ""));

    let first_env: SharedEnv = Arc::new(MapEnv::new().with("ANTHROPIC_API_KEY", "sk-ant"));
    let first = SecretsResolver::new(first_env).with_store(Arc::new(LocalSecretStore::new(
        &path,
        StoreKey::from_secret("k"),
    )));
    let resolved = first.resolve_secrets(&declarations).await;
    assert_eq!(resolved["anthropic"].as_deref(), Some("sk-ant"));
    assert_eq!(resolved["missing"], None);

    let validation = validate_secrets(&resolved);
    assert!(!validation.valid);
    assert_eq!(validation.missing, vec!["missing".to_string()]);

    // A later run without the variable reads the cached copy.
    let mut local = BTreeMap::new();
    local.insert("anthropic".to_string(), spec(SecretSource::Local, ""));
    let second = SecretsResolver::new(Arc::new(MapEnv::new())).with_store(Arc::new(
        LocalSecretStore::new(&path, StoreKey::from_secret("k")),
    ));
    let resolved = second.resolve_secrets(&local).await;
    assert_eq!(resolved["anthropic"].as_deref(), Some("sk-ant"));
}

#[tokio::test]
async fn run_with_temporary_key_keeps_real_key_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    LocalSecretStore::new(&path, StoreKey::from_secret("real"))
        .store_secret("openai", "sk-stored")
        .await
        .unwrap();

    let mut declarations = BTreeMap::new();
    declarations.insert("openai".to_string(), spec(SecretSource::Local, ""));
    let env: SharedEnv = Arc::new(MapEnv::new().with("OPENAI_API_KEY", "sk-shell"));
    let resolver = SecretsResolver::new(env).with_store(Arc::new(LocalSecretStore::new(
        &path,
        StoreKey::generate(),
    )));
    let resolved = resolver.resolve_secrets(&declarations).await;
    assert_eq!(resolved["openai"].as_deref(), Some("sk-shell"));

    let real = LocalSecretStore::new(&path, StoreKey::from_secret("real"));
    assert_eq!(
        real.load_secrets().await.get("openai").map(String::as_str),
        Some("sk-stored")
    );
}

#[tokio::test]
async fn run_with_wrong_key_keeps_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    LocalSecretStore::new(&path, StoreKey::from_secret("real"))
        .store_secret("openai", "sk-stored")
        .await
        .unwrap();

    let mut declarations = BTreeMap::new();
    declarations.insert("openai".to_string(), spec(SecretSource::Env, ""));
    let env: SharedEnv = Arc::new(MapEnv::new().with("OPENAI_API_KEY", "sk-shell"));
    SecretsResolver::new(env)
        .with_store(Arc::new(LocalSecretStore::new(
            &path,
            StoreKey::from_secret("wrong"),
        )))
        .resolve_secrets(&declarations)
        .await;

    let real = LocalSecretStore::new(&path, StoreKey::from_secret("real"));
    assert_eq!(real.load_secrets().await["openai"], "sk-stored");
}
