//! Secret resolution for agent runs.
//!
//! Each declared secret is looked up through its declared source, then
//! through conventional environment variable names derived from its alias
//! (`{ALIAS}_API_KEY`, `{ALIAS}_KEY`, `{ALIAS}_TOKEN`, `{ALIAS}_SECRET`).
//! Values found outside the local store are written through to it. Secrets
//! that cannot be found resolve to `None`; resolution never fails a run.

pub mod crypto;
pub mod providers;
pub mod store;
pub mod types;

pub use crypto::StoreKey;
pub use providers::{EnvSecretProvider, UnsupportedSecretProvider};
pub use store::LocalSecretStore;
pub use types::{
    conventional_env_names, redact_secret, SecretProvider, SecretResolution, SecretValidation,
};

use crate::agent::{SecretSource, SecretSpec};
use crate::env::SharedEnv;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Resolved secrets keyed by alias. Unresolved aliases map to `None`.
pub type ResolvedSecrets = BTreeMap<String, Option<String>>;

/// Resolves declared secrets against providers, the environment and the
/// local store.
pub struct SecretsResolver {
    providers: HashMap<SecretSource, Box<dyn SecretProvider>>,
    store: Option<Arc<LocalSecretStore>>,
    env: SharedEnv,
}

impl SecretsResolver {
    /// Resolver with the built-in providers and no local store.
    pub fn new(env: SharedEnv) -> Self {
        let mut resolver = Self {
            providers: HashMap::new(),
            store: None,
            env: env.clone(),
        };
        resolver = resolver.with_provider(Box::new(EnvSecretProvider::new(env)));
        for source in [SecretSource::Aws, SecretSource::Gcp, SecretSource::Vault] {
            resolver = resolver.with_provider(Box::new(UnsupportedSecretProvider::new(source)));
        }
        resolver
    }

    /// Use `store` for `local` secrets and as the write-through cache.
    pub fn with_store(mut self, store: Arc<LocalSecretStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register (or replace) the provider for its source.
    pub fn with_provider(mut self, provider: Box<dyn SecretProvider>) -> Self {
        self.providers.insert(provider.source(), provider);
        self
    }

    pub fn store(&self) -> Option<&Arc<LocalSecretStore>> {
        self.store.as_ref()
    }

    /// Resolve every declared secret. The result has exactly one entry per
    /// declared alias.
    pub async fn resolve_secrets(
        &self,
        declarations: &BTreeMap<String, SecretSpec>,
    ) -> ResolvedSecrets {
        let mut resolved = ResolvedSecrets::new();
        if declarations.is_empty() {
            return resolved;
        }

        let cached = match &self.store {
            Some(store) => store.load_secrets().await,
            None => HashMap::new(),
        };

        for (alias, spec) in declarations {
            let value = self.resolve_one(alias, spec, &cached).await;
            resolved.insert(alias.clone(), value);
        }

        let found = resolved.values().filter(|v| v.is_some()).count();
        info!(
            "Secret resolution complete: {found} resolved, {} missing",
            resolved.len() - found
        );
        resolved
    }

    async fn resolve_one(
        &self,
        alias: &str,
        spec: &SecretSpec,
        cached: &HashMap<String, String>,
    ) -> Option<String> {
        let key = if spec.value.is_empty() {
            alias
        } else {
            spec.value.as_str()
        };

        let from_source = match spec.source {
            SecretSource::Local => {
                if let Some(value) = non_empty(cached.get(key)) {
                    debug!("Secret '{alias}' resolved from local store");
                    return Some(value.clone());
                }
                None
            }
            SecretSource::Env => self.resolve_via_provider(alias, spec.source, key).await,
            SecretSource::Aws | SecretSource::Gcp | SecretSource::Vault => {
                // The store is the cache for remote sources.
                if let Some(value) = non_empty(cached.get(alias)) {
                    debug!("Secret '{alias}' ({}) served from local cache", spec.source);
                    return Some(value.clone());
                }
                self.resolve_via_provider(alias, spec.source, key).await
            }
        };

        let value = match from_source {
            Some(value) => value,
            None => match self.lookup_conventional(alias) {
                Some(value) => value,
                None => {
                    debug!("Secret '{alias}' could not be resolved from any source");
                    return None;
                }
            },
        };

        if !cached.contains_key(alias) {
            self.write_through(alias, &value).await;
        }
        Some(value)
    }

    async fn resolve_via_provider(
        &self,
        alias: &str,
        source: SecretSource,
        key: &str,
    ) -> Option<String> {
        let Some(provider) = self.providers.get(&source) else {
            warn!("No provider registered for '{source}' secrets; '{alias}' not found");
            return None;
        };

        if !provider.is_available() {
            warn!(
                "Secret provider '{}' is unavailable; '{alias}' not found via '{source}'",
                provider.name()
            );
            return None;
        }

        debug!("Resolving secret '{alias}' via provider '{}'", provider.name());
        match provider.resolve(key).await {
            SecretResolution::Resolved(value) if !value.is_empty() => Some(value),
            SecretResolution::Resolved(_) => None,
            SecretResolution::NotFound(msg) => {
                debug!("Secret '{alias}' not found via '{}': {msg}", provider.name());
                None
            }
            SecretResolution::Failed(msg) => {
                warn!("Secret '{alias}' lookup via '{}' failed: {msg}", provider.name());
                None
            }
        }
    }

    fn lookup_conventional(&self, alias: &str) -> Option<String> {
        conventional_env_names(alias).into_iter().find_map(|name| {
            let value = self.env.var(&name).filter(|v| !v.is_empty())?;
            debug!("Secret '{alias}' resolved from ${name}");
            Some(value)
        })
    }

    async fn write_through(&self, alias: &str, value: &str) {
        let Some(store) = &self.store else {
            return;
        };
        if store.key().is_ephemeral() {
            debug!("Not caching secret '{alias}': store key is temporary");
            return;
        }
        match store.store_if_absent(alias, value).await {
            Ok(true) => debug!("Cached secret '{alias}' in local store"),
            Ok(false) => {}
            Err(e) => error!("Failed to cache secret '{alias}' in local store: {e}"),
        }
    }
}

/// Report which aliases are unresolved.
pub fn validate_secrets(secrets: &ResolvedSecrets) -> SecretValidation {
    let missing: Vec<String> = secrets
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(alias, _)| alias.clone())
        .collect();
    SecretValidation {
        valid: missing.is_empty(),
        missing,
    }
}

fn non_empty(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn decl(entries: &[(&str, SecretSource, &str)]) -> BTreeMap<String, SecretSpec> {
        entries
            .iter()
            .map(|(alias, source, value)| {
                (
                    alias.to_string(),
                    SecretSpec {
                        source: *source,
                        value: value.to_string(),
                    },
                )
            })
            .collect()
    }

    fn temp_store(dir: &tempfile::TempDir) -> Arc<LocalSecretStore> {
        Arc::new(LocalSecretStore::new(
            dir.path().join("secrets.json"),
            StoreKey::from_secret("k"),
        ))
    }

    struct CountingVault {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SecretProvider for CountingVault {
        fn source(&self) -> SecretSource {
            SecretSource::Vault
        }

        fn name(&self) -> &str {
            "counting-vault"
        }

        async fn resolve(&self, key: &str) -> SecretResolution {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SecretResolution::Resolved(format!("vault:{key}"))
        }
    }

    #[tokio::test]
    async fn declared_env_source() {
        let env = Arc::new(MapEnv::new().with("MY_TOKEN", "t-1"));
        let resolver = SecretsResolver::new(env);
        let out = resolver
            .resolve_secrets(&decl(&[("svc", SecretSource::Env, "MY_TOKEN")]))
            .await;
        assert_eq!(out["svc"].as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn conventional_names_tried_in_order() {
        let env = Arc::new(
            MapEnv::new()
                .with("OPENAI_TOKEN", "from-token")
                .with("OPENAI_KEY", "from-key"),
        );
        let resolver = SecretsResolver::new(env);
        let out = resolver
            .resolve_secrets(&decl(&[("openai", SecretSource::Env, "NOT_SET")]))
            .await;
        assert_eq!(out["openai"].as_deref(), Some("from-key"));
    }

    #[tokio::test]
    async fn unresolved_secret_is_explicit_none() {
        let resolver = SecretsResolver::new(Arc::new(MapEnv::new()));
        let out = resolver
            .resolve_secrets(&decl(&[
                ("a", SecretSource::Env, "NOPE"),
                ("b", SecretSource::Aws, "arn:aws:secretsmanager:x"),
            ]))
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out["a"], None);
        assert_eq!(out["b"], None);

        let validation = validate_secrets(&out);
        assert!(!validation.valid);
        assert_eq!(validation.missing, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn local_source_reads_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.store_secret("db-pass", "hunter2").await.unwrap();

        let resolver = SecretsResolver::new(Arc::new(MapEnv::new())).with_store(store);
        let out = resolver
            .resolve_secrets(&decl(&[("db", SecretSource::Local, "db-pass")]))
            .await;
        assert_eq!(out["db"].as_deref(), Some("hunter2"));
        assert!(validate_secrets(&out).valid);
    }

    #[tokio::test]
    async fn env_values_are_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let env = Arc::new(MapEnv::new().with("GITHUB_TOKEN", "ghp-1"));

        let resolver = SecretsResolver::new(env).with_store(store.clone());
        resolver
            .resolve_secrets(&decl(&[("github", SecretSource::Env, "UNSET")]))
            .await;

        assert_eq!(store.load_secrets().await["github"], "ghp-1");
    }

    #[tokio::test]
    async fn write_through_keeps_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.store_secret("svc", "cached").await.unwrap();
        let env = Arc::new(MapEnv::new().with("SVC_TOKEN", "fresh"));

        let resolver = SecretsResolver::new(env).with_store(store.clone());
        let out = resolver
            .resolve_secrets(&decl(&[("svc", SecretSource::Env, "SVC_TOKEN")]))
            .await;

        assert_eq!(out["svc"].as_deref(), Some("fresh"));
        assert_eq!(store.load_secrets().await["svc"], "cached");
    }

    #[tokio::test]
    async fn remote_sources_are_cached_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = decl(&[("api", SecretSource::Vault, "secret/api")]);

        for _ in 0..2 {
            let resolver = SecretsResolver::new(Arc::new(MapEnv::new()))
                .with_store(store.clone())
                .with_provider(Box::new(CountingVault {
                    calls: calls.clone(),
                }));
            let out = resolver.resolve_secrets(&declarations).await;
            assert_eq!(out["api"].as_deref(), Some("vault:secret/api"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn temporary_key_never_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalSecretStore::new(
            dir.path().join("secrets.json"),
            StoreKey::generate(),
        ));
        let env = Arc::new(MapEnv::new().with("GITHUB_TOKEN", "ghp-1"));

        let out = SecretsResolver::new(env)
            .with_store(store.clone())
            .resolve_secrets(&decl(&[("github", SecretSource::Env, "UNSET")]))
            .await;

        assert_eq!(out["github"].as_deref(), Some("ghp-1"));
        assert!(store.aliases().await.is_empty());
    }

    #[tokio::test]
    async fn unavailable_provider_is_skipped() {
        struct Offline {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl SecretProvider for Offline {
            fn source(&self) -> SecretSource {
                SecretSource::Gcp
            }

            fn name(&self) -> &str {
                "offline"
            }

            async fn resolve(&self, _key: &str) -> SecretResolution {
                self.calls.fetch_add(1, Ordering::SeqCst);
                SecretResolution::Resolved("unexpected".into())
            }

            fn is_available(&self) -> bool {
                false
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let env = Arc::new(MapEnv::new().with("BILLING_API_KEY", "from-env"));
        let out = SecretsResolver::new(env)
            .with_provider(Box::new(Offline {
                calls: calls.clone(),
            }))
            .resolve_secrets(&decl(&[("billing", SecretSource::Gcp, "projects/x")]))
            .await;

        assert_eq!(out["billing"].as_deref(), Some("from-env"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validate_treats_empty_as_missing() {
        let mut secrets = ResolvedSecrets::new();
        secrets.insert("a".into(), Some(String::new()));
        secrets.insert("b".into(), Some("x".into()));
        let validation = validate_secrets(&secrets);
        assert_eq!(validation.missing, vec!["a".to_string()]);
    }
}
