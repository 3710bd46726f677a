//! Company settings resolution with an explicit owner and a TTL cache.

use crate::models::CompanySettings;
use async_trait::async_trait;
use dashmap::DashMap;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Backing store for company settings.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load_settings(&self, owner_id: Uuid) -> Result<Option<CompanySettings>, AppError>;
}

struct CachedSettings {
    settings: CompanySettings,
    fetched_at: Instant,
}

/// Resolves company settings for an owner, caching each entry for `ttl`.
pub struct SettingsResolver {
    source: Arc<dyn SettingsSource>,
    ttl: Duration,
    cache: DashMap<Uuid, CachedSettings>,
}

impl SettingsResolver {
    pub fn new(source: Arc<dyn SettingsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Settings for `owner_id`; defaults when the owner has none stored.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn resolve(&self, owner_id: Uuid) -> Result<CompanySettings, AppError> {
        if let Some(entry) = self.cache.get(&owner_id) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.settings.clone());
            }
        }

        debug!("Loading company settings");
        let settings = self
            .source
            .load_settings(owner_id)
            .await?
            .unwrap_or_default();

        self.cache.insert(
            owner_id,
            CachedSettings {
                settings: settings.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(settings)
    }

    /// Drop the cached entry so the next resolve reloads it.
    pub fn invalidate(&self, owner_id: Uuid) {
        self.cache.remove(&owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        settings: Option<CompanySettings>,
    }

    #[async_trait]
    impl SettingsSource for CountingSource {
        async fn load_settings(
            &self,
            _owner_id: Uuid,
        ) -> Result<Option<CompanySettings>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.settings.clone())
        }
    }

    fn source(settings: Option<CompanySettings>) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            settings,
        })
    }

    #[tokio::test]
    async fn test_resolve_caches_within_ttl() {
        let src = source(Some(CompanySettings {
            company_name: Some("Acme".into()),
            ..CompanySettings::default()
        }));
        let resolver = SettingsResolver::new(src.clone(), Duration::from_secs(300));
        let owner = Uuid::new_v4();

        let first = resolver.resolve(owner).await.expect("resolve");
        let second = resolver.resolve(owner).await.expect("resolve");

        assert_eq!(first.company_name.as_deref(), Some("Acme"));
        assert_eq!(first, second);
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_and_invalidate_reload() {
        let src = source(None);
        let owner = Uuid::new_v4();

        let resolver = SettingsResolver::new(src.clone(), Duration::ZERO);
        resolver.resolve(owner).await.expect("resolve");
        resolver.resolve(owner).await.expect("resolve");
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);

        let resolver = SettingsResolver::new(src.clone(), Duration::from_secs(300));
        resolver.resolve(owner).await.expect("resolve");
        resolver.invalidate(owner);
        resolver.resolve(owner).await.expect("resolve");
        assert_eq!(src.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_missing_settings_resolve_to_defaults() {
        let resolver = SettingsResolver::new(source(None), Duration::from_secs(60));
        let settings = resolver.resolve(Uuid::new_v4()).await.expect("resolve");
        assert_eq!(settings, CompanySettings::default());
    }
}
