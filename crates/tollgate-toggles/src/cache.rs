//! Process-local TTL cache for the toggle document.
//!
//! The cache holds one loaded document and its expiry. Reads are served from
//! the cache until the TTL lapses or a refresh is forced; writes go through
//! [`ToggleCache::write`], which replaces the cached document with the one
//! just written so that an immediate read needs no second round trip.
//!
//! Every write and invalidation bumps a generation counter. A store read that
//! started before such a bump does not overwrite the cache when it returns,
//! so a slow refresh cannot put back a document older than an in-process
//! write.
//!
//! Static documents never expire. The cache is not shared across processes:
//! a change made elsewhere becomes visible here within one TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use tollgate_core::Result;

use crate::document::ToggleMap;
use crate::metrics::ToggleMetrics;
use crate::store::{SecretBackedToggleStore, ToggleSnapshot};

/// Lower bound on the cache TTL.
pub const MIN_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedDocument {
    snapshot: Arc<ToggleSnapshot>,
    /// `None` never expires.
    expires_at: Option<Instant>,
}

impl CachedDocument {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CachedDocument>,
    generation: u64,
}

/// TTL cache in front of a [`SecretBackedToggleStore`].
#[derive(Debug)]
pub struct ToggleCache {
    store: SecretBackedToggleStore,
    ttl: Duration,
    state: RwLock<CacheState>,
    metrics: ToggleMetrics,
}

impl ToggleCache {
    /// Creates an empty cache. TTLs below [`MIN_CACHE_TTL`] are raised to it.
    #[must_use]
    pub fn new(store: SecretBackedToggleStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl: ttl.max(MIN_CACHE_TTL),
            state: RwLock::new(CacheState::default()),
            metrics: ToggleMetrics::new(),
        }
    }

    /// Returns the effective TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &SecretBackedToggleStore {
        &self.store
    }

    /// Returns the toggle document.
    ///
    /// Serves the cached document if present, fresh, and not `force_refresh`;
    /// otherwise reads the store and replaces the cache wholesale, unless a
    /// write or invalidation landed while the read was in flight.
    ///
    /// # Errors
    ///
    /// Propagates store read failures. The cache is left untouched on failure.
    pub async fn get(&self, force_refresh: bool) -> Result<Arc<ToggleSnapshot>> {
        let generation = {
            let state = self.state.read().await;
            if !force_refresh {
                if let Some(entry) = state.entry.as_ref().filter(|e| e.is_fresh(Instant::now())) {
                    self.metrics.record_cache_lookup(true);
                    return Ok(Arc::clone(&entry.snapshot));
                }
            }
            state.generation
        };
        self.metrics.record_cache_lookup(false);

        let snapshot = self.store.read_all().await?;
        let mut state = self.state.write().await;
        if state.generation != generation {
            if let Some(entry) = state.entry.as_ref() {
                return Ok(Arc::clone(&entry.snapshot));
            }
            return Ok(Arc::new(snapshot));
        }
        Ok(self.install(&mut state, snapshot))
    }

    /// Writes `next` as the whole document, then primes the cache with it.
    ///
    /// # Errors
    ///
    /// Propagates store write failures. On failure the cache is not touched.
    pub async fn write(&self, next: ToggleMap) -> Result<Arc<ToggleSnapshot>> {
        let version = self.store.write_all(&next).await?;
        let mut state = self.state.write().await;
        state.generation += 1;
        Ok(self.install(
            &mut state,
            ToggleSnapshot {
                data: next,
                version,
            },
        ))
    }

    /// Drops the cached document.
    ///
    /// Intended for test harnesses; production reads rely on the TTL.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.entry = None;
    }

    fn install(&self, state: &mut CacheState, snapshot: ToggleSnapshot) -> Arc<ToggleSnapshot> {
        let expires_at = if snapshot.version.is_static() {
            None
        } else {
            Some(Instant::now() + self.ttl)
        };
        let snapshot = Arc::new(snapshot);
        state.entry = Some(CachedDocument {
            snapshot: Arc::clone(&snapshot),
            expires_at,
        });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;
    use crate::record::ToggleState;
    use serde_json::json;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;
    use tollgate_core::{MemorySecretService, SecretService, SecretVersion};
    use tollgate_test_utils::{RecordingSecretService, SecretOp};

    /// Secret service whose next read can be held after it has loaded the payload.
    #[derive(Debug, Default)]
    struct HeldReadSecrets {
        inner: MemorySecretService,
        hold_next: AtomicBool,
        loaded: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl SecretService for HeldReadSecrets {
        async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion> {
            let version = self.inner.get_current_version(secret_id).await;
            if self.hold_next.swap(false, Ordering::SeqCst) {
                self.loaded.notify_one();
                self.release.notified().await;
            }
            version
        }

        async fn put_new_version(
            &self,
            secret_id: &str,
            payload: Bytes,
            idempotency_token: &str,
        ) -> Result<String> {
            self.inner
                .put_new_version(secret_id, payload, idempotency_token)
                .await
        }
    }

    fn recording_cache(ttl: Duration) -> (RecordingSecretService, ToggleCache) {
        let secrets = RecordingSecretService::with_secret("toggles", r#"{"a": {"state": "pilot"}}"#);
        let store = SecretBackedToggleStore::secret(Arc::new(secrets.clone()), "toggles");
        (secrets, ToggleCache::new(store, ttl))
    }

    fn reads(secrets: &RecordingSecretService) -> usize {
        secrets
            .operations()
            .iter()
            .filter(|op| matches!(op, SecretOp::Get { .. }))
            .count()
    }

    #[test]
    fn ttl_has_a_floor() {
        let store = SecretBackedToggleStore::fixed(ToggleMap::new());
        let cache = ToggleCache::new(store, Duration::from_secs(1));
        assert_eq!(cache.ttl(), MIN_CACHE_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn serves_from_cache_until_ttl_expires() {
        let (secrets, cache) = recording_cache(Duration::from_secs(30));

        cache.get(false).await.unwrap();
        cache.get(false).await.unwrap();
        assert_eq!(reads(&secrets), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.get(false).await.unwrap();
        assert_eq!(reads(&secrets), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_cache() {
        let (secrets, cache) = recording_cache(Duration::from_secs(30));
        cache.get(false).await.unwrap();
        cache.get(true).await.unwrap();
        assert_eq!(reads(&secrets), 2);
    }

    #[tokio::test]
    async fn write_primes_cache_without_a_second_read() {
        let (secrets, cache) = recording_cache(Duration::from_secs(30));
        let mut next = cache.get(false).await.unwrap().data.clone();
        next.get_mut("a").unwrap().state = ToggleState::Enabled;

        let written = cache.write(next).await.unwrap();
        let observed = cache.get(false).await.unwrap();

        assert_eq!(observed.data["a"].state, ToggleState::Enabled);
        assert_eq!(observed.version, written.version);
        assert_eq!(reads(&secrets), 1);
    }

    #[tokio::test]
    async fn failed_read_leaves_cache_untouched() {
        let (secrets, cache) = recording_cache(Duration::from_secs(30));
        let first = cache.get(false).await.unwrap();

        secrets.inject_failure("toggles");
        assert!(cache.get(true).await.is_err());

        secrets.clear_failures();
        let cached = cache.get(false).await.unwrap();
        assert_eq!(cached.version, first.version);
    }

    #[tokio::test(start_paused = true)]
    async fn static_documents_never_expire() {
        let document = parse_document(&json!({"a": {"state": "enabled"}})).unwrap();
        let cache = ToggleCache::new(SecretBackedToggleStore::fixed(document), MIN_CACHE_TTL);

        let mut next = cache.get(false).await.unwrap().data.clone();
        next.get_mut("a").unwrap().state = ToggleState::Disabled;
        cache.write(next).await.unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        let observed = cache.get(false).await.unwrap();
        assert_eq!(observed.data["a"].state, ToggleState::Disabled);
    }

    #[tokio::test]
    async fn invalidate_forces_next_read() {
        let secrets = MemorySecretService::with_secret("toggles", "{}");
        let cache = ToggleCache::new(
            SecretBackedToggleStore::secret(Arc::new(secrets.clone()), "toggles"),
            Duration::from_secs(60),
        );
        assert!(cache.get(false).await.unwrap().data.is_empty());

        tollgate_core::SecretService::put_new_version(
            &secrets,
            "toggles",
            bytes::Bytes::from(r#"{"b": {}}"#),
            "t",
        )
        .await
        .unwrap();
        assert!(cache.get(false).await.unwrap().data.is_empty());

        cache.invalidate().await;
        assert!(cache.get(false).await.unwrap().data.contains_key("b"));
    }

    #[tokio::test]
    async fn slow_refresh_does_not_overwrite_a_newer_write() {
        let secrets = Arc::new(HeldReadSecrets {
            inner: MemorySecretService::with_secret("toggles", r#"{"a": {"state": "pilot"}}"#),
            ..HeldReadSecrets::default()
        });
        let cache = Arc::new(ToggleCache::new(
            SecretBackedToggleStore::secret(secrets.clone(), "toggles"),
            Duration::from_secs(60),
        ));
        let mut next = cache.get(false).await.unwrap().data.clone();
        next.get_mut("a").unwrap().state = ToggleState::Enabled;

        secrets.hold_next.store(true, Ordering::SeqCst);
        let refresh = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get(true).await }
        });
        secrets.loaded.notified().await;

        let written = cache.write(next).await.unwrap();
        secrets.release.notify_one();

        let refreshed = refresh.await.unwrap().unwrap();
        assert_eq!(refreshed.version, written.version);
        let observed = cache.get(false).await.unwrap();
        assert_eq!(observed.data["a"].state, ToggleState::Enabled);
        assert_eq!(observed.version, written.version);
    }
}
