//! Per-identity permission cache.
//!
//! Entries hold the flattened union of an identity's role permissions and stay
//! authoritative for a fixed TTL. Role changes must call [`PermissionCache::invalidate`]
//! after committing; role redefinitions call [`PermissionCache::invalidate_all`].
//!
//! A global generation counter guards against a slow `resolve` re-inserting a
//! set it loaded before an invalidation: the counter is bumped before entries
//! are removed, and a load is only stored if the counter is unchanged while the
//! entry's shard is locked.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::clock::Clock;
use crate::errors::AppError;

/// Source of truth for role assignments.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Union of the permissions granted by every role currently assigned to
    /// the identity.
    async fn load_permissions(&self, identity_id: Uuid) -> Result<BTreeSet<String>, AppError>;
}

/// Immutable, cheaply clonable set of permission names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(Arc<BTreeSet<String>>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted permission names.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl From<BTreeSet<String>> for PermissionSet {
    fn from(set: BTreeSet<String>) -> Self {
        Self(Arc::new(set))
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    permissions: PermissionSet,
    computed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.computed_at < ttl
    }
}

struct Inner {
    entries: DashMap<Uuid, CacheEntry>,
    generation: AtomicU64,
    source: Arc<dyn PermissionSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    store_timeout: StdDuration,
}

#[derive(Clone)]
pub struct PermissionCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("entries", &self.inner.entries.len())
            .field("ttl_secs", &self.inner.ttl.num_seconds())
            .finish()
    }
}

impl PermissionCache {
    pub fn new(
        source: Arc<dyn PermissionSource>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                generation: AtomicU64::new(0),
                source,
                clock,
                ttl,
                store_timeout,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Number of cached identities, fresh or not.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns the identity's permission set, recomputing it when absent or
    /// older than the TTL. A failing or slow store yields the empty set and
    /// nothing is cached.
    pub async fn resolve(&self, identity_id: Uuid) -> PermissionSet {
        let now = self.inner.clock.now();

        if let Some(entry) = self.inner.entries.get(&identity_id) {
            if entry.is_fresh(now, self.inner.ttl) {
                tracing::debug!(user_id = %identity_id, "permission cache hit");
                return entry.permissions.clone();
            }
        }

        let generation = self.inner.generation.load(Ordering::Acquire);
        let loaded = tokio::time::timeout(
            self.inner.store_timeout,
            self.inner.source.load_permissions(identity_id),
        )
        .await;

        let permissions = match loaded {
            Ok(Ok(set)) => PermissionSet::from(set),
            Ok(Err(err)) => {
                tracing::warn!(user_id = %identity_id, error = %err, "permission store failed, resolving to no permissions");
                self.evict_stale(identity_id, now);
                return PermissionSet::empty();
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %identity_id,
                    timeout_ms = self.inner.store_timeout.as_millis() as u64,
                    "permission store timed out, resolving to no permissions"
                );
                self.evict_stale(identity_id, now);
                return PermissionSet::empty();
            }
        };

        tracing::debug!(user_id = %identity_id, count = permissions.len(), "permission set recomputed");
        self.store(identity_id, generation, permissions.clone(), now);
        permissions
    }

    /// Drops one identity's entry. Call after the role change has committed.
    pub fn invalidate(&self, identity_id: Uuid) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.entries.remove(&identity_id);
        tracing::debug!(user_id = %identity_id, "permission cache entry invalidated");
    }

    /// Drops every entry. Reserved for changes to what a role grants.
    pub fn invalidate_all(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = self.inner.entries.len();
        self.inner.entries.clear();
        tracing::info!(dropped, "permission cache cleared");
    }

    fn store(&self, identity_id: Uuid, generation: u64, permissions: PermissionSet, computed_at: DateTime<Utc>) {
        // The shard stays write-locked from here until the insert completes.
        let entry = self.inner.entries.entry(identity_id);
        if self.inner.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(user_id = %identity_id, "invalidated during load, not caching");
            return;
        }

        let fresh = CacheEntry {
            permissions,
            computed_at,
        };
        match entry {
            Entry::Occupied(mut occupied) => {
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }
    }

    fn evict_stale(&self, identity_id: Uuid, now: DateTime<Utc>) {
        let ttl = self.inner.ttl;
        self.inner
            .entries
            .remove_if(&identity_id, |_, entry| !entry.is_fresh(now, ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::clock::ManualClock;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeSource {
        grants: Mutex<HashMap<Uuid, BTreeSet<String>>>,
        failing: std::sync::atomic::AtomicBool,
        loads: AtomicUsize,
        entered: Option<Arc<Notify>>,
        release: Option<Arc<Notify>>,
    }

    impl FakeSource {
        fn grant(&self, id: Uuid, perms: &[&str]) {
            self.grants
                .lock()
                .unwrap()
                .insert(id, perms.iter().map(|p| p.to_string()).collect());
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionSource for FakeSource {
        async fn load_permissions(&self, identity_id: Uuid) -> Result<BTreeSet<String>, AppError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.grants.lock().unwrap().get(&identity_id).cloned();
            if let (Some(entered), Some(release)) = (&self.entered, &self.release) {
                entered.notify_one();
                release.notified().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::internal("store offline"));
            }
            Ok(snapshot.unwrap_or_default())
        }
    }

    fn cache_with(source: Arc<FakeSource>, clock: &ManualClock) -> PermissionCache {
        PermissionCache::new(
            source,
            Arc::new(clock.clone()),
            Duration::seconds(3600),
            StdDuration::from_secs(1),
        )
    }

    fn names(set: &PermissionSet) -> Vec<String> {
        set.to_vec()
    }

    #[tokio::test]
    async fn resolve_is_idempotent_within_ttl() {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(FakeSource::default());
        let id = Uuid::new_v4();
        source.grant(id, &["events.view", "tasks.view"]);
        let cache = cache_with(source.clone(), &clock);

        let first = cache.resolve(id).await;
        clock.advance(Duration::seconds(1800));
        source.grant(id, &["events.view"]);
        let second = cache.resolve(id).await;

        assert_eq!(first, second);
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn entry_expires_at_ttl_boundary() {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(FakeSource::default());
        let id = Uuid::new_v4();
        source.grant(id, &["events.view"]);
        let cache = cache_with(source.clone(), &clock);

        cache.resolve(id).await;
        clock.advance(Duration::seconds(3599));
        cache.resolve(id).await;
        assert_eq!(source.loads(), 1, "read at t=3599 must be served from cache");

        clock.advance(Duration::seconds(2));
        source.grant(id, &["events.view", "events.manage"]);
        let refreshed = cache.resolve(id).await;
        assert_eq!(source.loads(), 2, "read at t=3601 must recompute");
        assert_eq!(names(&refreshed), vec!["events.manage", "events.view"]);
    }

    #[tokio::test]
    async fn entry_at_exactly_ttl_is_stale() {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(FakeSource::default());
        let id = Uuid::new_v4();
        let cache = cache_with(source.clone(), &clock);

        cache.resolve(id).await;
        clock.advance(Duration::seconds(3600));
        cache.resolve(id).await;
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recomputation_for_that_identity_only() {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(FakeSource::default());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        source.grant(alice, &["admin.users.view"]);
        source.grant(bob, &["tasks.view"]);
        let cache = cache_with(source.clone(), &clock);

        cache.resolve(alice).await;
        cache.resolve(bob).await;
        source.grant(alice, &[]);
        cache.invalidate(alice);

        assert!(cache.resolve(alice).await.is_empty());
        assert_eq!(names(&cache.resolve(bob).await), vec!["tasks.view"]);
        assert_eq!(source.loads(), 3);
    }

    #[tokio::test]
    async fn invalidate_all_drops_every_entry() {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(FakeSource::default());
        let cache = cache_with(source.clone(), &clock);
        for _ in 0..4 {
            cache.resolve(Uuid::new_v4()).await;
        }
        assert_eq!(cache.len(), 4);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn store_failure_fails_closed_and_is_not_cached() {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(FakeSource::default());
        let id = Uuid::new_v4();
        source.grant(id, &["admin.roles.manage"]);
        let cache = cache_with(source.clone(), &clock);

        assert!(cache.resolve(id).await.contains("admin.roles.manage"));

        // Within TTL the cached value still stands.
        source.failing.store(true, Ordering::SeqCst);
        assert!(cache.resolve(id).await.contains("admin.roles.manage"));

        // Past TTL the stale elevated set must not be served as a fallback.
        clock.advance(Duration::seconds(3601));
        assert!(cache.resolve(id).await.is_empty());
        assert!(cache.is_empty());

        source.failing.store(false, Ordering::SeqCst);
        assert!(cache.resolve(id).await.contains("admin.roles.manage"));
    }

    #[tokio::test]
    async fn load_racing_an_invalidate_is_not_cached() {
        let clock = ManualClock::new(Utc::now());
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let source = Arc::new(FakeSource {
            entered: Some(entered.clone()),
            release: Some(release.clone()),
            ..FakeSource::default()
        });
        let id = Uuid::new_v4();
        source.grant(id, &["admin.roles.manage"]);
        let cache = PermissionCache::new(
            source.clone(),
            Arc::new(clock.clone()),
            Duration::seconds(3600),
            StdDuration::from_secs(5),
        );

        let in_flight = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(id).await }
        });

        entered.notified().await;
        source.grant(id, &[]);
        cache.invalidate(id);
        release.notify_one();

        let raced = in_flight.await.unwrap();
        assert!(raced.contains("admin.roles.manage"));
        assert!(cache.is_empty(), "a load that raced an invalidation must not be stored");

        release.notify_one();
        assert!(cache.resolve(id).await.is_empty());
    }
}
