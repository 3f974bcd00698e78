//! Singleflight memoization of expensive per-group builds.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::observability::SpanTimer;

/// Timing of one completed build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEvent<K> {
    /// The group that was built.
    pub group: K,
    /// How long the build took.
    pub elapsed: Duration,
    /// When the build finished.
    pub built_at: DateTime<Utc>,
}

impl<K> BuildEvent<K> {
    /// Build time in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Per-item cache of derived objects keyed by group.
///
/// `build` runs at most once per key for the lifetime of the cache, even
/// when several tasks ask for the same missing key at once: the first caller
/// builds while the rest wait for its result. A failed build leaves the key
/// empty so the next caller tries again.
///
/// The cached value is only meaningful for the entry set it was built from,
/// so create a fresh cache per work item instead of clearing one.
pub struct GroupCache<K, V> {
    entries: DashMap<K, Arc<OnceCell<Arc<V>>>>,
    events: Mutex<Vec<BuildEvent<K>>>,
    builds: AtomicUsize,
}

impl<K, V> GroupCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            events: Mutex::new(Vec::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Returns the value for `key`, building it with `build` if absent.
    ///
    /// The flag is true if this call ran the build.
    pub async fn get_or_build<F, Fut, E>(&self, key: &K, build: F) -> Result<(Arc<V>, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let was_built = AtomicBool::new(false);
        let value = cell
            .get_or_try_init(|| async {
                let timer = SpanTimer::start(key.to_string());
                let value = build().await?;
                let elapsed = timer.finish();

                was_built.store(true, Ordering::Relaxed);
                self.builds.fetch_add(1, Ordering::Relaxed);
                debug!(group = %key, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "Built group");
                self.events.lock().push(BuildEvent {
                    group: key.clone(),
                    elapsed,
                    built_at: Utc::now(),
                });
                Ok(Arc::new(value))
            })
            .await?;

        Ok((Arc::clone(value), was_built.into_inner()))
    }

    /// Returns the cached value for `key` without building.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .and_then(|cell| cell.get().map(Arc::clone))
    }

    /// Takes the build events recorded since the last drain.
    pub fn drain_events(&self) -> Vec<BuildEvent<K>> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of successful builds over the cache lifetime.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of keys with a built value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Returns true if nothing has been built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for GroupCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> fmt::Debug for GroupCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCache")
            .field("keys", &self.entries.len())
            .field("builds", &self.builds.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GroupKey;
    use std::sync::atomic::AtomicU32;

    fn key(counts: &[(&str, i64)]) -> GroupKey {
        GroupKey::from_counts(counts.iter().map(|(s, c)| (*s, *c)))
    }

    #[tokio::test]
    async fn test_builds_once_per_key() {
        let cache: GroupCache<GroupKey, String> = GroupCache::new();
        let builds = AtomicU32::new(0);
        let fe = key(&[("Fe", 1)]);

        for _ in 0..3 {
            let (value, _) = cache
                .get_or_build(&fe, || async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>("diagram".to_string())
                })
                .await
                .unwrap();
            assert_eq!(*value, "diagram");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.build_count(), 1);
        assert_eq!(cache.drain_events().len(), 1);
    }

    #[tokio::test]
    async fn test_was_built_flag() {
        let cache: GroupCache<GroupKey, u32> = GroupCache::new();
        let fe = key(&[("Fe", 1)]);

        let (_, first) = cache
            .get_or_build(&fe, || async { Ok::<_, String>(1) })
            .await
            .unwrap();
        let (value, second) = cache
            .get_or_build(&fe, || async { Ok::<_, String>(2) })
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(*value, 1);
    }

    #[tokio::test]
    async fn test_one_event_per_distinct_key() {
        let cache: GroupCache<GroupKey, u32> = GroupCache::new();
        let keys = [
            key(&[("Fe", 1)]),
            key(&[("Fe", 2), ("Zn", 1)]),
            key(&[("Zn", 1), ("Fe", 2)]),
            key(&[("Fe", 1)]),
        ];

        for k in &keys {
            cache
                .get_or_build(k, || async { Ok::<_, String>(0) })
                .await
                .unwrap();
        }

        let events = cache.drain_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].group, keys[0]);
        assert_eq!(events[1].group, keys[1]);
        assert!(cache.drain_events().is_empty());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_build_not_cached() {
        let cache: GroupCache<GroupKey, u32> = GroupCache::new();
        let fe = key(&[("Fe", 1)]);

        let err = cache
            .get_or_build(&fe, || async { Err::<u32, _>("engine failed") })
            .await
            .unwrap_err();
        assert_eq!(err, "engine failed");
        assert!(cache.get(&fe).is_none());
        assert!(cache.drain_events().is_empty());

        let (value, built) = cache
            .get_or_build(&fe, || async { Ok::<_, &str>(7) })
            .await
            .unwrap();
        assert!(built);
        assert_eq!(*value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interleaved_callers_on_one_task() {
        let cache: GroupCache<GroupKey, u32> = GroupCache::new();
        let builds = AtomicU32::new(0);
        let fe = key(&[("Fe", 1)]);

        let callers = (0..8).map(|_| {
            cache.get_or_build(&fe, || async {
                builds.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, String>(5)
            })
        });
        let results = futures::future::join_all(callers).await;

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Ok((v, _)) if **v == 5)));
        assert_eq!(results.iter().filter(|r| matches!(r, Ok((_, true)))).count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_build() {
        let cache: Arc<GroupCache<GroupKey, u32>> = Arc::new(GroupCache::new());
        let builds = Arc::new(AtomicU32::new(0));
        let fe = key(&[("Fe", 1)]);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let builds = builds.clone();
                let fe = fe.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_build(&fe, || async {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(42)
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut built_flags = 0;
        for task in tasks {
            let (value, built) = task.await.unwrap();
            assert_eq!(*value, 42);
            if built {
                built_flags += 1;
            }
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(built_flags, 1);
        assert_eq!(cache.drain_events().len(), 1);
    }

    #[tokio::test]
    async fn test_debug_reports_keys_and_builds() {
        let cache: GroupCache<GroupKey, u32> = GroupCache::new();
        cache
            .get_or_build(&key(&[("Zn", 2)]), || async { Ok::<_, String>(7) })
            .await
            .unwrap();

        let debug = format!("{cache:?}");
        assert_eq!(debug, "GroupCache { keys: 1, builds: 1 }");
    }
}
