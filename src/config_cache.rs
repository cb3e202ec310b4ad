//! Fetch-once cache for the runtime config, for Rust clients of
//! `GET /api/config`. The server itself reads `Settings` directly and does not
//! go through this cache.
//!
//! The cache is always in one of three states. Concurrent callers that find a
//! fetch in flight wait for its result instead of starting another one.
//! `clear_cache` bumps a generation counter so a fetch that was already
//! running when the cache was cleared cannot store its result.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{info, warn};

/// Where configuration comes from when nothing is cached.
pub trait ConfigSource: Send + Sync {
    type Config: Clone + Send + Sync + 'static;

    fn fetch(&self) -> impl Future<Output = Result<Self::Config, String>> + Send;
}

/// Secondary store consulted before fetching, e.g. one that outlives the cache.
pub trait ConfigStorage<T>: Send + Sync {
    fn load(&self) -> Option<T>;
    fn store(&self, value: &T);
    fn clear(&self);
}

/// Process-local storage. Clones share the same slot.
pub struct MemoryStorage<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for MemoryStorage<T> {
    fn clone(&self) -> Self {
        MemoryStorage(Arc::clone(&self.0))
    }
}

impl<T> Default for MemoryStorage<T> {
    fn default() -> Self {
        MemoryStorage(Arc::new(Mutex::new(None)))
    }
}

impl<T> MemoryStorage<T> {
    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send> ConfigStorage<T> for MemoryStorage<T> {
    fn load(&self) -> Option<T> {
        self.slot().clone()
    }

    fn store(&self, value: &T) {
        *self.slot() = Some(value.clone());
    }

    fn clear(&self) {
        *self.slot() = None;
    }
}

type FetchResult<T> = Option<Result<T, String>>;

enum State<T> {
    Unloaded,
    Loading {
        fetch: u64,
        done: watch::Receiver<FetchResult<T>>,
    },
    Loaded(T),
}

struct Inner<T> {
    state: State<T>,
    generation: u64,
    fetches: u64,
}

enum Turn<T> {
    Leader {
        fetch: u64,
        generation: u64,
        done: watch::Sender<FetchResult<T>>,
    },
    Follower {
        fetch: u64,
        done: watch::Receiver<FetchResult<T>>,
    },
}

pub struct ConfigCache<S: ConfigSource, St> {
    source: S,
    storage: St,
    inner: Mutex<Inner<S::Config>>,
}

impl<S, St> ConfigCache<S, St>
where
    S: ConfigSource,
    St: ConfigStorage<S::Config>,
{
    pub fn new(source: S, storage: St) -> Self {
        ConfigCache {
            source,
            storage,
            inner: Mutex::new(Inner {
                state: State::Unloaded,
                generation: 0,
                fetches: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S::Config>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.lock().state, State::Loaded(_))
    }

    /// Returns the cached config, falling back to storage and then to a single
    /// shared fetch.
    pub async fn get_config(&self) -> Result<S::Config, String> {
        loop {
            let turn = {
                let mut inner = self.lock();
                match &inner.state {
                    State::Loaded(value) => return Ok(value.clone()),
                    State::Loading { fetch, done } => Turn::Follower {
                        fetch: *fetch,
                        done: done.clone(),
                    },
                    State::Unloaded => {
                        if let Some(value) = self.storage.load() {
                            inner.state = State::Loaded(value.clone());
                            return Ok(value);
                        }
                        inner.fetches += 1;
                        let fetch = inner.fetches;
                        let (tx, rx) = watch::channel(None);
                        inner.state = State::Loading { fetch, done: rx };
                        Turn::Leader {
                            fetch,
                            generation: inner.generation,
                            done: tx,
                        }
                    }
                }
            };

            match turn {
                Turn::Leader {
                    fetch,
                    generation,
                    done,
                } => {
                    let result = self.source.fetch().await;
                    self.finish(fetch, generation, &result);
                    // Followers may all have gone away.
                    let _ = done.send(Some(result.clone()));
                    return result;
                }
                Turn::Follower { fetch, mut done } => {
                    if let Ok(result) = done.wait_for(Option::is_some).await {
                        if let Some(result) = result.as_ref() {
                            return result.clone();
                        }
                    }
                    // The leader was dropped before it finished.
                    warn!(fetch, "Config fetch abandoned, retrying");
                    let mut inner = self.lock();
                    if matches!(inner.state, State::Loading { fetch: current, .. } if current == fetch)
                    {
                        inner.state = State::Unloaded;
                    }
                }
            }
        }
    }

    fn finish(&self, fetch: u64, generation: u64, result: &Result<S::Config, String>) {
        let mut inner = self.lock();
        if inner.generation != generation {
            info!(fetch, "Config fetched after cache was cleared, discarding");
            return;
        }
        inner.state = match result {
            Ok(value) => {
                self.storage.store(value);
                State::Loaded(value.clone())
            }
            Err(err) => {
                warn!(fetch, error = %err, "Config fetch failed");
                State::Unloaded
            }
        };
    }

    /// Drops the cached value and the stored copy. The next `get_config`
    /// fetches again.
    pub fn clear_cache(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = State::Unloaded;
        self.storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::RuntimeConfig;

    #[derive(Clone)]
    struct FakeSource {
        calls: Arc<AtomicUsize>,
        failures: usize,
    }

    impl FakeSource {
        fn new() -> Self {
            FakeSource {
                calls: Arc::new(AtomicUsize::new(0)),
                failures: 0,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ConfigSource for FakeSource {
        type Config = RuntimeConfig;

        async fn fetch(&self) -> Result<RuntimeConfig, String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            if call <= self.failures {
                return Err("config endpoint unavailable".to_string());
            }
            Ok(RuntimeConfig {
                chatbot_enabled: true,
                chatbot_api_url: format!("https://bot.example.com/{call}"),
                chatbot_api_token: "secret".to_string(),
            })
        }
    }

    fn url(result: Result<RuntimeConfig, String>) -> String {
        result.unwrap().chatbot_api_url
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let source = FakeSource::new();
        let cache = ConfigCache::new(source.clone(), MemoryStorage::default());

        let (a, b, c) = tokio::join!(cache.get_config(), cache.get_config(), cache.get_config());
        assert_eq!(source.calls(), 1);
        assert_eq!(url(a), "https://bot.example.com/1");
        assert_eq!(url(b), "https://bot.example.com/1");
        assert_eq!(url(c), "https://bot.example.com/1");

        assert_eq!(url(cache.get_config().await), "https://bot.example.com/1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn clear_forces_a_refetch() {
        let source = FakeSource::new();
        let storage = MemoryStorage::default();
        let cache = ConfigCache::new(source.clone(), storage.clone());

        cache.get_config().await.unwrap();
        assert!(storage.load().is_some());

        cache.clear_cache();
        assert!(!cache.is_loaded());
        assert!(storage.load().is_none());
        assert_eq!(url(cache.get_config().await), "https://bot.example.com/2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn storage_is_used_before_fetching() {
        let source = FakeSource::new();
        let storage = MemoryStorage::default();
        ConfigCache::new(source.clone(), storage.clone())
            .get_config()
            .await
            .unwrap();

        let fresh = ConfigCache::new(source.clone(), storage);
        assert_eq!(url(fresh.get_config().await), "https://bot.example.com/1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn fetch_finishing_after_clear_is_not_cached() {
        let source = FakeSource::new();
        let storage = MemoryStorage::default();
        let cache = ConfigCache::new(source.clone(), storage.clone());

        let (first, ()) = tokio::join!(cache.get_config(), async {
            tokio::task::yield_now().await;
            cache.clear_cache();
        });
        assert_eq!(url(first), "https://bot.example.com/1");
        assert!(!cache.is_loaded());
        assert!(storage.load().is_none());

        assert_eq!(url(cache.get_config().await), "https://bot.example.com/2");
    }

    #[tokio::test]
    async fn failed_fetch_leaves_the_cache_unloaded() {
        let source = FakeSource {
            failures: 1,
            ..FakeSource::new()
        };
        let cache = ConfigCache::new(source.clone(), MemoryStorage::default());

        let (a, b) = tokio::join!(cache.get_config(), cache.get_config());
        assert!(a.is_err());
        assert!(b.is_err());
        assert!(!cache.is_loaded());

        assert_eq!(url(cache.get_config().await), "https://bot.example.com/2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn dropped_fetch_does_not_wedge_the_cache() {
        let source = FakeSource::new();
        let cache = ConfigCache::new(source.clone(), MemoryStorage::default());

        {
            let abandoned = cache.get_config();
            tokio::pin!(abandoned);
            assert!(futures_poll_once(abandoned.as_mut()).await.is_none());
        }

        assert_eq!(url(cache.get_config().await), "https://bot.example.com/2");
    }

    async fn futures_poll_once<F: Future + Unpin>(fut: F) -> Option<F::Output> {
        let mut fut = fut;
        std::future::poll_fn(|cx| {
            std::task::Poll::Ready(match std::pin::Pin::new(&mut fut).poll(cx) {
                std::task::Poll::Ready(out) => Some(out),
                std::task::Poll::Pending => None,
            })
        })
        .await
    }
}
