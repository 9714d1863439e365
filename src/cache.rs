//! Single-slot TTL cache / 单槽TTL缓存
//!
//! Holds one value together with its expiry instant. Callers only ever go
//! through a refresh entry point; the slot itself is not exposed. The lock is
//! only taken for the copy in or out, never across an await, so two concurrent
//! misses may both fetch and the last writer wins.
//! 只通过刷新入口访问，不暴露槽本身；只在读写瞬间持锁，不跨越await；
//! 并发未命中时可能重复获取，以最后写入为准。

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<(T, Instant)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Value if present and not yet expired / 返回未过期的值
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    fn put(&self, value: T, ttl: Duration) {
        *self.slot.lock() = Some((value, Instant::now() + ttl));
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// Return the cached value or run `fetch`.
    ///
    /// `Some` is stored for the cache TTL. `None` and errors are handed back
    /// uncached and clear the slot.
    /// 命中则返回缓存值，否则执行`fetch`；`Some`写入缓存，`None`或失败清空缓存。
    pub async fn get_or_refresh<F, Fut, E>(&self, fetch: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(value) = self.get() {
            return Ok(Some(value));
        }
        self.refresh(fetch).await
    }

    /// Like [`get_or_refresh`](Self::get_or_refresh) but ignores a fresh entry
    /// 忽略未过期的缓存，强制刷新
    pub async fn refresh<F, Fut, E>(&self, fetch: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        match fetch().await {
            Ok(Some(value)) => {
                self.put(value.clone(), self.ttl);
                Ok(Some(value))
            }
            Ok(None) => {
                self.clear();
                Ok(None)
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Variant for values that carry their own lifetime / 值自带有效期的变体
    pub async fn get_or_refresh_for<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Duration), E>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        match fetch().await {
            Ok((value, ttl)) => {
                self.put(value.clone(), ttl);
                Ok(value)
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Whether the slot holds anything, expired or not / 槽中是否有值（不论是否过期）
    #[cfg(test)]
    pub(crate) fn is_populated(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let url = "https://api.example.com:443".to_string();
        cache
            .get_or_refresh(|| async { Ok::<_, ()>(Some(url.clone())) })
            .await
            .unwrap();
        assert_eq!(cache.get().as_deref(), Some("https://api.example.com:443"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get().is_none());
        assert!(cache.is_populated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_refresh_fetches_once_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Option<u32>, ()> = cache
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(7))
                })
                .await;
            assert_eq!(value, Ok(Some(7)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        let _ = cache
            .get_or_refresh(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(Some(8))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(), Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_clears_slot() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.get_or_refresh(|| async { Ok::<_, &str>(Some(1u8)) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let result = cache.get_or_refresh(|| async { Err::<Option<u8>, _>("down") }).await;
        assert_eq!(result, Err("down"));
        assert!(!cache.is_populated());
    }

    #[tokio::test]
    async fn test_none_is_not_cached() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.get_or_refresh(|| async { Ok::<_, ()>(Some(1u8)) }).await.unwrap();

        let result = cache.refresh(|| async { Ok::<Option<u8>, ()>(None) }).await;
        assert_eq!(result, Ok(None));
        assert!(!cache.is_populated());
    }

    #[tokio::test]
    async fn test_refresh_replaces_fresh_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.get_or_refresh(|| async { Ok::<_, ()>(Some(1u8)) }).await.unwrap();
        cache.refresh(|| async { Ok::<_, ()>(Some(2u8)) }).await.unwrap();
        assert_eq!(cache.get(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_with_own_lifetime() {
        let cache = TtlCache::new(Duration::from_secs(3600));
        let token = cache
            .get_or_refresh_for(|| async { Ok::<_, ()>(("tok".to_string(), Duration::from_secs(5))) })
            .await
            .unwrap();
        assert_eq!(token, "tok");

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get().is_none());
    }
}
