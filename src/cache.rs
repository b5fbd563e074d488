//! Filtered, serialized key set cache with single-flight refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Bytes;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::*;

use crate::client::JwksClient;
use crate::jwk::{KeyFilter, UpstreamError};
use crate::{Error, Result};

/// Default refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// How a [`RefreshCache::lookup`] was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh entry.
    Hit,
    /// The entry was refreshed for this call, or by a concurrent call this one waited for.
    Refreshed,
    /// The refresh failed and the previous entry was served instead.
    Stale,
}

impl CacheStatus {
    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Refreshed => "refreshed",
            CacheStatus::Stale => "stale",
        }
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CachedKeySet {
    /// The filtered key set, encoded as JSON.
    pub bytes: Bytes,
    /// How the bytes were obtained.
    pub status: CacheStatus,
}

#[derive(Debug)]
struct CacheEntry {
    bytes: Bytes,
    fetched_at: Instant,
    generation: u64,
}

impl CacheEntry {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Holds the last good filtered key set of one upstream.
///
/// Readers that find a fresh entry only take the entry's read lock, which is
/// never held across I/O. Stale readers queue on `refresh`, so at most one
/// upstream fetch is in flight per cache. Every refresh attempt bumps
/// `attempts` and every successful one bumps the entry's generation. A queued
/// reader that sees either counter move takes over the outcome of the attempt
/// it waited on instead of fetching again.
///
/// A failed refresh never replaces a good entry.
#[derive(Debug)]
pub struct RefreshCache {
    client: JwksClient,
    filter: KeyFilter,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
    attempts: AtomicU64,
    /// Guards refreshing; holds the error of the last attempt if it failed.
    refresh: Mutex<Option<Arc<UpstreamError>>>,
}

impl RefreshCache {
    /// Creates an empty cache. Nothing is fetched until the first lookup.
    pub fn new(client: JwksClient, filter: KeyFilter, ttl: Duration) -> RefreshCache {
        RefreshCache {
            client,
            filter,
            ttl,
            entry: RwLock::new(None),
            attempts: AtomicU64::new(0),
            refresh: Mutex::new(None),
        }
    }

    /// The filter applied on every refresh.
    pub fn filter(&self) -> KeyFilter {
        self.filter
    }

    /// The refresh interval.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the current key set bytes, refreshing them if stale.
    pub async fn get(&self) -> Result<Bytes> {
        self.lookup().await.map(|cached| cached.bytes)
    }

    /// Like [`get`](Self::get), also reporting how the bytes were obtained.
    pub async fn lookup(&self) -> Result<CachedKeySet> {
        let observed_attempt = self.attempts.load(Ordering::Acquire);
        let observed_generation = {
            let entry = self.entry.read().await;
            match entry.as_ref() {
                Some(entry) if !entry.is_stale(self.ttl) => {
                    return Ok(CachedKeySet {
                        bytes: entry.bytes.clone(),
                        status: CacheStatus::Hit,
                    });
                }
                Some(entry) => entry.generation,
                None => 0,
            }
        };

        let mut last_failure = self.refresh.lock().await;

        {
            let entry = self.entry.read().await;
            if let Some(entry) = entry.as_ref() {
                if entry.generation != observed_generation || !entry.is_stale(self.ttl) {
                    trace!(filter = self.filter.name(), "refreshed by a concurrent caller");
                    return Ok(CachedKeySet {
                        bytes: entry.bytes.clone(),
                        status: CacheStatus::Refreshed,
                    });
                }
            }
        }

        if self.attempts.load(Ordering::Acquire) != observed_attempt {
            if let Some(err) = last_failure.clone() {
                trace!(filter = self.filter.name(), "concurrent refresh failed, reusing its outcome");
                return self.failed(err).await;
            }
        }

        self.refresh_locked(&mut last_failure).await
    }

    /// Refreshes unconditionally, with the same failure policy as [`get`](Self::get).
    pub async fn refresh(&self) -> Result<CachedKeySet> {
        let mut last_failure = self.refresh.lock().await;
        self.refresh_locked(&mut last_failure).await
    }

    /// `last_failure` is the guard of `self.refresh`.
    async fn refresh_locked(
        &self,
        last_failure: &mut Option<Arc<UpstreamError>>,
    ) -> Result<CachedKeySet> {
        let started = Instant::now();
        let fetched = self.fetch_encoded().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match fetched {
            Ok(bytes) => {
                *last_failure = None;

                let mut entry = self.entry.write().await;
                let generation = entry.as_ref().map_or(1, |e| e.generation + 1);
                *entry = Some(CacheEntry {
                    bytes: bytes.clone(),
                    fetched_at: Instant::now(),
                    generation,
                });

                debug!(
                    filter = self.filter.name(),
                    generation,
                    size = bytes.len(),
                    duration = ?started.elapsed(),
                    "refreshed key set",
                );
                Ok(CachedKeySet {
                    bytes,
                    status: CacheStatus::Refreshed,
                })
            }
            Err(err) => {
                if let UpstreamError::Status { status, body } = &err {
                    debug!(%status, body = %body, "upstream error body");
                }
                warn!(
                    url = %self.client.url(),
                    filter = self.filter.name(),
                    error = %err,
                    duration = ?started.elapsed(),
                    "failed to refresh key set",
                );

                let err = Arc::new(err);
                *last_failure = Some(Arc::clone(&err));
                self.failed(err).await
            }
        }
    }

    /// Serves the stale entry after a failed attempt, or reports that nothing is cached.
    async fn failed(&self, err: Arc<UpstreamError>) -> Result<CachedKeySet> {
        let entry = self.entry.read().await;
        match entry.as_ref() {
            Some(entry) => {
                debug!(
                    filter = self.filter.name(),
                    age = ?entry.fetched_at.elapsed(),
                    "serving stale copy",
                );
                Ok(CachedKeySet {
                    bytes: entry.bytes.clone(),
                    status: CacheStatus::Stale,
                })
            }
            None => Err(Error::NoCachedData {
                url: self.client.url().to_string(),
                source: err,
            }),
        }
    }

    async fn fetch_encoded(&self) -> std::result::Result<Bytes, UpstreamError> {
        let set = self.filter.apply(self.client.fetch().await?);
        let encoded = serde_json::to_vec(&set).map_err(UpstreamError::Encode)?;
        Ok(Bytes::from(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_rt::test;
    use futures::future::join_all;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::{json, Value};
    use url::Url;

    use crate::client::DEFAULT_FETCH_TIMEOUT;

    fn upstream_body() -> Value {
        json!({
            "keys": [
                { "kty": "RSA", "kid": "1" },
                { "kty": "RSA", "kid": "2", "alg": "RS256" }
            ]
        })
    }

    fn cache_for(server: &MockServer, filter: KeyFilter, ttl: Duration) -> RefreshCache {
        let url = Url::parse(&server.url("/jwks")).unwrap();
        let client = JwksClient::new(url, DEFAULT_FETCH_TIMEOUT).unwrap();
        RefreshCache::new(client, filter, ttl)
    }

    fn kids(bytes: &[u8]) -> Vec<String> {
        let set: Value = serde_json::from_slice(bytes).unwrap();
        set["keys"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k["kid"].as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    async fn repeated_gets_within_ttl_are_identical() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(upstream_body());
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::from_secs(60));

        let first = cache.lookup().await.unwrap();
        let second = cache.lookup().await.unwrap();
        let third = cache.get().await.unwrap();

        assert_eq!(first.status, CacheStatus::Refreshed);
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(second.bytes, third);
        mock.assert_hits(1);
    }

    #[test]
    async fn filter_is_applied_before_caching() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(upstream_body());
        });

        let with_alg = cache_for(&server, KeyFilter::WithAlgorithm, Duration::from_secs(60));
        let raw = cache_for(&server, KeyFilter::None, Duration::from_secs(60));

        assert_eq!(kids(&with_alg.get().await.unwrap()), ["2"]);
        assert_eq!(kids(&raw.get().await.unwrap()), ["1", "2"]);
    }

    #[test]
    async fn concurrent_cold_gets_fetch_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200)
                .delay(Duration::from_millis(100))
                .json_body(upstream_body());
        });

        let cache = cache_for(&server, KeyFilter::WithAlgorithm, Duration::from_secs(60));

        let results = join_all((0..16).map(|_| cache.get())).await;

        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), first);
        }
        mock.assert_hits(1);
    }

    #[test]
    async fn concurrent_stale_gets_fetch_once_even_with_zero_ttl() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200)
                .delay(Duration::from_millis(100))
                .json_body(upstream_body());
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::ZERO);

        let results = join_all((0..8).map(|_| cache.lookup())).await;

        let refreshed = results
            .iter()
            .filter(|r| r.as_ref().unwrap().status == CacheStatus::Refreshed)
            .count();
        assert_eq!(refreshed, 8);
        mock.assert_hits(1);
    }

    #[test]
    async fn serves_stale_bytes_when_refresh_fails() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(upstream_body());
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::ZERO);
        let good = cache.get().await.unwrap();

        ok.delete();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(500).body("boom");
        });

        let served = cache.lookup().await.unwrap();
        assert_eq!(served.status, CacheStatus::Stale);
        assert_eq!(served.bytes, good);
        failing.assert_hits(1);
    }

    #[test]
    async fn stale_entry_survives_decode_failure() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(upstream_body());
        });

        let cache = cache_for(&server, KeyFilter::WithAlgorithm, Duration::ZERO);
        let good = cache.get().await.unwrap();

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).body("{ truncated");
        });

        assert_eq!(cache.get().await.unwrap(), good);
        assert_eq!(cache.get().await.unwrap(), good);
    }

    #[test]
    async fn cold_start_failure_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(502);
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::from_secs(60));

        let err = cache.get().await.unwrap_err();
        match err {
            Error::NoCachedData { url, source } => {
                assert_eq!(url, server.url("/jwks"));
                assert!(matches!(*source, UpstreamError::Status { .. }));
            }
            other => panic!("expected NoCachedData, got {other:?}"),
        }
    }

    #[test]
    async fn recovers_after_cold_start_failure() {
        let server = MockServer::start();
        let mut failing = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(503);
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::from_secs(60));
        assert!(cache.get().await.is_err());

        failing.delete();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(upstream_body());
        });

        assert_eq!(kids(&cache.get().await.unwrap()), ["1", "2"]);
    }

    #[test]
    async fn forced_refresh_replaces_fresh_entry() {
        let server = MockServer::start();
        let mut first = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(json!({ "keys": [{ "kid": "old", "alg": "RS256" }] }));
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::from_secs(60));
        assert_eq!(kids(&cache.get().await.unwrap()), ["old"]);

        first.delete();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(json!({ "keys": [{ "kid": "new", "alg": "RS256" }] }));
        });

        let refreshed = cache.refresh().await.unwrap();
        assert_eq!(refreshed.status, CacheStatus::Refreshed);
        assert_eq!(kids(&refreshed.bytes), ["new"]);
        assert_eq!(cache.lookup().await.unwrap().status, CacheStatus::Hit);
    }

    fn failing_upstream(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(503)
                .delay(Duration::from_millis(100))
                .body("down");
        })
    }

    #[test]
    async fn concurrent_gets_share_one_failed_refresh_when_warm() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(upstream_body());
        });

        let cache = cache_for(&server, KeyFilter::None, Duration::ZERO);
        let good = cache.get().await.unwrap();

        ok.delete();
        let failing = failing_upstream(&server);

        let results = join_all((0..8).map(|_| cache.lookup())).await;

        for result in results {
            let served = result.unwrap();
            assert_eq!(served.status, CacheStatus::Stale);
            assert_eq!(served.bytes, good);
        }
        failing.assert_hits(1);
    }

    #[test]
    async fn concurrent_gets_share_one_failed_refresh_when_cold() {
        let server = MockServer::start();
        let failing = failing_upstream(&server);

        let cache = cache_for(&server, KeyFilter::None, Duration::from_secs(60));

        let results = join_all((0..8).map(|_| cache.get())).await;

        for result in results {
            assert!(
                matches!(result, Err(Error::NoCachedData { .. })),
                "got {result:?}"
            );
        }
        failing.assert_hits(1);

        // The next request after the failed attempt retries.
        assert!(cache.get().await.is_err());
        failing.assert_hits(2);
    }
}
