use crate::chain::{InterceptFuture, Interceptor, Next};
use crossbar_core::{HeaderMap, Request, Response};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Store = Arc<Mutex<LruCache<u64, CachedEntry>>>;

/// A cached response plus the validators the server handed out with it.
#[derive(Clone)]
struct CachedEntry {
    status: i32,
    body: Vec<u8>,
    headers: HeaderMap,
    stored_at: Instant,
    ttl: Duration,
    etag: Option<String>,
    last_modified: Option<String>,
}

impl CachedEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }

    fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    fn to_response(&self) -> Response {
        Response::new(
            self.status,
            self.body.clone(),
            self.headers.clone(),
            Duration::ZERO,
        )
        .with_attribute("cache.hit", true)
    }
}

/// Read-through response cache keyed by request fingerprint.
///
/// Only idempotent reads are cached (`GET`, or any request tagged with the
/// `cache.enabled` attribute). Server `Cache-Control` directives are honored:
/// `no-store` skips storage, `max-age` overrides the default TTL. A stale
/// entry with validators turns the next call into a conditional request; a
/// 304 answer counts as a hit and refreshes the entry.
pub struct CacheInterceptor {
    store: Store,
    default_ttl: Duration,
    priority: i32,
}

impl CacheInterceptor {
    pub fn builder() -> CacheInterceptorBuilder {
        CacheInterceptorBuilder::new()
    }

    /// Canonical hash of the request identity. Correlation and request ids
    /// are deliberately excluded so retries and parallel callers share
    /// entries.
    fn fingerprint(request: &Request) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.service().hash(&mut hasher);
        request.protocol().hash(&mut hasher);
        request.method().hash(&mut hasher);
        request.endpoint().hash(&mut hasher);
        for (name, value) in request.query() {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        for (name, value) in request.path_params() {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        if let Some(body) = request.body() {
            body.bytes().hash(&mut hasher);
        }
        hasher.finish()
    }

    fn is_cacheable(request: &Request) -> bool {
        request.method().eq_ignore_ascii_case("GET")
            || request
                .attribute("cache.enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }

    fn ttl_from(headers: &HeaderMap) -> Option<Duration> {
        let value = headers.get("cache-control")?;
        for directive in value.split(',') {
            let directive = directive.trim();
            if directive.eq_ignore_ascii_case("no-store")
                || directive.eq_ignore_ascii_case("no-cache")
            {
                return Some(Duration::ZERO);
            }
            if let Some(age) = directive
                .strip_prefix("max-age=")
                .or_else(|| directive.strip_prefix("Max-Age="))
            {
                if let Ok(secs) = age.trim().parse::<u64>() {
                    return Some(Duration::from_secs(secs));
                }
            }
        }
        None
    }

    fn store_response(store: &Store, key: u64, response: &Response, default_ttl: Duration) {
        let ttl = match Self::ttl_from(response.headers()) {
            Some(Duration::ZERO) => return, // no-store
            Some(explicit) => explicit,
            None => default_ttl,
        };
        let entry = CachedEntry {
            status: response.status(),
            body: response.body().to_vec(),
            headers: response.headers().clone(),
            stored_at: Instant::now(),
            ttl,
            etag: response.headers().get("etag").map(str::to_string),
            last_modified: response.headers().get("last-modified").map(str::to_string),
        };
        store.lock().put(key, entry);
    }

    /// Entries currently cached; for tests and dashboards.
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }
}

impl Interceptor for CacheInterceptor {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        "cache"
    }

    fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
        if !Self::is_cacheable(&request) {
            return next.run(request);
        }

        let key = Self::fingerprint(&request);
        let service = request.service().to_string();

        let stale = {
            let mut store = self.store.lock();
            match store.get(&key) {
                Some(entry) if entry.is_fresh() => {
                    metrics::counter!("cache_hits_total", "service" => service).increment(1);
                    let response = entry.to_response();
                    return Box::pin(async move { Ok(response) });
                }
                Some(entry) if entry.has_validators() => Some(entry.clone()),
                _ => None,
            }
        };

        metrics::counter!("cache_misses_total", "service" => service).increment(1);

        // Stale entry with validators: make the request conditional.
        let request = match &stale {
            Some(entry) => {
                let mut conditional = request;
                if let Some(etag) = &entry.etag {
                    conditional = conditional.with_header_replaced("If-None-Match", etag.clone());
                }
                if let Some(last_modified) = &entry.last_modified {
                    conditional = conditional
                        .with_header_replaced("If-Modified-Since", last_modified.clone());
                }
                conditional
            }
            None => request,
        };

        let store = Arc::clone(&self.store);
        let default_ttl = self.default_ttl;

        Box::pin(async move {
            let result = next.run(request).await;
            match result {
                Ok(response) if response.status() == 304 => {
                    // Revalidation hit: refresh and serve the cached body.
                    match stale {
                        Some(mut entry) => {
                            entry.stored_at = Instant::now();
                            let revived = entry.to_response();
                            store.lock().put(key, entry);
                            Ok(revived)
                        }
                        None => Ok(response),
                    }
                }
                Ok(response) => {
                    if response.is_success() {
                        Self::store_response(&store, key, &response, default_ttl);
                    }
                    Ok(response)
                }
                err => err,
            }
        })
    }
}

/// Builder for [`CacheInterceptor`].
pub struct CacheInterceptorBuilder {
    max_entries: usize,
    default_ttl: Duration,
    priority: i32,
}

impl CacheInterceptorBuilder {
    pub fn new() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(60),
            priority: -10,
        }
    }

    /// Bound on cached entries; least recently used are evicted.
    ///
    /// Default: 1000
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n.max(1);
        self
    }

    /// TTL applied when the server sends no `max-age`.
    ///
    /// Default: 60 seconds
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> CacheInterceptor {
        CacheInterceptor {
            store: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN),
            ))),
            default_ttl: self.default_ttl,
            priority: self.priority,
        }
    }
}

impl Default for CacheInterceptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
