//! OAuth2 token cache.
//!
//! Tokens are cached per `(grant type, scope)` key and handed out until they
//! come within the refresh buffer of expiry. A miss triggers a fetch through
//! the configured [`TokenFetcher`]; concurrent misses for one key are
//! deduplicated so exactly one fetch is in flight per key (singleflight),
//! with every waiter receiving a clone of the leader's outcome.
//!
//! Password-grant responses that carry a refresh token keep it on the cached
//! record; when such a record expires, the refresh grant is tried first and
//! the primary grant is the fallback.
//!
//! Fetch failures retry under the supplied policy, but only for the
//! network, server and timeout categories; an auth failure from the token
//! endpoint is surfaced immediately.

mod types;

pub use types::{TokenKey, TokenRecord, TokenRequest, TokenResponse};

use crossbar_core::{ErrorCategory, ErrorContext, Retryable, ServiceError};
use crossbar_retry::{RetryDecision, RetryPolicy};
use futures::future::BoxFuture;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Performs the actual token-endpoint call. Implemented over the same
/// transport layer the rest of the client uses; the cache never sees wire
/// details.
pub trait TokenFetcher: Send + Sync {
    fn fetch(&self, request: TokenRequest) -> BoxFuture<'static, Result<TokenResponse, ServiceError>>;
}

impl<F> TokenFetcher for F
where
    F: Fn(TokenRequest) -> BoxFuture<'static, Result<TokenResponse, ServiceError>> + Send + Sync,
{
    fn fetch(&self, request: TokenRequest) -> BoxFuture<'static, Result<TokenResponse, ServiceError>> {
        (self)(request)
    }
}

type FetchResult = Result<TokenRecord, ServiceError>;

/// The cache. Shared process-wide via `Arc`.
pub struct OAuthTokenCache {
    fetcher: Arc<dyn TokenFetcher>,
    refresh_buffer: Duration,
    retry: RetryPolicy,
    username: Option<String>,
    password: Option<String>,
    entries: Mutex<HashMap<TokenKey, TokenRecord>>,
    in_flight: Mutex<HashMap<TokenKey, broadcast::Sender<FetchResult>>>,
}

impl OAuthTokenCache {
    pub fn builder(fetcher: Arc<dyn TokenFetcher>) -> OAuthTokenCacheBuilder {
        OAuthTokenCacheBuilder::new(fetcher)
    }

    /// Client-credentials token for `scope`, from cache when still valid.
    pub async fn client_credentials_token(&self, scope: &str) -> FetchResult {
        self.get(TokenKey::client_credentials(scope)).await
    }

    /// Password-grant token for `scope`, from cache when still valid.
    /// Requires credentials on the builder.
    pub async fn password_token(&self, scope: &str) -> FetchResult {
        self.get(TokenKey::password(scope)).await
    }

    /// Drops the cached token for a key. Callers invoke this after a 401 so
    /// the next `get` refetches; the refetch happens once, not in a loop.
    pub fn invalidate(&self, key: &TokenKey) {
        self.entries.lock().remove(key);
    }

    /// Cached record for a key, valid or not. Observability only.
    pub fn peek(&self, key: &TokenKey) -> Option<TokenRecord> {
        self.entries.lock().get(key).cloned()
    }

    async fn get(&self, key: TokenKey) -> FetchResult {
        // Fast path: cached and not inside the refresh buffer.
        let refresh_token = {
            let entries = self.entries.lock();
            match entries.get(&key) {
                Some(record) if record.is_valid_for(self.refresh_buffer) => {
                    return Ok(record.clone());
                }
                Some(record) => record.refresh_token.clone(),
                None => None,
            }
        };

        // Singleflight: join an in-flight fetch or become its leader.
        let receiver = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(sender) => Some(sender.subscribe()),
                None => {
                    let (sender, _rx) = broadcast::channel(1);
                    in_flight.insert(key.clone(), sender);
                    None
                }
            }
        };

        if let Some(mut receiver) = receiver {
            metrics::counter!("oauth_fetches_coalesced_total").increment(1);
            return match receiver.recv().await {
                Ok(result) => result,
                Err(_) => Err(self.leader_gone_error(&key)),
            };
        }

        // If this future is dropped mid-fetch, the guard removes the flight
        // entry so waiters see a closed channel instead of hanging.
        let guard = FlightGuard { cache: self, key: &key };
        let result = self.fetch_and_store(&key, refresh_token).await;

        // Resolve the flight whatever happened; waiters get a clone.
        std::mem::forget(guard);
        if let Some(sender) = self.in_flight.lock().remove(&key) {
            let _ = sender.send(result.clone());
        }
        result
    }

    async fn fetch_and_store(&self, key: &TokenKey, refresh_token: Option<String>) -> FetchResult {
        // Expired password-grant record with a refresh token: try the
        // refresh grant first, fall back to the primary grant.
        if let Some(refresh_token) = refresh_token {
            let request = TokenRequest::Refresh {
                refresh_token,
                scope: key.scope.clone(),
            };
            match self.fetch_with_retry(request).await {
                Ok(response) => return Ok(self.store(key, response)),
                Err(error) => {
                    tracing::debug!(
                        scope = %key.scope,
                        "refresh grant failed, falling back to primary grant: {error}"
                    );
                }
            }
        }

        let request = self.primary_request(key)?;
        let response = self.fetch_with_retry(request).await?;
        Ok(self.store(key, response))
    }

    fn primary_request(&self, key: &TokenKey) -> Result<TokenRequest, ServiceError> {
        match key.grant {
            "password" => match (self.username.clone(), self.password.clone()) {
                (Some(username), Some(password)) => Ok(TokenRequest::Password {
                    username,
                    password,
                    scope: key.scope.clone(),
                }),
                _ => Err(ServiceError::Configuration {
                    context: Box::new(self.context(key)),
                    message: "password grant requires credentials".into(),
                }),
            },
            _ => Ok(TokenRequest::ClientCredentials {
                scope: key.scope.clone(),
            }),
        }
    }

    async fn fetch_with_retry(&self, request: TokenRequest) -> Result<TokenResponse, ServiceError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetcher.fetch(request.clone()).await {
                Ok(response) => {
                    metrics::counter!("oauth_fetches_total", "grant" => request.grant_type())
                        .increment(1);
                    return Ok(response);
                }
                Err(error) => {
                    let transient = matches!(
                        error.category(),
                        ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Timeout
                    );
                    if !transient || !error.is_retryable() {
                        return Err(error);
                    }
                    match self.retry.decide(&error, attempt, None) {
                        RetryDecision::Retry { delay } => {
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        RetryDecision::Abort => return Err(error),
                    }
                }
            }
        }
    }

    fn store(&self, key: &TokenKey, response: TokenResponse) -> TokenRecord {
        let now = Instant::now();
        let record = TokenRecord {
            access_token: response.access_token,
            expires_at: now + Duration::from_secs(response.expires_in),
            refresh_token: response.refresh_token,
            scope: response.scope.unwrap_or_else(|| key.scope.clone()),
            cached_at: now,
        };
        self.entries.lock().insert(key.clone(), record.clone());
        tracing::debug!(grant = key.grant, scope = %key.scope, "token cached");
        record
    }

    fn context(&self, key: &TokenKey) -> ErrorContext {
        ErrorContext::builder("oauth", key.grant)
            .method("POST")
            .build()
    }

    fn leader_gone_error(&self, key: &TokenKey) -> ServiceError {
        ServiceError::Connection {
            context: Box::new(self.context(key)),
            message: "token fetch cancelled before completing".into(),
        }
    }
}

struct FlightGuard<'a> {
    cache: &'a OAuthTokenCache,
    key: &'a TokenKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // Dropping the sender closes the broadcast channel.
        let _ = self.cache.in_flight.lock().remove(self.key);
    }
}

/// Builder for [`OAuthTokenCache`].
pub struct OAuthTokenCacheBuilder {
    fetcher: Arc<dyn TokenFetcher>,
    refresh_buffer: Duration,
    retry: Option<RetryPolicy>,
    username: Option<String>,
    password: Option<String>,
}

impl OAuthTokenCacheBuilder {
    fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            fetcher,
            refresh_buffer: Duration::from_secs(60),
            retry: None,
            username: None,
            password: None,
        }
    }

    /// How long before expiry a token is refreshed rather than reused.
    ///
    /// Default: 60 seconds
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Retry policy for token fetches.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Resource-owner credentials for the password grant.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn build(self) -> Arc<OAuthTokenCache> {
        Arc::new(OAuthTokenCache {
            fetcher: self.fetcher,
            refresh_buffer: self.refresh_buffer,
            retry: self.retry.unwrap_or_else(|| {
                RetryPolicy::builder()
                    .max_attempts(3)
                    .base_backoff(Duration::from_millis(200))
                    .name("oauth")
                    .build()
            }),
            username: self.username,
            password: self.password,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenFetcher for CountingFetcher {
        fn fetch(
            &self,
            request: TokenRequest,
        ) -> BoxFuture<'static, Result<TokenResponse, ServiceError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            Box::pin(async move {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                Ok(TokenResponse {
                    access_token: format!("token-{}-{}", request.scope(), n),
                    expires_in: 3600,
                    refresh_token: match request.grant_type() {
                        "password" => Some("refresh-1".into()),
                        _ => None,
                    },
                    scope: Some(request.scope().to_string()),
                    token_type: Some("Bearer".into()),
                })
            })
        }
    }

    #[tokio::test]
    async fn second_call_hits_the_cache() {
        let fetcher = CountingFetcher::new();
        let cache = OAuthTokenCache::builder(fetcher.clone()).build();

        let first = cache.client_credentials_token("read").await.unwrap();
        let second = cache.client_credentials_token("read").await.unwrap();
        assert_eq!(first.access_token, second.access_token);
        assert_eq!(fetcher.calls(), 1);

        cache.client_credentials_token("write").await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_fetch_once() {
        let fetcher = CountingFetcher::slow(Duration::from_millis(50));
        let cache = OAuthTokenCache::builder(fetcher.clone()).build();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.client_credentials_token("read").await
            }));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap().access_token);
        }
        assert_eq!(fetcher.calls(), 1);
        assert!(tokens.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let fetcher = CountingFetcher::new();
        let cache = OAuthTokenCache::builder(fetcher.clone()).build();

        cache.client_credentials_token("read").await.unwrap();
        cache.invalidate(&TokenKey::client_credentials("read"));
        cache.client_credentials_token("read").await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn expired_password_token_uses_refresh_grant() {
        struct RefreshAware {
            grants: Mutex<Vec<&'static str>>,
        }
        impl TokenFetcher for RefreshAware {
            fn fetch(
                &self,
                request: TokenRequest,
            ) -> BoxFuture<'static, Result<TokenResponse, ServiceError>> {
                self.grants.lock().push(request.grant_type());
                let scope = request.scope().to_string();
                Box::pin(async move {
                    Ok(TokenResponse {
                        access_token: "t".into(),
                        // Expires immediately: always inside the buffer.
                        expires_in: 0,
                        refresh_token: Some("r".into()),
                        scope: Some(scope),
                        token_type: None,
                    })
                })
            }
        }

        let fetcher = Arc::new(RefreshAware {
            grants: Mutex::new(Vec::new()),
        });
        let cache = OAuthTokenCache::builder(fetcher.clone())
            .credentials("user", "hunter2")
            .build();

        cache.password_token("read").await.unwrap();
        cache.password_token("read").await.unwrap();
        let grants = fetcher.grants.lock().clone();
        assert_eq!(grants[0], "password");
        assert_eq!(grants[1], "refresh_token");
    }

    #[tokio::test]
    async fn auth_errors_from_the_endpoint_do_not_retry() {
        struct Failing {
            calls: AtomicUsize,
        }
        impl TokenFetcher for Failing {
            fn fetch(
                &self,
                _request: TokenRequest,
            ) -> BoxFuture<'static, Result<TokenResponse, ServiceError>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {
                    Err(ServiceError::Authentication {
                        context: Box::new(ErrorContext::builder("oauth", "token").build()),
                        message: "invalid_client".into(),
                    })
                })
            }
        }

        let fetcher = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let cache = OAuthTokenCache::builder(fetcher.clone()).build();
        let error = cache.client_credentials_token("read").await.unwrap_err();
        assert!(matches!(error, ServiceError::Authentication { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_then_succeed() {
        struct FlakyFetcher {
            calls: AtomicUsize,
        }
        impl TokenFetcher for FlakyFetcher {
            fn fetch(
                &self,
                request: TokenRequest,
            ) -> BoxFuture<'static, Result<TokenResponse, ServiceError>> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                let scope = request.scope().to_string();
                Box::pin(async move {
                    if n == 0 {
                        Err(ServiceError::Connection {
                            context: Box::new(ErrorContext::builder("oauth", "token").build()),
                            message: "reset".into(),
                        })
                    } else {
                        Ok(TokenResponse {
                            access_token: "t".into(),
                            expires_in: 3600,
                            refresh_token: None,
                            scope: Some(scope),
                            token_type: None,
                        })
                    }
                })
            }
        }

        let fetcher = Arc::new(FlakyFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = OAuthTokenCache::builder(fetcher.clone())
            .retry(
                RetryPolicy::builder()
                    .max_attempts(3)
                    .base_backoff(Duration::from_millis(1))
                    .jitter(0.0)
                    .build(),
            )
            .build();
        let record = cache.client_credentials_token("read").await.unwrap();
        assert_eq!(record.access_token, "t");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
