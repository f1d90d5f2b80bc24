use serde::Deserialize;
use std::time::Instant;

/// Cache key: one token per grant type and scope string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub grant: &'static str,
    pub scope: String,
}

impl TokenKey {
    pub fn client_credentials(scope: impl Into<String>) -> Self {
        Self {
            grant: "client_credentials",
            scope: scope.into(),
        }
    }

    pub fn password(scope: impl Into<String>) -> Self {
        Self {
            grant: "password",
            scope: scope.into(),
        }
    }
}

/// What the fetcher is asked to obtain.
#[derive(Debug, Clone)]
pub enum TokenRequest {
    ClientCredentials {
        scope: String,
    },
    Password {
        username: String,
        password: String,
        scope: String,
    },
    /// Exchange a refresh token issued by an earlier password grant.
    Refresh {
        refresh_token: String,
        scope: String,
    },
}

impl TokenRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenRequest::ClientCredentials { .. } => "client_credentials",
            TokenRequest::Password { .. } => "password",
            TokenRequest::Refresh { .. } => "refresh_token",
        }
    }

    pub fn scope(&self) -> &str {
        match self {
            TokenRequest::ClientCredentials { scope }
            | TokenRequest::Password { scope, .. }
            | TokenRequest::Refresh { scope, .. } => scope,
        }
    }
}

/// Token endpoint response body, as the wire carries it.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds from now.
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// A cached token.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub access_token: String,
    pub expires_at: Instant,
    pub refresh_token: Option<String>,
    pub scope: String,
    pub cached_at: Instant,
}

impl TokenRecord {
    /// True while the token stays valid past `buffer` from now.
    pub fn is_valid_for(&self, buffer: std::time::Duration) -> bool {
        Instant::now() + buffer < self.expires_at
    }
}
