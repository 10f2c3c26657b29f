//! Access-token lookup for the remote platform.
//!
//! Login and token refresh happen elsewhere; this layer only answers "which
//! bearer token do I send on behalf of this user".

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use playsort_core::UserId;

/// Bearer token for the remote API. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no access token stored for user {0}")]
    Missing(UserId),

    #[error("credential store error: {0}")]
    Store(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn access_token(&self, user_id: &UserId) -> Result<AccessToken, CredentialError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn access_token(&self, user_id: &UserId) -> Result<AccessToken, CredentialError> {
        (**self).access_token(user_id).await
    }
}

/// In-memory token map for tests/dev.
///
/// The HTTP layer seeds it from the request's bearer token.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<HashMap<UserId, AccessToken>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, token: AccessToken) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(user_id, token);
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn access_token(&self, user_id: &UserId) -> Result<AccessToken, CredentialError> {
        let map = self
            .inner
            .read()
            .map_err(|_| CredentialError::Store("credential map poisoned".into()))?;
        map.get(user_id)
            .cloned()
            .ok_or_else(|| CredentialError::Missing(user_id.clone()))
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresCredentialStore;

#[cfg(feature = "postgres")]
mod postgres {
    use async_trait::async_trait;
    use sqlx::PgPool;
    use tracing::instrument;

    use playsort_core::UserId;

    use super::{AccessToken, CredentialError, CredentialStore};

    /// Reads the stored token from the `users` table.
    #[derive(Debug, Clone)]
    pub struct PostgresCredentialStore {
        pool: PgPool,
    }

    impl PostgresCredentialStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn connect(database_url: &str) -> Result<Self, CredentialError> {
            let pool = PgPool::connect(database_url)
                .await
                .map_err(|e| CredentialError::Store(e.to_string()))?;
            Ok(Self::new(pool))
        }
    }

    #[async_trait]
    impl CredentialStore for PostgresCredentialStore {
        #[instrument(skip(self), fields(user_id = %user_id), err)]
        async fn access_token(&self, user_id: &UserId) -> Result<AccessToken, CredentialError> {
            let token: Option<Option<String>> =
                sqlx::query_scalar("SELECT token FROM users WHERE id = $1")
                    .bind(user_id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| CredentialError::Store(e.to_string()))?;

            token
                .flatten()
                .filter(|t| !t.trim().is_empty())
                .map(AccessToken::new)
                .ok_or_else(|| CredentialError::Missing(user_id.clone()))
        }
    }
}
