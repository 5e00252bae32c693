//! Credential providers used for the `authorization` header and for the
//! one-shot refresh path.
//!
//! The provider is shared by every call issued through a client, so it owns
//! its synchronization. [`CachedCredential`] coalesces concurrent refreshes:
//! callers that observed the same stale token wait for one fetch instead of
//! each hitting the token endpoint.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::BoxError;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Token to place in the authorization header, if one is held.
    fn current_token(&self) -> Option<String>;

    /// Obtains a fresh token. Called at most once per logical request.
    async fn refresh(&self) -> Result<(), BoxError>;
}

/// Fixed token that cannot be refreshed.
#[derive(Clone, Debug)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    fn current_token(&self) -> Option<String> {
        Some(self.token.clone())
    }

    async fn refresh(&self) -> Result<(), BoxError> {
        Err("static credential cannot be refreshed".into())
    }
}

/// Source of new tokens for [`CachedCredential`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String, BoxError>;
}

pub struct CachedCredential<S> {
    source: S,
    token: RwLock<Option<String>>,
    generation: AtomicU64,
    refreshing: Mutex<()>,
}

impl<S> CachedCredential<S>
where
    S: TokenSource,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            token: RwLock::new(None),
            generation: AtomicU64::new(0),
            refreshing: Mutex::new(()),
        }
    }

    pub fn with_initial_token(source: S, token: impl Into<String>) -> Self {
        let credential = Self::new(source);
        credential.store(Some(token.into()));
        credential
    }

    /// Number of successful refreshes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn store(&self, token: Option<String>) {
        let mut guard = match self.token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }
}

#[async_trait]
impl<S> CredentialProvider for CachedCredential<S>
where
    S: TokenSource,
{
    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn refresh(&self) -> Result<(), BoxError> {
        let observed = self.generation();
        let _guard = self.refreshing.lock().await;
        if self.generation() != observed {
            // Another call refreshed while this one waited for the lock.
            return Ok(());
        }

        let token = self.source.fetch_token().await?;
        self.store(Some(token));
        self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(generation = self.generation(), "credential refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{CachedCredential, CredentialProvider, StaticCredential, TokenSource};
    use crate::error::BoxError;

    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<String, BoxError> {
            let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(format!("token-{count}"))
        }
    }

    #[tokio::test]
    async fn static_credential_refuses_refresh() {
        let credential = StaticCredential::new("abc");
        assert_eq!(credential.current_token().as_deref(), Some("abc"));
        assert!(credential.refresh().await.is_err());
    }

    #[tokio::test]
    async fn cached_credential_stores_fetched_token() {
        let credential = CachedCredential::with_initial_token(
            CountingSource {
                fetches: AtomicUsize::new(0),
            },
            "stale",
        );
        assert_eq!(credential.current_token().as_deref(), Some("stale"));
        credential.refresh().await.expect("refresh should succeed");
        assert_eq!(credential.current_token().as_deref(), Some("token-1"));
        assert_eq!(credential.generation(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cached_credential_coalesces_concurrent_refreshes() {
        let credential = Arc::new(CachedCredential::new(CountingSource {
            fetches: AtomicUsize::new(0),
        }));

        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let credential = Arc::clone(&credential);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                credential.refresh().await
            }));
        }
        for handle in handles {
            handle
                .await
                .expect("task should join")
                .expect("refresh should succeed");
        }

        assert_eq!(credential.source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(credential.current_token().as_deref(), Some("token-1"));
    }
}
