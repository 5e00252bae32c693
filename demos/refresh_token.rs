//! Shows the one-shot refresh cycle against an in-memory backend that only
//! accepts the most recently issued token.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use callx::prelude::{
    CachedCredential, Client, Error, RawResponse, RequestDescriptor, TokenSource, Transport,
    WireRequest,
};
use callx::{BoxError, ProgressFn, async_trait};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

struct TokenEndpoint {
    issued: Arc<AtomicUsize>,
}

#[async_trait]
impl TokenSource for TokenEndpoint {
    async fn fetch_token(&self) -> Result<String, BoxError> {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{serial}"))
    }
}

struct InMemoryBackend {
    issued: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for InMemoryBackend {
    async fn execute(
        &self,
        request: &WireRequest,
        _progress: Option<&ProgressFn>,
    ) -> Result<RawResponse, Error> {
        let expected = format!("Bearer token-{}", self.issued.load(Ordering::SeqCst));
        let presented = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok());

        let (status, body) = if presented == Some(expected.as_str()) {
            (StatusCode::OK, r#"{"id":7,"plan":"pro"}"#)
        } else {
            (StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#)
        };
        Ok(RawResponse::new(
            status,
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct Account {
    id: u64,
    plan: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callx=debug")),
        )
        .init();

    let issued = Arc::new(AtomicUsize::new(0));
    let credential = CachedCredential::with_initial_token(
        TokenEndpoint {
            issued: Arc::clone(&issued),
        },
        "token-0-stale",
    );

    let client = Client::builder("https://accounts.example.com")
        .client_name("refresh-demo")
        .credential_provider(credential)
        .transport(InMemoryBackend { issued })
        .try_build()?;

    let descriptor = RequestDescriptor::get("/accounts/:id")
        .path_param("id", 7)
        .bearer_auth()
        .build();
    let account: Account = client.fetch(&descriptor).await?;
    println!("account {} is on plan {}", account.id, account.plan);
    Ok(())
}
