use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use callx::prelude::{
    Client, CredentialProvider, Error, RawResponse, RequestDescriptor, Transport, WireRequest,
};
use callx::{BoxError, ProgressFn, RefreshUnavailableReason, async_trait};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;

struct ScriptedTransport {
    responses: Mutex<VecDeque<RawResponse>>,
    authorizations: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    fn new(responses: impl IntoIterator<Item = RawResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            authorizations: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.authorizations.lock().expect("lock calls").len()
    }

    fn authorizations(&self) -> Vec<Option<String>> {
        self.authorizations.lock().expect("lock calls").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &WireRequest,
        _progress: Option<&ProgressFn>,
    ) -> Result<RawResponse, Error> {
        let authorization = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        self.authorizations
            .lock()
            .expect("lock calls")
            .push(authorization);
        let next = self
            .responses
            .lock()
            .expect("lock responses")
            .pop_front();
        Ok(next.unwrap_or_else(|| panic!("transport called more often than scripted")))
    }
}

struct CountingCredential {
    token: Mutex<String>,
    refreshes: AtomicUsize,
    fail_refresh: bool,
}

impl CountingCredential {
    fn new(token: &str, fail_refresh: bool) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(token.to_owned()),
            refreshes: AtomicUsize::new(0),
            fail_refresh,
        })
    }

    fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingCredential {
    fn current_token(&self) -> Option<String> {
        Some(self.token.lock().expect("lock token").clone())
    }

    async fn refresh(&self) -> Result<(), BoxError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err("token endpoint unavailable".into());
        }
        *self.token.lock().expect("lock token") = "t1".to_owned();
        Ok(())
    }
}

fn respond(status: u16, body: &'static str) -> RawResponse {
    RawResponse::new(
        StatusCode::from_u16(status).expect("valid status"),
        HeaderMap::new(),
        Bytes::from_static(body.as_bytes()),
    )
}

#[derive(Debug, Deserialize, PartialEq)]
struct Account {
    id: u64,
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_resent_once() {
    let transport = ScriptedTransport::new([respond(401, ""), respond(200, r#"{"id":7}"#)]);
    let credential = CountingCredential::new("t0", false);
    let client = Client::builder("https://api.example.com")
        .credential_provider_arc(credential.clone())
        .transport_arc(transport.clone())
        .build();

    let descriptor = RequestDescriptor::get("/account").bearer_auth().build();
    let account: Account = client.fetch(&descriptor).await.expect("call should succeed");

    assert_eq!(account, Account { id: 7 });
    assert_eq!(credential.refreshes(), 1);
    assert_eq!(
        transport.authorizations(),
        [Some("Bearer t0".to_owned()), Some("Bearer t1".to_owned())]
    );
}

#[tokio::test]
async fn failing_refresh_surfaces_refresh_error_without_looping() {
    let transport = ScriptedTransport::new([respond(401, "expired")]);
    let credential = CountingCredential::new("t0", true);
    let client = Client::builder("https://api.example.com")
        .credential_provider_arc(credential.clone())
        .transport_arc(transport.clone())
        .build();

    let error = client
        .send(&RequestDescriptor::get("/account").bearer_auth().build())
        .await
        .expect_err("refresh failure should fail the call");

    assert!(matches!(error, Error::Refresh { .. }), "{error}");
    assert_eq!(credential.refreshes(), 1);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn forbidden_without_provider_is_refresh_unavailable() {
    let transport = ScriptedTransport::new([respond(403, "")]);
    let client = Client::builder("https://api.example.com")
        .transport_arc(transport.clone())
        .build();

    let error = client
        .send(&RequestDescriptor::get("/admin").build())
        .await
        .expect_err("403 without provider should fail");

    match error {
        Error::RefreshUnavailable { reason } => {
            assert_eq!(reason, RefreshUnavailableReason::NoProvider);
        }
        other => panic!("unexpected error variant: {other}"),
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn interceptor_can_turn_failure_into_success() {
    let transport = ScriptedTransport::new([respond(500, "boom")]);
    let client = Client::builder("https://api.example.com")
        .interceptor(
            |_: &WireRequest, mut response: RawResponse| -> Result<RawResponse, BoxError> {
                if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
                    response.set_status(StatusCode::OK);
                    response.set_body(Bytes::from_static(b"[]"));
                }
                Ok(response)
            },
        )
        .transport_arc(transport)
        .build();

    let items: Vec<u64> = client
        .fetch(&RequestDescriptor::get("/items").build())
        .await
        .expect("rewritten response should decode");
    assert!(items.is_empty());
}

#[tokio::test]
async fn interceptors_and_middleware_run_again_on_resend() {
    let middleware_runs = Arc::new(AtomicUsize::new(0));
    let interceptor_runs = Arc::new(AtomicUsize::new(0));
    let transport = ScriptedTransport::new([respond(401, ""), respond(201, "{}")]);

    let middleware_counter = Arc::clone(&middleware_runs);
    let interceptor_counter = Arc::clone(&interceptor_runs);
    let client = Client::builder("https://api.example.com")
        .credential_provider_arc(CountingCredential::new("t0", false))
        .middleware(move |_: &mut WireRequest| -> Result<(), BoxError> {
            middleware_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .interceptor(
            move |_: &WireRequest, response: RawResponse| -> Result<RawResponse, BoxError> {
                interceptor_counter.fetch_add(1, Ordering::SeqCst);
                Ok(response)
            },
        )
        .transport_arc(transport)
        .build();

    let response = client
        .send(&RequestDescriptor::post("/items").bearer_auth().build())
        .await
        .expect("resend should succeed");

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(middleware_runs.load(Ordering::SeqCst), 2);
    assert_eq!(interceptor_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unexpected_status_maps_to_status_error() {
    let transport = ScriptedTransport::new([respond(503, "maintenance")]);
    let client = Client::builder("https://api.example.com")
        .transport_arc(transport)
        .build();

    let error = client
        .send(&RequestDescriptor::get("/items").build())
        .await
        .expect_err("503 should fail");
    assert_eq!(error.status(), Some(503));
    assert_eq!(error.code().as_str(), "status");
}
