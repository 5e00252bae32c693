//! Transport seam and the performer that drives it.
//!
//! [`perform`] bounds one attempt with the wire request's timeout; the resend
//! after a credential refresh gets a fresh window. Transport failures are
//! surfaced unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, HeaderValue};
use http::{HeaderMap, Request, Response as HttpResponse};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
#[cfg(any(feature = "tls-rustls-ring", feature = "tls-native"))]
use hyper_util::client::legacy::Client as LegacyClient;
#[cfg(any(feature = "tls-rustls-ring", feature = "tls-native"))]
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

use crate::descriptor::CachePolicy;
use crate::error::Error;
use crate::response::RawResponse;
use crate::util::classify_transport_error;
use crate::wire::WireRequest;

/// Download progress for one attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    /// `content-length` was declared and non-zero.
    Determinate { received: u64, total: u64 },
    /// Total size unknown.
    Indeterminate { received: u64 },
}

impl Progress {
    pub fn new(received: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if total > 0 => Self::Determinate { received, total },
            _ => Self::Indeterminate { received },
        }
    }

    pub fn received(&self) -> u64 {
        match self {
            Self::Determinate { received, .. } | Self::Indeterminate { received } => *received,
        }
    }

    /// Fraction in `[0, 1]`, or `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Determinate { received, total } => {
                Some((*received as f64 / *total as f64).clamp(0.0, 1.0))
            }
            Self::Indeterminate { .. } => None,
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response. When `progress` is set,
    /// it is invoked once per received body chunk.
    async fn execute(
        &self,
        request: &WireRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<RawResponse, Error>;
}

pub(crate) async fn perform(
    transport: &dyn Transport,
    request: &WireRequest,
    progress: Option<&ProgressFn>,
) -> Result<RawResponse, Error> {
    let attempt_timeout = request.timeout();
    match timeout(attempt_timeout, transport.execute(request, progress)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            timeout_ms: attempt_timeout.as_millis(),
            method: request.method().clone(),
            uri: request.redacted_url(),
        }),
    }
}

#[cfg(feature = "tls-rustls-ring")]
type RustlsHyperClient = LegacyClient<
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    Full<Bytes>,
>;

#[cfg(feature = "tls-native")]
type NativeHyperClient = LegacyClient<
    hyper_tls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    Full<Bytes>,
>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsBackend {
    RustlsRing,
    NativeTls,
}

impl TlsBackend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RustlsRing => "tls-rustls-ring",
            Self::NativeTls => "tls-native",
        }
    }
}

const fn default_tls_backend() -> TlsBackend {
    if cfg!(feature = "tls-rustls-ring") {
        TlsBackend::RustlsRing
    } else {
        TlsBackend::NativeTls
    }
}

#[derive(Clone)]
enum HyperClient {
    #[cfg(feature = "tls-rustls-ring")]
    Rustls(RustlsHyperClient),
    #[cfg(feature = "tls-native")]
    Native(NativeHyperClient),
}

impl HyperClient {
    async fn request(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<HttpResponse<Incoming>, hyper_util::client::legacy::Error> {
        match self {
            #[cfg(feature = "tls-rustls-ring")]
            Self::Rustls(client) => client.request(request).await,
            #[cfg(feature = "tls-native")]
            Self::Native(client) => client.request(request).await,
        }
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn build_rustls_client() -> Result<HyperClient, Error> {
    let mut http = hyper_util::client::legacy::connect::HttpConnector::new();
    http.enforce_http(false);
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|source| Error::TlsBackendInit {
            backend: TlsBackend::RustlsRing.as_str(),
            message: source.to_string(),
        })?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http);
    Ok(HyperClient::Rustls(
        LegacyClient::builder(TokioExecutor::new()).build(https),
    ))
}

#[cfg(not(feature = "tls-rustls-ring"))]
fn build_rustls_client() -> Result<HyperClient, Error> {
    Err(Error::TlsBackendInit {
        backend: TlsBackend::RustlsRing.as_str(),
        message: "backend is not enabled in this build".to_owned(),
    })
}

#[cfg(feature = "tls-native")]
fn build_native_client() -> Result<HyperClient, Error> {
    let https = hyper_tls::HttpsConnector::new();
    Ok(HyperClient::Native(
        LegacyClient::builder(TokioExecutor::new()).build(https),
    ))
}

#[cfg(not(feature = "tls-native"))]
fn build_native_client() -> Result<HyperClient, Error> {
    Err(Error::TlsBackendInit {
        backend: TlsBackend::NativeTls.as_str(),
        message: "backend is not enabled in this build".to_owned(),
    })
}

/// Default transport: hyper's pooled client over rustls or native-tls.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    backend: TlsBackend,
}

impl HyperTransport {
    pub fn new() -> Result<Self, Error> {
        Self::with_backend(default_tls_backend())
    }

    pub fn with_backend(backend: TlsBackend) -> Result<Self, Error> {
        let client = match backend {
            TlsBackend::RustlsRing => build_rustls_client()?,
            TlsBackend::NativeTls => build_native_client()?,
        };
        Ok(Self { client, backend })
    }

    pub fn backend(&self) -> TlsBackend {
        self.backend
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("backend", &self.backend)
            .finish()
    }
}

fn build_http_request(request: &WireRequest) -> Result<Request<Full<Bytes>>, Error> {
    let mut builder = Request::builder()
        .method(request.method().clone())
        .uri(request.url().as_str());
    for (name, value) in request.headers() {
        builder = builder.header(name, value);
    }
    if request.cache_policy() == CachePolicy::ReloadIgnoringCache
        && !request.headers().contains_key(CACHE_CONTROL)
    {
        builder = builder.header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    builder
        .body(Full::new(request.body().clone()))
        .map_err(|source| Error::RequestBuild { source })
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

pub(crate) async fn read_body_with_progress(
    mut body: Incoming,
    total: Option<u64>,
    progress: Option<&ProgressFn>,
) -> Result<Bytes, Error> {
    let mut collected = Vec::new();
    let mut received = 0_u64;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| Error::ReadBody {
            source: Box::new(source),
        })?;
        if let Some(data) = frame.data_ref() {
            received = received.saturating_add(data.len() as u64);
            collected.extend_from_slice(data);
            if let Some(progress) = progress {
                progress(Progress::new(received, total));
            }
        }
    }

    Ok(Bytes::from(collected))
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(
        &self,
        request: &WireRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<RawResponse, Error> {
        let http_request = build_http_request(request)?;
        let response = self.client.request(http_request).await.map_err(|source| {
            Error::Transport {
                kind: classify_transport_error(&source),
                method: request.method().clone(),
                uri: request.redacted_url(),
                source: Box::new(source),
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let total = declared_length(&headers);
        let body = read_body_with_progress(response.into_body(), total, progress).await?;
        Ok(RawResponse::new(status, headers, body))
    }
}
