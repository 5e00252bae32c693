use std::sync::Arc;

use http::Method;
use thiserror::Error;

use crate::status::StatusKind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error value a descriptor attaches to a status with
/// [`FailureAction::ThrowError`](crate::FailureAction::ThrowError).
pub type CustomError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Why a credential refresh could not be attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshUnavailableReason {
    /// The client has no credential provider.
    NoProvider,
    /// The call already spent its single refresh-and-resend cycle.
    AlreadyRetried,
}

impl std::fmt::Display for RefreshUnavailableReason {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoProvider => "no credential provider configured",
            Self::AlreadyRetried => "request was already retried after a refresh",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidBaseAddress,
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    RequestBuild,
    Encode,
    Decode,
    Transport,
    Timeout,
    ReadBody,
    Status,
    Custom,
    Refresh,
    RefreshUnavailable,
    Middleware,
    Interceptor,
    TlsBackendInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidBaseAddress => "invalid_base_address",
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::RequestBuild => "request_build",
            Self::Encode => "encode",
            Self::Decode => "decode",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ReadBody => "read_body",
            Self::Status => "status",
            Self::Custom => "custom",
            Self::Refresh => "refresh",
            Self::RefreshUnavailable => "refresh_unavailable",
            Self::Middleware => "middleware",
            Self::Interceptor => "interceptor",
            Self::TlsBackendInit => "tls_backend_init",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid base address {address}: {message}")]
    InvalidBaseAddress { address: String, message: String },
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("failed to encode request body: {source}")]
    Encode {
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response body: {source}; body={body}")]
    Decode {
        #[source]
        source: BoxError,
        body: String,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error("http status error {status} ({kind}) for {method} {uri}: {body}")]
    Status {
        status: u16,
        kind: StatusKind,
        method: Method,
        uri: String,
        body: String,
    },
    #[error("request failed with status {status}: {error}")]
    Custom { status: u16, error: CustomError },
    #[error("credential refresh failed: {source}")]
    Refresh {
        #[source]
        source: BoxError,
    },
    #[error("credential refresh unavailable: {reason}")]
    RefreshUnavailable { reason: RefreshUnavailableReason },
    #[error("middleware rejected request: {source}")]
    Middleware {
        #[source]
        source: BoxError,
    },
    #[error("interceptor rejected response: {source}")]
    Interceptor {
        #[source]
        source: BoxError,
    },
    #[error("failed to initialize tls backend {backend}: {message}")]
    TlsBackendInit {
        backend: &'static str,
        message: String,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidBaseAddress { .. } => ErrorCode::InvalidBaseAddress,
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Encode { .. } => ErrorCode::Encode,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::Status { .. } => ErrorCode::Status,
            Self::Custom { .. } => ErrorCode::Custom,
            Self::Refresh { .. } => ErrorCode::Refresh,
            Self::RefreshUnavailable { .. } => ErrorCode::RefreshUnavailable,
            Self::Middleware { .. } => ErrorCode::Middleware,
            Self::Interceptor { .. } => ErrorCode::Interceptor,
            Self::TlsBackendInit { .. } => ErrorCode::TlsBackendInit,
        }
    }

    /// Returns `true` for failures raised while turning a descriptor into a
    /// wire request. These are never retried.
    pub const fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidBaseAddress { .. }
                | Self::InvalidUri { .. }
                | Self::InvalidHeaderName { .. }
                | Self::InvalidHeaderValue { .. }
                | Self::RequestBuild { .. }
                | Self::Encode { .. }
        )
    }

    /// HTTP status carried by status-driven failures.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Custom { status, .. } => Some(*status),
            _ => None,
        }
    }
}
