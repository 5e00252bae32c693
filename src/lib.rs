//! `callx` turns declarative request descriptors into HTTP calls.
//!
//! A [`RequestDescriptor`] states what to call. The [`Client`] builds the
//! wire request, runs middleware, sends it through a [`Transport`], runs
//! interceptors and classifies the status. A refresh-worthy status (401 and
//! 403 by default) triggers one credential refresh followed by a single
//! resend.
//!
//! # Quick Start
//!
//! ```no_run
//! use callx::prelude::{Client, RequestDescriptor, StaticCredential};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder("https://api.example.com")
//!         .client_name("users-sdk")
//!         .credential_provider(StaticCredential::new("secret-token"))
//!         .try_build()?;
//!
//!     let descriptor = RequestDescriptor::get("/users/:id")
//!         .path_param("id", 42)
//!         .bearer_auth()
//!         .build();
//!     let user: User = client.fetch(&descriptor).await?;
//!
//!     println!("user {} is {}", user.id, user.name);
//!     Ok(())
//! }
//! ```

#[cfg(all(not(feature = "tls-rustls-ring"), not(feature = "tls-native")))]
compile_error!("callx requires one TLS backend feature: enable `tls-rustls-ring` or `tls-native`");

mod classify;
mod client;
mod codec;
mod config;
mod credential;
mod descriptor;
mod error;
mod hooks;
mod modifier;
mod observe;
mod response;
mod retry;
mod status;
mod transport;
mod util;
mod wire;

pub use async_trait::async_trait;

pub use crate::classify::{Failure, ResultBehavior, classify};
pub use crate::client::{Client, ClientBuilder};
pub use crate::codec::{Codec, JsonCodec};
pub use crate::config::{BaseAddress, ClientConfig, DEFAULT_CLIENT_NAME, DEFAULT_TIMEOUT};
pub use crate::credential::{CachedCredential, CredentialProvider, StaticCredential, TokenSource};
pub use crate::descriptor::{
    AuthRequirement, Body, CachePolicy, DEFAULT_REFRESH_CODES, DEFAULT_SUCCESS_CODES,
    DefaultFailurePolicy, DescriptorBuilder, FailureAction, FailurePolicy, Payload,
    RequestDescriptor,
};
pub use crate::error::{
    BoxError, CustomError, Error, ErrorCode, RefreshUnavailableReason, TransportErrorKind,
};
pub use crate::hooks::{Interceptor, Middleware};
pub use crate::modifier::build_wire_request;
pub use crate::observe::{Logger, NoopLogger, TracingLogger};
pub use crate::response::{RawResponse, Response};
pub use crate::retry::{CallState, RetryContext};
pub use crate::status::StatusKind;
pub use crate::transport::{HyperTransport, Progress, ProgressFn, TlsBackend, Transport};
pub use crate::wire::WireRequest;

pub type CallxResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AuthRequirement, Body, CachePolicy, CachedCredential, CallxResult, Client, ClientBuilder,
        CredentialProvider, Error, ErrorCode, FailureAction, Interceptor, Middleware, Progress,
        RawResponse, RequestDescriptor, Response, StaticCredential, StatusKind, TokenSource,
        Transport, WireRequest,
    };
}
