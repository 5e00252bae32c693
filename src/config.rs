use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use url::Url;

use crate::CallxResult;
use crate::codec::{Codec, JsonCodec};
use crate::credential::CredentialProvider;
use crate::error::Error;
use crate::hooks::{Interceptor, Middleware};
use crate::observe::{Logger, TracingLogger};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CLIENT_NAME: &str = "callx";

/// Scheme, host, optional port and optional path prefix of a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseAddress {
    url: Url,
}

impl BaseAddress {
    pub fn parse(address: &str) -> CallxResult<Self> {
        let invalid = |message: &str| Error::InvalidBaseAddress {
            address: address.to_owned(),
            message: message.to_owned(),
        };

        let url = Url::parse(address.trim()).map_err(|source| invalid(&source.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }
        Ok(Self { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// Path prefix without a trailing slash; empty when the base has none.
    pub fn base_path(&self) -> &str {
        self.url.path().trim_end_matches('/')
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for BaseAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Configuration shared by every call issued through one client.
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) base_address: BaseAddress,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) credential_provider: Option<Arc<dyn CredentialProvider>>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) default_timeout: Duration,
    pub(crate) client_name: String,
}

impl ClientConfig {
    pub fn new(base_address: BaseAddress) -> Self {
        Self {
            base_address,
            codec: Arc::new(JsonCodec),
            logger: Arc::new(TracingLogger),
            credential_provider: None,
            middlewares: Vec::new(),
            interceptors: Vec::new(),
            default_headers: HeaderMap::new(),
            default_timeout: DEFAULT_TIMEOUT,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
        }
    }

    pub fn base_address(&self) -> &BaseAddress {
        &self.base_address
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn credential_provider(&self) -> Option<&Arc<dyn CredentialProvider>> {
        self.credential_provider.as_ref()
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("base_address", &self.base_address.as_str())
            .field("has_credential_provider", &self.credential_provider.is_some())
            .field("middlewares", &self.middlewares.len())
            .field("interceptors", &self.interceptors.len())
            .field("default_headers", &self.default_headers)
            .field("default_timeout", &self.default_timeout)
            .field("client_name", &self.client_name)
            .finish()
    }
}
