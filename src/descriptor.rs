//! Request descriptors: the immutable, transport-agnostic description of one
//! API call.
//!
//! A [`RequestDescriptor`] is assembled with a consuming builder and then
//! only ever borrowed by the client, so the exact same value is used when a
//! call is rebuilt after a credential refresh.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::Serialize;

use crate::CallxResult;
use crate::error::{CustomError, Error};

/// Status codes treated as success when a descriptor does not override them.
pub const DEFAULT_SUCCESS_CODES: [u16; 2] = [200, 201];

/// Status codes that trigger a credential refresh under the default policy.
pub const DEFAULT_REFRESH_CODES: [u16; 2] = [401, 403];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthRequirement {
    #[default]
    None,
    Bearer,
    Basic,
    /// Authorization value formatted as `{prefix} {token}`.
    Custom(String),
}

impl AuthRequirement {
    pub fn format_token(&self, token: &str) -> Option<String> {
        match self {
            Self::None => None,
            Self::Bearer => Some(format!("Bearer {token}")),
            Self::Basic => Some(format!("Basic {token}")),
            Self::Custom(prefix) => Some(format!("{prefix} {token}")),
        }
    }
}

/// Cache hint handed to the transport unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    UseProtocolCachePolicy,
    ReloadIgnoringCache,
    ReturnCacheElseLoad,
    ReturnCacheDontLoad,
}

/// What to do with a non-success status.
#[derive(Clone)]
pub enum FailureAction {
    /// Fail with the status taxonomy error.
    Default,
    /// Fail with a caller-supplied error.
    ThrowError(CustomError),
    /// Refresh the credential and resend once.
    RefreshCredential,
}

impl FailureAction {
    pub fn throw<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ThrowError(Arc::new(error))
    }
}

impl fmt::Debug for FailureAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => formatter.write_str("Default"),
            Self::ThrowError(error) => formatter
                .debug_tuple("ThrowError")
                .field(&error.to_string())
                .finish(),
            Self::RefreshCredential => formatter.write_str("RefreshCredential"),
        }
    }
}

pub trait FailurePolicy: Send + Sync {
    fn action(&self, status: StatusCode) -> FailureAction;
}

#[derive(Clone, Debug)]
pub struct DefaultFailurePolicy {
    refresh_codes: BTreeSet<u16>,
}

impl DefaultFailurePolicy {
    pub fn new() -> Self {
        Self {
            refresh_codes: DEFAULT_REFRESH_CODES.into_iter().collect(),
        }
    }

    pub fn refresh_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.refresh_codes = codes.into_iter().collect();
        self
    }
}

impl Default for DefaultFailurePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl FailurePolicy for DefaultFailurePolicy {
    fn action(&self, status: StatusCode) -> FailureAction {
        if self.refresh_codes.contains(&status.as_u16()) {
            FailureAction::RefreshCredential
        } else {
            FailureAction::Default
        }
    }
}

impl<F> FailurePolicy for F
where
    F: Fn(StatusCode) -> FailureAction + Send + Sync,
{
    fn action(&self, status: StatusCode) -> FailureAction {
        self(status)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    /// Structured value, encoded by the client's codec.
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
    Form(Vec<(String, String)>),
}

/// Request payload plus headers that describe it.
///
/// The override headers sit above the payload's natural `content-type` but
/// below headers declared on the descriptor itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Body {
    payload: Payload,
    headers: Vec<(String, String)>,
}

impl Body {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn json<T>(value: &T) -> CallxResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|source| Error::Encode {
            source: Box::new(source),
        })?;
        Ok(Self::from_payload(Payload::Json(value)))
    }

    pub fn json_value(value: serde_json::Value) -> Self {
        Self::from_payload(Payload::Json(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_payload(Payload::Text(text.into()))
    }

    /// Numbers, booleans and other scalars travel as their text form.
    pub fn scalar(value: impl fmt::Display) -> Self {
        Self::text(value.to_string())
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_payload(Payload::Bytes(bytes.into()))
    }

    pub fn form<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        Self::from_payload(Payload::Form(pairs))
    }

    /// A JSON `null` is stored as [`Payload::Empty`].
    pub fn from_payload(payload: Payload) -> Self {
        let payload = match payload {
            Payload::Json(serde_json::Value::Null) => Payload::Empty,
            payload => payload,
        };
        Self {
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.payload, Payload::Empty)
    }
}

#[derive(Clone)]
pub struct RequestDescriptor {
    path: String,
    method: Method,
    headers: Vec<(String, Option<String>)>,
    query: Vec<(String, Option<String>)>,
    path_params: BTreeMap<String, String>,
    body: Body,
    timeout: Option<Duration>,
    cache_policy: CachePolicy,
    auth: AuthRequirement,
    success_codes: BTreeSet<u16>,
    status_actions: BTreeMap<u16, FailureAction>,
    failure_policy: Arc<dyn FailurePolicy>,
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RequestDescriptor")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("path_params", &self.path_params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("cache_policy", &self.cache_policy)
            .field("auth", &self.auth)
            .field("success_codes", &self.success_codes)
            .field("status_actions", &self.status_actions)
            .finish()
    }
}

impl RequestDescriptor {
    pub fn builder(method: Method, path: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(method, path.into())
    }

    pub fn get(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::DELETE, path)
    }

    pub fn head(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::HEAD, path)
    }

    pub fn options(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::OPTIONS, path)
    }

    pub fn trace(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::TRACE, path)
    }

    pub fn connect(path: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::CONNECT, path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &[(String, Option<String>)] {
        &self.headers
    }

    pub fn query(&self) -> &[(String, Option<String>)] {
        &self.query
    }

    pub fn path_params(&self) -> &BTreeMap<String, String> {
        &self.path_params
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn auth(&self) -> &AuthRequirement {
        &self.auth
    }

    pub fn success_codes(&self) -> &BTreeSet<u16> {
        &self.success_codes
    }

    pub fn is_success(&self, status: StatusCode) -> bool {
        self.success_codes.contains(&status.as_u16())
    }

    /// Per-status overrides first, then the failure policy.
    pub fn failure_action(&self, status: StatusCode) -> FailureAction {
        match self.status_actions.get(&status.as_u16()) {
            Some(action) => action.clone(),
            None => self.failure_policy.action(status),
        }
    }
}

pub struct DescriptorBuilder {
    inner: RequestDescriptor,
}

impl DescriptorBuilder {
    fn new(method: Method, path: String) -> Self {
        Self {
            inner: RequestDescriptor {
                path,
                method,
                headers: Vec::new(),
                query: Vec::new(),
                path_params: BTreeMap::new(),
                body: Body::empty(),
                timeout: None,
                cache_policy: CachePolicy::default(),
                auth: AuthRequirement::default(),
                success_codes: DEFAULT_SUCCESS_CODES.into_iter().collect(),
                status_actions: BTreeMap::new(),
                failure_policy: Arc::new(DefaultFailurePolicy::new()),
            },
        }
    }

    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional_header(name, Some(value.into()))
    }

    /// Declares a header whose value may be absent. Absent headers are not
    /// sent at all.
    pub fn optional_header(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.inner.headers.push((name.into(), value));
        self
    }

    pub fn query(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional_query(name, Some(value.into()))
    }

    pub fn optional_query(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.inner.query.push((name.into(), value));
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.inner.path_params.insert(name.into(), value.to_string());
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.inner.body = body;
        self
    }

    pub fn json<T>(self, payload: &T) -> CallxResult<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.body(Body::json(payload)?))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.inner.cache_policy = cache_policy;
        self
    }

    pub fn auth(mut self, auth: AuthRequirement) -> Self {
        self.inner.auth = auth;
        self
    }

    pub fn bearer_auth(self) -> Self {
        self.auth(AuthRequirement::Bearer)
    }

    pub fn success_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.inner.success_codes = codes.into_iter().collect();
        self
    }

    pub fn on_status(mut self, status: u16, action: FailureAction) -> Self {
        self.inner.status_actions.insert(status, action);
        self
    }

    pub fn failure_policy(mut self, failure_policy: Arc<dyn FailurePolicy>) -> Self {
        self.inner.failure_policy = failure_policy;
        self
    }

    pub fn build(self) -> RequestDescriptor {
        self.inner
    }
}
