use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::{Instrument, info_span};

use crate::CallxResult;
use crate::classify::{Failure, ResultBehavior, classify};
use crate::codec::Codec;
use crate::config::{BaseAddress, ClientConfig};
use crate::credential::CredentialProvider;
use crate::descriptor::RequestDescriptor;
use crate::error::Error;
use crate::hooks::{Interceptor, Middleware, run_interceptors, run_middlewares};
use crate::modifier::build_wire_request;
use crate::observe::Logger;
use crate::response::{RawResponse, Response};
use crate::retry::RetryContext;
use crate::transport::{HyperTransport, Progress, ProgressFn, Transport, perform};
use crate::util::{parse_header_name, parse_header_value, truncate_body};
use crate::wire::WireRequest;

pub struct ClientBuilder {
    base_address: String,
    codec: Option<Arc<dyn Codec>>,
    logger: Option<Arc<dyn Logger>>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    default_headers: Vec<(String, String)>,
    default_timeout: Option<Duration>,
    client_name: Option<String>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub(crate) fn new(base_address: impl Into<String>) -> Self {
        Self {
            base_address: base_address.into(),
            codec: None,
            logger: None,
            credential_provider: None,
            middlewares: Vec::new(),
            interceptors: Vec::new(),
            default_headers: Vec::new(),
            default_timeout: None,
            client_name: None,
            transport: None,
        }
    }

    pub fn codec<C>(mut self, codec: C) -> Self
    where
        C: Codec + 'static,
    {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn logger<L>(self, logger: L) -> Self
    where
        L: Logger + 'static,
    {
        self.logger_arc(Arc::new(logger))
    }

    pub fn logger_arc(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn credential_provider<P>(self, provider: P) -> Self
    where
        P: CredentialProvider + 'static,
    {
        self.credential_provider_arc(Arc::new(provider))
    }

    pub fn credential_provider_arc(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential_provider = Some(provider);
        self
    }

    pub fn middleware<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middleware_arc(Arc::new(middleware))
    }

    pub fn middleware_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn interceptor<I>(self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptor_arc(Arc::new(interceptor))
    }

    pub fn interceptor_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Header sent with every request unless the body or the descriptor sets
    /// the same name.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn transport<T>(self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn try_build(self) -> CallxResult<Client> {
        let base_address = BaseAddress::parse(&self.base_address)?;
        let mut config = ClientConfig::new(base_address);

        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            default_headers.append(parse_header_name(name)?, parse_header_value(name, value)?);
        }
        config.default_headers = default_headers;

        if let Some(codec) = self.codec {
            config.codec = codec;
        }
        if let Some(logger) = self.logger {
            config.logger = logger;
        }
        if let Some(timeout) = self.default_timeout {
            config.default_timeout = timeout;
        }
        if let Some(client_name) = self.client_name {
            config.client_name = client_name;
        }
        config.credential_provider = self.credential_provider;
        config.middlewares = self.middlewares;
        config.interceptors = self.interceptors;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };

        Ok(Client {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn build(self) -> Client {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build callx client: {error}; use try_build() to handle configuration errors")
        })
    }
}

enum AttemptOutcome {
    Done(RawResponse),
    Resend,
}

/// Sends request descriptors to one backend.
///
/// Cloning is cheap and clones share the transport and configuration.
/// Replacing the codec or logger on one handle does not affect its clones.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn builder(base_address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_address)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_codec(&mut self, codec: Arc<dyn Codec>) {
        Arc::make_mut(&mut self.config).codec = codec;
    }

    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        Arc::make_mut(&mut self.config).logger = logger;
    }

    /// Builds the wire request a descriptor would produce right now, without
    /// running middleware or sending anything.
    pub fn wire_request(&self, descriptor: &RequestDescriptor) -> CallxResult<WireRequest> {
        build_wire_request(descriptor, &self.config)
    }

    pub async fn send(&self, descriptor: &RequestDescriptor) -> CallxResult<Response<Bytes>> {
        self.execute(descriptor, None)
            .await
            .map(RawResponse::into_response)
    }

    pub async fn send_with_progress<F>(
        &self,
        descriptor: &RequestDescriptor,
        progress: F,
    ) -> CallxResult<Response<Bytes>>
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        let progress: ProgressFn = Arc::new(progress);
        self.execute(descriptor, Some(&progress))
            .await
            .map(RawResponse::into_response)
    }

    /// Sends the descriptor and decodes the body with the client's codec.
    pub async fn send_decoded<T>(&self, descriptor: &RequestDescriptor) -> CallxResult<Response<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(descriptor).await?;
        let codec = Arc::clone(&self.config.codec);
        response.try_map(|body| {
            let value = codec.decode(&body)?;
            serde_json::from_value(value).map_err(|source| Error::Decode {
                source: Box::new(source),
                body: truncate_body(&body),
            })
        })
    }

    pub async fn fetch<T>(&self, descriptor: &RequestDescriptor) -> CallxResult<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.send_decoded(descriptor).await?.into_data())
    }

    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        progress: Option<&ProgressFn>,
    ) -> CallxResult<RawResponse> {
        let mut context = RetryContext::new();
        loop {
            // Rebuilt on every attempt so a refreshed token is picked up.
            let request = build_wire_request(descriptor, &self.config)?;
            let span = info_span!(
                "callx.request",
                client = %self.config.client_name,
                method = %request.method(),
                uri = %request.redacted_url(),
                attempt = context.attempt() + 1
            );
            let outcome = self
                .attempt(descriptor, request, progress, &mut context)
                .instrument(span)
                .await?;
            match outcome {
                AttemptOutcome::Done(response) => return Ok(response),
                AttemptOutcome::Resend => continue,
            }
        }
    }

    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        mut request: WireRequest,
        progress: Option<&ProgressFn>,
        context: &mut RetryContext,
    ) -> CallxResult<AttemptOutcome> {
        let logger = self.config.logger.as_ref();
        let fail = |context: &mut RetryContext,
                    request: &WireRequest,
                    response: Option<&RawResponse>,
                    error: Error| {
            context.mark_failed();
            logger.on_failure(request, response, &error);
            Err(error)
        };

        if let Err(error) = run_middlewares(&self.config.middlewares, &mut request) {
            return fail(context, &request, None, error);
        }

        logger.on_send(&request);
        context.mark_sent();
        let response = match perform(self.transport.as_ref(), &request, progress).await {
            Ok(response) => response,
            Err(error) => return fail(context, &request, None, error),
        };
        let response = match run_interceptors(&self.config.interceptors, &request, response) {
            Ok(response) => response,
            Err(error) => return fail(context, &request, None, error),
        };

        context.mark_classified();
        match classify(response.status(), descriptor) {
            ResultBehavior::Decode => {
                context.mark_success();
                logger.on_success(&request, &response);
                Ok(AttemptOutcome::Done(response))
            }
            ResultBehavior::ThrowError(failure) => {
                let error = failure_error(failure, &request, &response);
                fail(context, &request, Some(&response), error)
            }
            ResultBehavior::RefreshCredential => {
                let provider = self.config.credential_provider.as_deref();
                let provider = match context.begin_refresh(provider) {
                    Ok(provider) => provider,
                    Err(reason) => {
                        let error = Error::RefreshUnavailable { reason };
                        return fail(context, &request, Some(&response), error);
                    }
                };
                logger.on_refresh(&request, &response);
                if let Err(source) = provider.refresh().await {
                    return fail(context, &request, Some(&response), Error::Refresh { source });
                }
                context.mark_retried();
                Ok(AttemptOutcome::Resend)
            }
        }
    }
}

fn failure_error(failure: Failure, request: &WireRequest, response: &RawResponse) -> Error {
    let status = response.status();
    match failure {
        Failure::Status(kind) => Error::Status {
            status: status.as_u16(),
            kind,
            method: request.method().clone(),
            uri: request.redacted_url(),
            body: truncate_body(response.body()),
        },
        Failure::Custom(error) => Error::Custom {
            status: status.as_u16(),
            error,
        },
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
