//! Caller-supplied extension points around the transport.
//!
//! [`Middleware`] runs after the wire request is fully built and before it is
//! sent; [`Interceptor`] runs after the transport returns and before the
//! status is classified. Both run in registration order, on the initial
//! attempt and on the resend after a credential refresh. One instance serves
//! every in-flight call of a client, so implementations must not keep
//! per-call mutable state.

use std::sync::Arc;

use crate::error::{BoxError, Error};
use crate::response::RawResponse;
use crate::wire::WireRequest;

pub trait Middleware: Send + Sync {
    fn prepare(&self, request: &mut WireRequest) -> Result<(), BoxError>;
}

impl<F> Middleware for F
where
    F: Fn(&mut WireRequest) -> Result<(), BoxError> + Send + Sync,
{
    fn prepare(&self, request: &mut WireRequest) -> Result<(), BoxError> {
        self(request)
    }
}

pub trait Interceptor: Send + Sync {
    fn intercept(
        &self,
        request: &WireRequest,
        response: RawResponse,
    ) -> Result<RawResponse, BoxError>;
}

impl<F> Interceptor for F
where
    F: Fn(&WireRequest, RawResponse) -> Result<RawResponse, BoxError> + Send + Sync,
{
    fn intercept(
        &self,
        request: &WireRequest,
        response: RawResponse,
    ) -> Result<RawResponse, BoxError> {
        self(request, response)
    }
}

pub(crate) fn run_middlewares(
    middlewares: &[Arc<dyn Middleware>],
    request: &mut WireRequest,
) -> Result<(), Error> {
    for middleware in middlewares {
        middleware
            .prepare(request)
            .map_err(|source| Error::Middleware { source })?;
    }
    Ok(())
}

pub(crate) fn run_interceptors(
    interceptors: &[Arc<dyn Interceptor>],
    request: &WireRequest,
    response: RawResponse,
) -> Result<RawResponse, Error> {
    interceptors
        .iter()
        .try_fold(response, |response, interceptor| {
            interceptor
                .intercept(request, response)
                .map_err(|source| Error::Interceptor { source })
        })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::{HeaderName, HeaderValue};
    use http::{HeaderMap, StatusCode};
    use url::Url;

    use super::*;

    fn request() -> WireRequest {
        WireRequest::new(
            Url::parse("https://api.example.com/v1").expect("url should parse"),
            std::time::Duration::from_secs(1),
        )
    }

    #[test]
    fn middlewares_run_in_registration_order() {
        let first: Arc<dyn Middleware> =
            Arc::new(|request: &mut WireRequest| -> Result<(), BoxError> {
                request.headers_mut().insert(
                    HeaderName::from_static("x-order"),
                    HeaderValue::from_static("first"),
                );
                Ok(())
            });
        let second: Arc<dyn Middleware> =
            Arc::new(|request: &mut WireRequest| -> Result<(), BoxError> {
                let seen = request
                    .headers()
                    .get("x-order")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                request.headers_mut().insert(
                    HeaderName::from_static("x-order"),
                    HeaderValue::from_str(&format!("{seen},second"))?,
                );
                Ok(())
            });

        let mut request = request();
        run_middlewares(&[first, second], &mut request).expect("middlewares should pass");
        assert_eq!(
            request.headers().get("x-order"),
            Some(&HeaderValue::from_static("first,second"))
        );
    }

    #[test]
    fn failing_middleware_aborts_the_chain() {
        let failing: Arc<dyn Middleware> = Arc::new(|_: &mut WireRequest| -> Result<(), BoxError> {
            Err("signing key missing".into())
        });
        let never: Arc<dyn Middleware> = Arc::new(|_: &mut WireRequest| -> Result<(), BoxError> {
            panic!("later middleware must not run")
        });

        let mut request = request();
        let error = run_middlewares(&[failing, never], &mut request)
            .expect_err("failing middleware should abort");
        assert!(matches!(error, Error::Middleware { .. }));
    }

    #[test]
    fn interceptors_see_previous_output() {
        let rewrite: Arc<dyn Interceptor> =
            Arc::new(|_: &WireRequest, mut response: RawResponse| -> Result<RawResponse, BoxError> {
                response.set_status(StatusCode::OK);
                response.set_body(Bytes::from_static(b"[]"));
                Ok(response)
            });
        let check: Arc<dyn Interceptor> =
            Arc::new(|_: &WireRequest, response: RawResponse| -> Result<RawResponse, BoxError> {
                assert_eq!(response.status(), StatusCode::OK);
                assert_eq!(response.body().as_ref(), b"[]");
                Ok(response)
            });

        let original = RawResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            "boom",
        );
        let response = run_interceptors(&[rewrite, check], &request(), original)
            .expect("interceptors should pass");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
