use tracing::{debug, warn};

use crate::error::Error;
use crate::response::RawResponse;
use crate::wire::WireRequest;

/// Lifecycle hooks for one client. Implementations only observe; they cannot
/// change the outcome of a call.
pub trait Logger: Send + Sync {
    fn on_send(&self, _request: &WireRequest) {}

    fn on_success(&self, _request: &WireRequest, _response: &RawResponse) {}

    fn on_refresh(&self, _request: &WireRequest, _response: &RawResponse) {}

    fn on_failure(&self, _request: &WireRequest, _response: Option<&RawResponse>, _error: &Error) {
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {}

/// Emits lifecycle events through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn on_send(&self, request: &WireRequest) {
        debug!(
            method = %request.method(),
            uri = %request.redacted_url(),
            body_bytes = request.body().len(),
            "sending request"
        );
    }

    fn on_success(&self, request: &WireRequest, response: &RawResponse) {
        debug!(
            method = %request.method(),
            uri = %request.redacted_url(),
            status = response.status().as_u16(),
            body_bytes = response.body().len(),
            "request completed"
        );
    }

    fn on_refresh(&self, request: &WireRequest, response: &RawResponse) {
        warn!(
            method = %request.method(),
            uri = %request.redacted_url(),
            status = response.status().as_u16(),
            "credential rejected, refreshing"
        );
    }

    fn on_failure(&self, request: &WireRequest, response: Option<&RawResponse>, error: &Error) {
        warn!(
            method = %request.method(),
            uri = %request.redacted_url(),
            status = response.map(|response| response.status().as_u16()),
            error_code = error.code().as_str(),
            error = %error,
            "request failed"
        );
    }
}
