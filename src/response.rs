use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Bytes and metadata as returned by the transport, before classification.
///
/// Interceptors receive and may replace every field. A transport that has no
/// HTTP metadata leaves `status` unset; it then reads as `200 OK`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawResponse {
    body: Bytes,
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            status: Some(status),
            headers,
        }
    }

    /// Response without HTTP metadata.
    pub fn from_body(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            status: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn into_response(self) -> Response<Bytes> {
        let status = self.status();
        Response::new(self.body, status, self.headers)
    }
}

/// Successful outcome of a call.
#[derive(Clone, Debug)]
pub struct Response<T> {
    data: T,
    status: StatusCode,
    headers: HeaderMap,
}

impl<T> Response<T> {
    pub(crate) fn new(data: T, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            data,
            status,
            headers,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn map<U>(self, map: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            data: map(self.data),
            status: self.status,
            headers: self.headers,
        }
    }

    pub(crate) fn try_map<U, E>(
        self,
        map: impl FnOnce(T) -> Result<U, E>,
    ) -> Result<Response<U>, E> {
        Ok(Response {
            data: map(self.data)?,
            status: self.status,
            headers: self.headers,
        })
    }
}

impl Response<Bytes> {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
