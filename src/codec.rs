use bytes::Bytes;
use http::HeaderValue;
use serde_json::Value;

use crate::error::Error;
use crate::util::truncate_body;

/// Body codec shared by every request sent through one client.
///
/// Structured payloads travel as [`serde_json::Value`] so the trait stays
/// object safe; typed decoding happens on top of the returned value.
pub trait Codec: Send + Sync {
    fn content_type(&self) -> HeaderValue;

    fn encode(&self, value: &Value) -> Result<Bytes, Error>;

    fn decode(&self, body: &[u8]) -> Result<Value, Error>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static("application/json")
    }

    fn encode(&self, value: &Value) -> Result<Bytes, Error> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|source| Error::Encode {
                source: Box::new(source),
            })
    }

    fn decode(&self, body: &[u8]) -> Result<Value, Error> {
        // Empty bodies (204-style successes) decode to null.
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(body).map_err(|source| Error::Decode {
            source: Box::new(source),
            body: truncate_body(body),
        })
    }
}
