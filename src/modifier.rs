//! Builds a [`WireRequest`] from a descriptor.
//!
//! Every step owns one concern and the order is fixed: path, query, body,
//! headers, method, timeout, cache policy. Headers come after the body so
//! that body-derived headers are merged rather than overwritten. Each build
//! starts from the bare base address, so building the same descriptor twice
//! with an unchanged credential yields identical requests.

use bytes::Bytes;
use http::HeaderMap;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use url::Url;

use crate::CallxResult;
use crate::config::ClientConfig;
use crate::descriptor::{AuthRequirement, Payload, RequestDescriptor};
use crate::error::Error;
use crate::util::{
    encode_query_pairs, is_absolute_http, join_base_path, parse_header_name, parse_header_value,
    substitute_path_params,
};
use crate::wire::WireRequest;

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const BYTES_CONTENT_TYPE: &str = "application/octet-stream";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub(crate) trait Modifier {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        config: &ClientConfig,
    ) -> CallxResult<()>;
}

const MODIFIERS: [&dyn Modifier; 7] = [
    &ResolvePath,
    &AppendQuery,
    &EncodeBody,
    &AssembleHeaders,
    &AssignMethod,
    &AssignTimeout,
    &AssignCachePolicy,
];

/// Runs the full modifier chain. Failures here are build errors and are
/// never retried.
pub fn build_wire_request(
    descriptor: &RequestDescriptor,
    config: &ClientConfig,
) -> CallxResult<WireRequest> {
    let mut request = WireRequest::new(
        config.base_address().url().clone(),
        config.default_timeout(),
    );
    for modifier in MODIFIERS {
        modifier.apply(&mut request, descriptor, config)?;
    }
    Ok(request)
}

struct ResolvePath;

impl Modifier for ResolvePath {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        config: &ClientConfig,
    ) -> CallxResult<()> {
        let path = substitute_path_params(descriptor.path(), descriptor.path_params());
        let target = if is_absolute_http(&path) {
            path
        } else {
            join_base_path(config.base_address().as_str(), &path)
        };
        let url = Url::parse(&target).map_err(|_| Error::InvalidUri { uri: target.clone() })?;
        request.set_url(url);
        Ok(())
    }
}

struct AppendQuery;

impl Modifier for AppendQuery {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        _config: &ClientConfig,
    ) -> CallxResult<()> {
        let present = descriptor
            .query()
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|value| (name.as_str(), value)));
        let Some(encoded) = encode_query_pairs(present) else {
            return Ok(());
        };

        let query = match request.url().query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
            _ => encoded,
        };
        let mut url = request.url().clone();
        url.set_query(Some(&query));
        request.set_url(url);
        Ok(())
    }
}

struct EncodeBody;

impl Modifier for EncodeBody {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        config: &ClientConfig,
    ) -> CallxResult<()> {
        let body = descriptor.body();
        request.headers_mut().remove(CONTENT_TYPE);
        request.headers_mut().remove(CONTENT_LENGTH);

        let encoded = match body.payload() {
            Payload::Empty => None,
            Payload::Json(value) => {
                let codec = config.codec();
                Some((codec.content_type(), codec.encode(value)?))
            }
            Payload::Text(text) => Some((
                HeaderValue::from_static(TEXT_CONTENT_TYPE),
                Bytes::from(text.clone()),
            )),
            Payload::Bytes(bytes) => Some((
                HeaderValue::from_static(BYTES_CONTENT_TYPE),
                bytes.clone(),
            )),
            Payload::Form(pairs) => {
                let form = serde_urlencoded::to_string(pairs).map_err(|source| Error::Encode {
                    source: Box::new(source),
                })?;
                Some((HeaderValue::from_static(FORM_CONTENT_TYPE), Bytes::from(form)))
            }
        };

        match encoded {
            Some((content_type, bytes)) => {
                let headers = request.headers_mut();
                headers.insert(CONTENT_TYPE, content_type);
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                request.set_body(bytes);
            }
            None => request.set_body(Bytes::new()),
        }

        if body.is_empty() {
            return Ok(());
        }
        for (name, value) in body.headers() {
            let header_name = parse_header_name(name)?;
            let header_value = parse_header_value(name, value)?;
            request.headers_mut().insert(header_name, header_value);
        }
        Ok(())
    }
}

struct AssembleHeaders;

impl Modifier for AssembleHeaders {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        config: &ClientConfig,
    ) -> CallxResult<()> {
        let body_headers = std::mem::take(request.headers_mut());

        let mut headers = config.default_headers().clone();
        if descriptor.body().is_empty() {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
        }
        overlay(&mut headers, &body_headers);

        let mut declared = HeaderMap::new();
        for (name, value) in descriptor.headers() {
            let Some(value) = value else {
                continue;
            };
            declared.append(parse_header_name(name)?, parse_header_value(name, value)?);
        }
        overlay(&mut headers, &declared);

        // The credential wins over any declared authorization header.
        if *descriptor.auth() != AuthRequirement::None
            && let Some(provider) = config.credential_provider()
            && let Some(token) = provider.current_token()
            && let Some(formatted) = descriptor.auth().format_token(&token)
        {
            let mut value = parse_header_value(AUTHORIZATION.as_str(), &formatted)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        *request.headers_mut() = headers;
        Ok(())
    }
}

/// Replaces every key present in `source`, keeping all of its values in order.
fn overlay(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        target.remove(name);
        for value in source.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

struct AssignMethod;

impl Modifier for AssignMethod {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        _config: &ClientConfig,
    ) -> CallxResult<()> {
        request.set_method(descriptor.method().clone());
        Ok(())
    }
}

struct AssignTimeout;

impl Modifier for AssignTimeout {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        config: &ClientConfig,
    ) -> CallxResult<()> {
        request.set_timeout(descriptor.timeout().unwrap_or(config.default_timeout()));
        Ok(())
    }
}

struct AssignCachePolicy;

impl Modifier for AssignCachePolicy {
    fn apply(
        &self,
        request: &mut WireRequest,
        descriptor: &RequestDescriptor,
        _config: &ClientConfig,
    ) -> CallxResult<()> {
        request.set_cache_policy(descriptor.cache_policy());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use http::Method;
    use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
    use serde_json::json;

    use super::build_wire_request;
    use crate::config::{BaseAddress, ClientConfig, DEFAULT_TIMEOUT};
    use crate::credential::StaticCredential;
    use crate::descriptor::{AuthRequirement, Body, CachePolicy, RequestDescriptor};
    use crate::error::ErrorCode;

    fn config(base: &str) -> ClientConfig {
        ClientConfig::new(BaseAddress::parse(base).expect("base should parse"))
    }

    fn authenticated_config(token: &str) -> ClientConfig {
        let mut config = config("https://api.example.com");
        config.credential_provider = Some(Arc::new(StaticCredential::new(token)));
        config
    }

    #[test]
    fn get_without_body_has_no_body_bytes() {
        let descriptor = RequestDescriptor::get("/items").build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert!(request.body().is_empty());
        assert!(request.headers().get(CONTENT_LENGTH).is_none());
        assert!(request.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn null_json_body_is_sent_as_no_body() {
        let descriptor = RequestDescriptor::post("/items")
            .json(&Option::<u32>::None)
            .expect("null should serialize")
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert!(request.body().is_empty());
        assert!(request.headers().get(CONTENT_TYPE).is_none());
        assert!(request.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn empty_body_drops_its_override_and_default_content_headers() {
        let mut config = config("https://api.example.com");
        config
            .default_headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        let descriptor = RequestDescriptor::get("/items")
            .body(Body::empty().with_header("content-type", "application/json"))
            .build();
        let request = build_wire_request(&descriptor, &config).expect("request should build");
        assert!(request.body().is_empty());
        assert!(request.headers().get(CONTENT_TYPE).is_none());
        assert!(request.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn header_names_merge_case_insensitively() {
        let mut config = config("https://api.example.com");
        config
            .default_headers
            .insert(HeaderName::from_static("x-source"), HeaderValue::from_static("default"));
        let descriptor = RequestDescriptor::get("/items")
            .header("X-Source", "upper")
            .header("x-SOURCE", "mixed")
            .build();
        let request = build_wire_request(&descriptor, &config).expect("request should build");

        let values: Vec<_> = request.headers().get_all("x-source").iter().collect();
        assert_eq!(values, ["upper", "mixed"]);
        assert_eq!(request.headers().keys_len(), 1);
    }

    #[test]
    fn path_params_are_substituted() {
        let descriptor = RequestDescriptor::get("/users/:id")
            .path_param("id", 42)
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.url().as_str(), "https://api.example.com/users/42");
        assert!(!request.url().path().contains(':'));
    }

    #[test]
    fn path_params_are_percent_encoded_and_unknown_ones_stay() {
        let descriptor = RequestDescriptor::get("/teams/:team/members/:member")
            .path_param("team", "red team")
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com/v1/"))
            .expect("request should build");
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/v1/teams/red%20team/members/:member"
        );
    }

    #[test]
    fn absolute_path_bypasses_base_address() {
        let descriptor = RequestDescriptor::get("https://cdn.example.net/file.bin").build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.url().as_str(), "https://cdn.example.net/file.bin");
    }

    #[test]
    fn absent_query_values_are_skipped() {
        let descriptor = RequestDescriptor::get("/search")
            .query("q", "hi there")
            .optional_query("page", None)
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/search?q=hi%20there"
        );
    }

    #[test]
    fn query_is_appended_after_existing_one() {
        let descriptor = RequestDescriptor::get("/search?lang=en")
            .query("q", "rust")
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.url().query(), Some("lang=en&q=rust"));
    }

    #[test]
    fn only_absent_query_values_leave_url_untouched() {
        let descriptor = RequestDescriptor::get("/search")
            .optional_query("page", None)
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.url().query(), None);
    }

    #[test]
    fn json_body_sets_content_headers() {
        let descriptor = RequestDescriptor::post("/items")
            .json(&json!({ "name": "demo" }))
            .expect("payload should serialize")
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.body().as_ref(), br#"{"name":"demo"}"#);
        assert_eq!(
            request.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(
            request.headers().get(CONTENT_LENGTH),
            Some(&HeaderValue::from(15_usize))
        );
    }

    #[test]
    fn form_and_text_bodies_self_encode() {
        let form = RequestDescriptor::post("/login")
            .body(Body::form([("user", "ann"), ("note", "a b")]))
            .build();
        let request = build_wire_request(&form, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.body().as_ref(), b"user=ann&note=a+b");
        assert_eq!(
            request.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static(
                "application/x-www-form-urlencoded"
            ))
        );

        let scalar = RequestDescriptor::put("/counter")
            .body(Body::scalar(7))
            .build();
        let request = build_wire_request(&scalar, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.body().as_ref(), b"7");
        assert_eq!(
            request.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/plain; charset=utf-8"))
        );
    }

    #[test]
    fn header_precedence_is_default_then_body_then_descriptor() {
        let mut config = config("https://api.example.com");
        config
            .default_headers
            .insert(HeaderName::from_static("x-source"), HeaderValue::from_static("default"));
        config
            .default_headers
            .insert(HeaderName::from_static("x-keep"), HeaderValue::from_static("kept"));

        let descriptor = RequestDescriptor::post("/items")
            .body(Body::text("hello").with_header("content-type", "text/markdown"))
            .header("X-Source", "descriptor")
            .header("accept", "application/json")
            .header("accept", "text/plain")
            .optional_header("x-absent", None)
            .build();
        let request =
            build_wire_request(&descriptor, &config).expect("request should build");
        let headers = request.headers();

        assert_eq!(headers.get("x-source").map(|v| v.as_bytes()), Some(&b"descriptor"[..]));
        assert_eq!(headers.get("x-keep").map(|v| v.as_bytes()), Some(&b"kept"[..]));
        assert_eq!(
            headers.get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/markdown"[..])
        );
        let accept: Vec<_> = headers.get_all("accept").iter().collect();
        assert_eq!(accept, ["application/json", "text/plain"]);
        assert!(headers.get("x-absent").is_none());
    }

    #[test]
    fn auth_header_is_sensitive_and_overrides_declared_one() {
        let descriptor = RequestDescriptor::get("/me")
            .bearer_auth()
            .header("authorization", "Bearer forged")
            .build();
        let request = build_wire_request(&descriptor, &authenticated_config("t0"))
            .expect("request should build");
        let value = request
            .headers()
            .get(AUTHORIZATION)
            .expect("authorization header should be set");
        assert_eq!(value, "Bearer t0");
        assert!(value.is_sensitive());
    }

    #[test]
    fn auth_header_formats_by_requirement() {
        let descriptor = RequestDescriptor::get("/me")
            .auth(AuthRequirement::Custom("Token".to_owned()))
            .build();
        let request = build_wire_request(&descriptor, &authenticated_config("abc"))
            .expect("request should build");
        assert_eq!(
            request.headers().get(AUTHORIZATION).map(|v| v.as_bytes()),
            Some(&b"Token abc"[..])
        );

        let anonymous = RequestDescriptor::get("/public").build();
        let request = build_wire_request(&anonymous, &authenticated_config("abc"))
            .expect("request should build");
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn missing_provider_means_no_auth_header() {
        let descriptor = RequestDescriptor::get("/me").bearer_auth().build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn method_timeout_and_cache_policy_are_assigned() {
        let descriptor = RequestDescriptor::delete("/items/1")
            .timeout(Duration::from_secs(3))
            .cache_policy(CachePolicy::ReloadIgnoringCache)
            .build();
        let request = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect("request should build");
        assert_eq!(request.method(), &Method::DELETE);
        assert_eq!(request.timeout(), Duration::from_secs(3));
        assert_eq!(request.cache_policy(), CachePolicy::ReloadIgnoringCache);
    }

    #[test]
    fn building_twice_is_identical() {
        let descriptor = RequestDescriptor::post("/users/:id/notes")
            .path_param("id", 7)
            .query("draft", "true")
            .header("x-trace", "abc")
            .bearer_auth()
            .json(&json!({ "text": "hello" }))
            .expect("payload should serialize")
            .build();
        let config = authenticated_config("t0");
        let first = build_wire_request(&descriptor, &config).expect("first build");
        let second = build_wire_request(&descriptor, &config).expect("second build");
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_header_name_is_a_build_error() {
        let descriptor = RequestDescriptor::get("/items")
            .header("bad header", "x")
            .build();
        let error = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect_err("invalid header name should fail");
        assert_eq!(error.code(), ErrorCode::InvalidHeaderName);
        assert!(error.is_build_error());
    }

    #[test]
    fn invalid_header_value_is_a_build_error() {
        let descriptor = RequestDescriptor::get("/items")
            .header("x-bad", "line\nbreak")
            .build();
        let error = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect_err("invalid header value should fail");
        assert_eq!(error.code(), ErrorCode::InvalidHeaderValue);
    }

    #[test]
    fn unparsable_absolute_path_is_invalid_uri() {
        let descriptor = RequestDescriptor::get("http://[::1").build();
        let error = build_wire_request(&descriptor, &config("https://api.example.com"))
            .expect_err("bad absolute url should fail");
        assert_eq!(error.code(), ErrorCode::InvalidUri);
    }
}
