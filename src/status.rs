//! Descriptive taxonomy of HTTP status codes.
//!
//! Every standard code between 100 and 511 has its own [`StatusKind`]
//! variant. Anything else maps to [`StatusKind::Unknown`], whose numeric code
//! is `0`, so classification never fails on an unexpected status.

macro_rules! status_kinds {
    ($($variant:ident = $code:literal => $text:literal,)+) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum StatusKind {
            $($variant,)+
            Unknown,
        }

        impl StatusKind {
            pub const fn from_code(code: u16) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    _ => Self::Unknown,
                }
            }

            pub const fn code(self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Unknown => 0,
                }
            }

            pub const fn description(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Unknown => "Unknown Status",
                }
            }
        }
    };
}

status_kinds! {
    Continue = 100 => "Continue",
    SwitchingProtocols = 101 => "Switching Protocols",
    Processing = 102 => "Processing",
    EarlyHints = 103 => "Early Hints",
    Ok = 200 => "OK",
    Created = 201 => "Created",
    Accepted = 202 => "Accepted",
    NonAuthoritativeInformation = 203 => "Non-Authoritative Information",
    NoContent = 204 => "No Content",
    ResetContent = 205 => "Reset Content",
    PartialContent = 206 => "Partial Content",
    MultiStatus = 207 => "Multi-Status",
    AlreadyReported = 208 => "Already Reported",
    ImUsed = 226 => "IM Used",
    MultipleChoices = 300 => "Multiple Choices",
    MovedPermanently = 301 => "Moved Permanently",
    Found = 302 => "Found",
    SeeOther = 303 => "See Other",
    NotModified = 304 => "Not Modified",
    UseProxy = 305 => "Use Proxy",
    TemporaryRedirect = 307 => "Temporary Redirect",
    PermanentRedirect = 308 => "Permanent Redirect",
    BadRequest = 400 => "Bad Request",
    Unauthorized = 401 => "Unauthorized",
    PaymentRequired = 402 => "Payment Required",
    Forbidden = 403 => "Forbidden",
    NotFound = 404 => "Not Found",
    MethodNotAllowed = 405 => "Method Not Allowed",
    NotAcceptable = 406 => "Not Acceptable",
    ProxyAuthenticationRequired = 407 => "Proxy Authentication Required",
    RequestTimeout = 408 => "Request Timeout",
    Conflict = 409 => "Conflict",
    Gone = 410 => "Gone",
    LengthRequired = 411 => "Length Required",
    PreconditionFailed = 412 => "Precondition Failed",
    PayloadTooLarge = 413 => "Payload Too Large",
    UriTooLong = 414 => "URI Too Long",
    UnsupportedMediaType = 415 => "Unsupported Media Type",
    RangeNotSatisfiable = 416 => "Range Not Satisfiable",
    ExpectationFailed = 417 => "Expectation Failed",
    ImATeapot = 418 => "I'm a teapot",
    MisdirectedRequest = 421 => "Misdirected Request",
    UnprocessableEntity = 422 => "Unprocessable Entity",
    Locked = 423 => "Locked",
    FailedDependency = 424 => "Failed Dependency",
    TooEarly = 425 => "Too Early",
    UpgradeRequired = 426 => "Upgrade Required",
    PreconditionRequired = 428 => "Precondition Required",
    TooManyRequests = 429 => "Too Many Requests",
    RequestHeaderFieldsTooLarge = 431 => "Request Header Fields Too Large",
    UnavailableForLegalReasons = 451 => "Unavailable For Legal Reasons",
    InternalServerError = 500 => "Internal Server Error",
    NotImplemented = 501 => "Not Implemented",
    BadGateway = 502 => "Bad Gateway",
    ServiceUnavailable = 503 => "Service Unavailable",
    GatewayTimeout = 504 => "Gateway Timeout",
    HttpVersionNotSupported = 505 => "HTTP Version Not Supported",
    VariantAlsoNegotiates = 506 => "Variant Also Negotiates",
    InsufficientStorage = 507 => "Insufficient Storage",
    LoopDetected = 508 => "Loop Detected",
    NotExtended = 510 => "Not Extended",
    NetworkAuthenticationRequired = 511 => "Network Authentication Required",
}

impl StatusKind {
    pub const fn is_client_error(self) -> bool {
        matches!(self.code(), 400..=499)
    }

    pub const fn is_server_error(self) -> bool {
        matches!(self.code(), 500..=599)
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.description())
    }
}

impl From<http::StatusCode> for StatusKind {
    fn from(status: http::StatusCode) -> Self {
        Self::from_code(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::StatusKind;

    #[test]
    fn known_codes_map_to_their_variant() {
        assert_eq!(StatusKind::from_code(404), StatusKind::NotFound);
        assert_eq!(StatusKind::from_code(511).code(), 511);
        assert_eq!(StatusKind::from_code(418).description(), "I'm a teapot");
    }

    #[test]
    fn unrecognized_codes_fall_back_to_unknown() {
        for code in [0_u16, 99, 299, 419, 599, 999] {
            let kind = StatusKind::from_code(code);
            assert_eq!(kind, StatusKind::Unknown, "code {code}");
            assert_eq!(kind.code(), 0);
        }
    }

    #[test]
    fn every_standard_code_in_range_round_trips() {
        let mut known = 0;
        for code in 100_u16..=511 {
            let kind = StatusKind::from_code(code);
            if kind != StatusKind::Unknown {
                assert_eq!(kind.code(), code);
                known += 1;
            }
        }
        assert_eq!(known, 62);
    }
}
