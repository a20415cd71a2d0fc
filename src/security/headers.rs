//! Header manipulation: hop-by-hop stripping, forwarding headers, and the
//! security response header set.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};

/// RFC 2616 §13.5.1 hop-by-hop headers; scoped to a single hop and never
/// forwarded in either direction.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const SECURITY_HEADERS: [(&str, &str); 7] = [
    ("x-frame-options", "DENY"),
    ("content-security-policy", "frame-ancestors 'none'"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains; preload",
    ),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=(), payment=(), usb=(), \
         magnetometer=(), gyroscope=(), accelerometer=()",
    ),
];

/// Remove every hop-by-hop header.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Build the header set sent upstream: the end-to-end request headers with
/// hop-by-hop headers and the original Host removed, plus the forwarding
/// headers derived from the client connection.
pub fn upstream_headers(
    original: &HeaderMap,
    host: &str,
    scheme: &str,
    client_ip: &str,
) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);
    // The HTTP client derives Host from the backend URL.
    headers.remove(axum::http::header::HOST);

    set_str(&mut headers, "x-forwarded-host", host);
    set_str(&mut headers, "x-forwarded-proto", scheme);
    set_str(&mut headers, "x-forwarded-for", client_ip);
    set_str(&mut headers, "x-real-ip", client_ip);

    headers
}

/// Attach the security response header set.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

fn set_str(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
