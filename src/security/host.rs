//! Host header handling and client IP derivation.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Maximum accepted host length, per DNS name limits.
const MAX_HOST_LEN: usize = 253;

/// Placeholder bucket when no client address can be derived at all.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extract the host from the request headers: the substring before the
/// first colon, lowercased. Returns `None` when the header is absent or
/// not valid UTF-8.
pub fn extract_host(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::HOST)?.to_str().ok()?;
    let host = raw
        .split(':')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Validate host syntax: ASCII letters, digits, hyphen and dot only, each
/// dot-separated label starting and ending alphanumeric, total length at
/// most 253.
pub fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOST_LEN {
        return false;
    }
    host.split('.').all(valid_label)
}

fn valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

/// Derive the client IP used for rate limiting and X-Forwarded-For.
///
/// Preference order: first comma-separated entry of `X-Forwarded-For`,
/// then `X-Real-IP`, then the connection peer address. When the proxy sits
/// at the edge the forwarding headers are absent and the peer address is
/// what identifies the client; "unknown" is the last resort only.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
