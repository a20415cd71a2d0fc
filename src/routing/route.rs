//! Route type and ingestion normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while normalizing a route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("empty host")]
    EmptyHost,

    #[error("invalid backend url '{raw}': {source}")]
    InvalidBackend {
        raw: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported backend scheme '{scheme}' (only http and https)")]
    UnsupportedScheme { scheme: String },

    #[error("backend url '{raw}' has no authority")]
    MissingAuthority { raw: String },
}

/// A committed (host → backend) binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Lowercased authority form without port.
    pub host: String,
    /// Absolute backend origin URL.
    pub backend: Url,
}

impl Route {
    /// Build a route from raw user input, applying the ingestion rules:
    /// the host is lowercased and stripped of any port suffix, and a
    /// schemeless backend gets `http://` prefixed.
    pub fn new(raw_host: &str, raw_backend: &str) -> Result<Self, RouteError> {
        let host = normalize_host(raw_host);
        if host.is_empty() {
            return Err(RouteError::EmptyHost);
        }
        let backend = normalize_backend(raw_backend)?;
        Ok(Self { host, backend })
    }
}

/// Lowercase and strip the port suffix from a host string.
pub fn normalize_host(raw: &str) -> String {
    raw.trim()
        .split(':')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Parse a backend URL, prefixing `http://` when no scheme is given.
pub fn normalize_backend(raw: &str) -> Result<Url, RouteError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let url = Url::parse(&candidate).map_err(|source| RouteError::InvalidBackend {
        raw: raw.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RouteError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(RouteError::MissingAuthority {
            raw: raw.to_string(),
        });
    }

    Ok(url)
}

/// On-disk representation of a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRecord {
    pub host: String,
    pub backend: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_lowercased_and_port_stripped() {
        assert_eq!(normalize_host("Example.COM:8443"), "example.com");
        assert_eq!(normalize_host("a.test"), "a.test");
    }

    #[test]
    fn schemeless_backend_gets_http_prefix() {
        let route = Route::new("a.test", "127.0.0.1:9001").unwrap();
        assert_eq!(route.backend.as_str(), "http://127.0.0.1:9001/");
        assert_eq!(route.backend.scheme(), "http");
    }

    #[test]
    fn https_backend_is_kept() {
        let route = Route::new("a.test", "https://origin.internal").unwrap();
        assert_eq!(route.backend.scheme(), "https");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = Route::new("a.test", "ftp://origin.internal").unwrap_err();
        assert!(matches!(err, RouteError::UnsupportedScheme { .. }));
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(
            Route::new("", "127.0.0.1:9001"),
            Err(RouteError::EmptyHost)
        ));
    }
}
