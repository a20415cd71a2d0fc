//! Request-path error taxonomy.
//!
//! Every failure a client can observe maps onto one of these variants, and
//! each variant maps onto exactly one HTTP status. Internal detail (upstream
//! error chains, breaker state) stays in the logs; clients only ever see the
//! short bodies below.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the request pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The Host header is missing or fails the syntax check.
    #[error("invalid host header")]
    InvalidHost,

    /// The per-IP fixed-window counter is exhausted.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the current window rolls over.
        retry_after_secs: u64,
    },

    /// No backend is configured for the requested host.
    #[error("no backend configured for host: {host}")]
    NoRoute { host: String },

    /// The backend's circuit breaker rejected the attempt.
    #[error("circuit breaker open for {backend}")]
    BreakerOpen { backend: String },

    /// Network error, timeout, or 5xx from the backend after all retries.
    #[error("upstream request failed: {reason}")]
    Upstream { reason: String },

    /// Unexpected condition inside the engine.
    #[error("internal proxy error")]
    Internal,
}

impl ProxyError {
    /// The HTTP status this error translates to.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidHost => StatusCode::BAD_REQUEST,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::NoRoute { .. }
            | ProxyError::BreakerOpen { .. }
            | ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match &self {
            ProxyError::NoRoute { host } => Response::new(Body::from(format!(
                "No backend configured for host: {host}"
            ))),
            ProxyError::InvalidHost => Response::new(Body::from("Invalid host header")),
            ProxyError::RateLimited { .. } => Response::new(Body::from("Rate limit exceeded")),
            ProxyError::BreakerOpen { .. } | ProxyError::Upstream { .. } => {
                Response::new(Body::from("Bad Gateway"))
            }
            ProxyError::Internal => Response::new(Body::from("Internal Server Error")),
        };
        *response.status_mut() = status;

        if let ProxyError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ProxyError::InvalidHost.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::RateLimited { retry_after_secs: 60 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ProxyError::NoRoute { host: "a.test".into() }.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ProxyError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = ProxyError::RateLimited { retry_after_secs: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "60"
        );
    }

    #[test]
    fn no_route_body_names_host() {
        let err = ProxyError::NoRoute { host: "missing.test".into() };
        assert_eq!(
            err.to_string(),
            "no backend configured for host: missing.test"
        );
    }
}
