//! ACME HTTP-01 challenge handler.
//!
//! Serves challenge files placed by the certificate tooling under
//! `<data-root>/acme-challenges/.well-known/acme-challenge/`. This handler
//! takes priority over host routing, host validation and rate limiting so
//! that certificate issuance succeeds even while limits would otherwise
//! fire.

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

/// URL prefix the ACME server fetches challenges from, over port 80.
pub const CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Serves challenge tokens from a directory on disk.
#[derive(Debug, Clone)]
pub struct ChallengeDir {
    root: PathBuf,
}

impl ChallengeDir {
    /// `root` is the ACME data directory; challenge files live under
    /// `.well-known/acme-challenge/` inside it, mirroring the URL space.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Whether a request path is a challenge fetch.
    pub fn matches(path: &str) -> bool {
        path.starts_with(CHALLENGE_PREFIX)
    }

    /// Serve the file for `token`: 200 with `text/plain` when it exists,
    /// 404 otherwise. Tokens containing `/` or `..` are rejected so a
    /// crafted path can never escape the challenge directory.
    pub async fn serve(&self, token: &str) -> Response {
        if token.is_empty() || token.contains('/') || token.contains("..") {
            tracing::warn!(token = %token, "Rejected malformed ACME challenge token");
            return not_found();
        }

        let path = self
            .root
            .join(".well-known")
            .join("acme-challenge")
            .join(token);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::info!(token = %token, "Served ACME challenge");
                let mut response = Response::new(Body::from(bytes));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain"),
                );
                response
            }
            Err(_) => {
                tracing::debug!(token = %token, path = %path.display(), "ACME challenge not found");
                not_found()
            }
        }
    }
}

fn not_found() -> Response {
    let mut response = Response::new(Body::from("Not Found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
