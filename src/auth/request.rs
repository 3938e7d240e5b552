use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// What the auth gate gets to see of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub token: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub path: String,
}

impl RequestContext {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn from_request(uri: &Uri, headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            token: extract_token(uri, headers),
            remote_addr,
            path: uri.path().to_string(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Extract token from query parameter or Authorization header
fn extract_token(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    // A malformed query string is treated as having no token
    if let Ok(Query(query)) = Query::<TokenQuery>::try_from_uri(uri) {
        if let Some(token) = query.token.filter(|t| !t.is_empty()) {
            return Some(token);
        }
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    None
}
