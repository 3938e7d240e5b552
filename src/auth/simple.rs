use subtle::ConstantTimeEq;

use super::RequestContext;

/// Accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl NoAuth {
    pub fn validate(&self, _request: &RequestContext) -> bool {
        true
    }
}

/// Shared-secret check against the request token.
#[derive(Clone)]
pub struct TokenAuth {
    secret: String,
}

impl TokenAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn validate(&self, request: &RequestContext) -> bool {
        match request.token() {
            Some(token) if !token.is_empty() && !self.secret.is_empty() => {
                token.as_bytes().ct_eq(self.secret.as_bytes()).into()
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth").field("secret", &"<redacted>").finish()
    }
}
