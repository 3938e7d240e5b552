//! Authentication gate for inbound streams.
//!
//! The strategy is chosen once at startup from [`AuthSettings`] and never
//! changes for the life of the process.

mod keys;
mod request;
mod signed;
mod simple;

pub use keys::{CachedKeySource, HttpKeySource, KeySource, StaticKeySource};
pub use request::RequestContext;
pub use signed::{check_age, DeviceClaims, SignedTokenAuth};
pub use simple::{NoAuth, TokenAuth};

use crate::config::{AuthMethod, AuthSettings};
use crate::error::GatewayError;

pub enum Authenticator {
    None(NoAuth),
    Token(TokenAuth),
    Signed(SignedTokenAuth),
}

impl Authenticator {
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, GatewayError> {
        let authenticator = match settings {
            AuthSettings::None => Authenticator::None(NoAuth),
            AuthSettings::Simple { token } => {
                if token.is_empty() {
                    return Err(GatewayError::Configuration(
                        "Simple auth requires a token".to_string(),
                    ));
                }
                Authenticator::Token(TokenAuth::new(token.clone()))
            }
            AuthSettings::Signed {
                keys_uri,
                tolerable_age,
                key_cache_ttl,
            } => {
                if keys_uri.is_empty() {
                    return Err(GatewayError::Configuration(
                        "Signed auth requires an API URI for public key retrieval".to_string(),
                    ));
                }
                if tolerable_age.is_zero() {
                    return Err(GatewayError::Configuration(
                        "Signed auth requires a positive tolerable age".to_string(),
                    ));
                }
                Authenticator::Signed(SignedTokenAuth::new(
                    keys_uri,
                    *tolerable_age,
                    *key_cache_ttl,
                )?)
            }
        };

        tracing::info!(method = %authenticator.method(), "Authentication configured");
        Ok(authenticator)
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            Authenticator::None(_) => AuthMethod::None,
            Authenticator::Token(_) => AuthMethod::Simple,
            Authenticator::Signed(_) => AuthMethod::Signed,
        }
    }

    /// Decide whether `request` may open a stream. Never touches hub state.
    pub async fn validate(&self, request: &RequestContext) -> bool {
        match self {
            Authenticator::None(auth) => auth.validate(request),
            Authenticator::Token(auth) => auth.validate(request),
            Authenticator::Signed(auth) => auth.validate(request).await,
        }
    }
}
