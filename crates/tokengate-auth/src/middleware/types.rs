//! Authenticated request context.

use std::sync::Arc;

use serde_json::Value;

use crate::token::claims::ClaimSet;

/// Claims of the token that authenticated the current request.
///
/// Inserted into request extensions by the [`authenticate`](super::authenticate)
/// and [`refresh_token`](super::refresh_token) middleware, and returned by the
/// [`BearerAuth`](super::BearerAuth) extractor. For a refreshed request these are
/// the claims of the newly minted token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Verified claims (wrapped in Arc for cheap cloning).
    pub claims: Arc<ClaimSet>,
}

impl AuthContext {
    /// Wraps a verified claim set.
    #[must_use]
    pub fn new(claims: ClaimSet) -> Self {
        Self {
            claims: Arc::new(claims),
        }
    }

    /// Returns the subject (`sub`).
    #[must_use]
    pub fn subject(&self) -> &str {
        self.claims.subject().unwrap_or_default()
    }

    /// Returns the token identifier (`jti`).
    #[must_use]
    pub fn token_id(&self) -> &str {
        self.claims.token_id().unwrap_or_default()
    }

    /// Returns the expiration time (`exp`) in Unix seconds.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.claims.expires_at()
    }

    /// Returns a custom claim.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}
