//! # tokengate-auth
//!
//! Bearer token lifecycle engine.
//!
//! This crate provides:
//! - Signed JWT issue and verification (HMAC, RSA, P-384)
//! - Temporal validation with clock skew allowance
//! - Single-use token refresh with a replay-preventing blacklist
//! - Logout (revocation)
//! - Axum middleware and extractors for bearer-token requests
//!
//! ## Overview
//!
//! A token is accepted when its signature verifies, the current time lies in
//! `[nbf, exp)` and its `jti` is not on the blacklist. Refreshing a token
//! blacklists its `jti` through an atomic compare-and-set before the new
//! token is minted, so at most one refresh per token can succeed.
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`error`] - Error taxonomy
//! - [`token`] - Claims, codec, validator, refresh coordinator, service facade
//! - [`storage`] - Blacklist storage trait
//! - [`middleware`] - HTTP adapter (token parser, middleware, extractor)

pub mod config;
pub mod error;
pub mod middleware;
pub mod storage;
pub mod token;

pub use config::{AuthConfig, BlacklistConfig, ConfigError, ParserConfig, SigningConfig};
pub use error::{AuthError, ErrorCategory};
pub use middleware::{
    AuthContext, AuthState, BearerAuth, TokenParser, authenticate, refresh_token, set_bearer,
};
pub use storage::{BlacklistStorage, bounded};
pub use token::{
    ClaimSet, ClaimSetBuilder, IssuedToken, JwtCodec, Jwks, KeyMaterial, RefreshCoordinator,
    SigningAlgorithm, TokenCodec, TokenConfig, TokenService, TokenValidator,
};

/// Type alias for token engine results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokengate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{AuthContext, AuthState, BearerAuth, TokenParser};
    pub use crate::storage::BlacklistStorage;
    pub use crate::token::{
        ClaimSet, IssuedToken, JwtCodec, KeyMaterial, SigningAlgorithm, TokenCodec, TokenConfig,
        TokenService,
    };
}
