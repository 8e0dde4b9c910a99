//! Bearer token authentication middleware and extractor.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use tokengate_auth::middleware::{AuthState, BearerAuth, authenticate};
//!
//! async fn protected_handler(BearerAuth(auth): BearerAuth) -> String {
//!     format!("Hello, {}!", auth.subject())
//! }
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::token::service::TokenService;

use super::parser::TokenParser;
use super::types::AuthContext;

// =============================================================================
// Auth State
// =============================================================================

/// State required by the token middleware and the `BearerAuth` extractor.
///
/// Include it in your application state and expose it via `FromRef`:
///
/// ```ignore
/// #[derive(Clone)]
/// struct AppState {
///     auth: AuthState,
/// }
///
/// impl FromRef<AppState> for AuthState {
///     fn from_ref(state: &AppState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AuthState {
    /// Token service doing the actual work.
    pub service: Arc<TokenService>,

    /// Where tokens are looked up in requests.
    pub parser: TokenParser,
}

impl AuthState {
    /// Creates a new auth state with the default token parser.
    pub fn new(service: Arc<TokenService>) -> Self {
        Self {
            service,
            parser: TokenParser::default(),
        }
    }

    /// Replaces the token parser.
    #[must_use]
    pub fn with_parser(mut self, parser: TokenParser) -> Self {
        self.parser = parser;
        self
    }

    async fn authenticate_parts(&self, parts: &Parts) -> Result<AuthContext, AuthError> {
        let token = self.parser.parse(parts)?;
        let claims = self.service.authenticate(&token).await?;
        Ok(AuthContext::new(claims))
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Rejects requests without a valid, unrevoked bearer token.
///
/// On success the [`AuthContext`] is stored in the request extensions.
/// Install with `axum::middleware::from_fn_with_state(auth_state, authenticate)`.
///
/// # Errors
///
/// - 400 if no token is present
/// - 401 if the token is malformed, forged, expired or revoked
/// - 503 if the blacklist cannot be consulted
pub async fn authenticate(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();
    let context = state.authenticate_parts(&parts).await?;

    tracing::debug!(sub = %context.subject(), jti = %context.token_id(), "Request authenticated");

    parts.extensions.insert(context);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Axum extractor yielding the authenticated [`AuthContext`].
///
/// Reuses the context left by the [`authenticate`] or
/// [`refresh_token`](super::refresh_token) middleware when present; otherwise
/// parses and authenticates the token itself.
///
/// # Example
///
/// ```ignore
/// async fn handler(BearerAuth(auth): BearerAuth) -> impl IntoResponse {
///     auth.subject().to_string()
/// }
/// ```
pub struct BearerAuth(pub AuthContext);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<AuthContext>() {
            return Ok(BearerAuth(context.clone()));
        }

        let auth_state = AuthState::from_ref(state);
        let context = auth_state.authenticate_parts(parts).await?;
        parts.extensions.insert(context.clone());
        Ok(BearerAuth(context))
    }
}

// =============================================================================
// Tests
// =============================================================================
