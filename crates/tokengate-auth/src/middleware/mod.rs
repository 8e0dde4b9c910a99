//! HTTP adapter for the token engine.
//!
//! This module provides Axum middleware for:
//!
//! - Locating bearer tokens in requests ([`TokenParser`])
//! - Authenticating requests ([`authenticate`], [`BearerAuth`])
//! - Refreshing the token on every request ([`refresh_token`])
//! - RFC 6750 error responses
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::post};
//! use tokengate_auth::middleware::{AuthState, refresh_token};
//!
//! let auth_state = AuthState::new(token_service);
//!
//! let app = Router::new()
//!     .route("/auth/refresh", post(|| async { "" }))
//!     .route_layer(middleware::from_fn_with_state(auth_state.clone(), refresh_token))
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;
pub mod parser;
pub mod refresh;
pub mod types;

pub use auth::{AuthState, BearerAuth, authenticate};
pub use parser::{AuthHeaders, QueryString, TokenExtractor, TokenParser, set_bearer};
pub use refresh::refresh_token;
pub use types::AuthContext;
