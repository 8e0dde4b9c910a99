//! Token-refreshing middleware.
//!
//! Every request passing through [`refresh_token`] trades its bearer token
//! for a new one. The handler sees the claims of the new token and the
//! response carries it in the `Authorization` header. The presented token is
//! revoked and cannot be used again.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;

use super::auth::AuthState;
use super::parser::set_bearer;
use super::types::AuthContext;

/// Refreshes the request's bearer token and returns the new one on the response.
///
/// Install with `axum::middleware::from_fn_with_state(auth_state, refresh_token)`.
///
/// # Errors
///
/// - 400 if no token is present
/// - 401 if the token is malformed, forged, past its refresh window or
///   already revoked
/// - 503 if the blacklist cannot be written
pub async fn refresh_token(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();
    let token = state.parser.parse(&parts)?;
    let issued = state.service.refresh(&token).await?;

    parts.extensions.insert(AuthContext::new(issued.claims));

    let mut response = next.run(Request::from_parts(parts, body)).await;
    set_bearer(response.headers_mut(), &issued.token)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::middleware::BearerAuth;
    use crate::storage::BlacklistStorage;
    use crate::storage::mock::{MockBlacklist, UnavailableBlacklist};
    use crate::token::jwt::{JwtCodec, KeyMaterial, SigningAlgorithm, TokenCodec};
    use crate::token::service::{TokenConfig, TokenService};
    use axum::{
        Router,
        body::Body,
        http::{StatusCode, header::AUTHORIZATION},
        middleware,
        routing::get,
    };
    use serde_json::Map;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> Arc<JwtCodec> {
        Arc::new(JwtCodec::new(
            KeyMaterial::from_secret(SigningAlgorithm::HS256, SECRET).unwrap(),
        ))
    }

    fn auth_state(blacklist: Arc<dyn BlacklistStorage>) -> AuthState {
        AuthState::new(Arc::new(TokenService::new(
            codec(),
            blacklist,
            TokenConfig::default(),
        )))
    }

    async fn whoami(BearerAuth(auth): BearerAuth) -> String {
        auth.token_id().to_string()
    }

    fn app(state: AuthState) -> Router {
        Router::new()
            .route("/", get(whoami))
            .route_layer(middleware::from_fn_with_state(state.clone(), refresh_token))
            .with_state(state)
    }

    fn request(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn response_token(response: &Response) -> String {
        response
            .headers()
            .get(AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .strip_prefix("Bearer ")
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_refresh_sets_new_token_on_response() {
        let state = auth_state(Arc::new(MockBlacklist::new()));
        let issued = state.service.issue("alice", Map::new()).unwrap();

        let response = app(state).oneshot(request(Some(&issued.token))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let new_token = response_token(&response);
        assert_ne!(new_token, issued.token);

        let claims = codec().decode(&new_token).unwrap();
        assert_eq!(claims.subject(), Some("alice"));

        // The handler saw the refreshed claims.
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(claims.token_id().unwrap().as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn test_refresh_missing_token_is_bad_request() {
        let state = auth_state(Arc::new(MockBlacklist::new()));
        let response = app(state).oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_refresh_invalid_token_is_unauthorized() {
        let state = auth_state(Arc::new(MockBlacklist::new()));
        let response = app(state).oneshot(request(Some("foo"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_replay_is_unauthorized() {
        let state = auth_state(Arc::new(MockBlacklist::new()));
        let issued = state.service.issue("alice", Map::new()).unwrap();

        let first = app(state.clone())
            .oneshot(request(Some(&issued.token)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let replay = app(state.clone())
            .oneshot(request(Some(&issued.token)))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

        let next = app(state)
            .oneshot(request(Some(&response_token(&first))))
            .await
            .unwrap();
        assert_eq!(next.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_store_down_is_unavailable() {
        let state = auth_state(Arc::new(UnavailableBlacklist));
        let issued = state.service.issue("alice", Map::new()).unwrap();

        let response = app(state).oneshot(request(Some(&issued.token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
