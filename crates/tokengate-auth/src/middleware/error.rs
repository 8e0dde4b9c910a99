//! Error response handling for the token middleware.
//!
//! This module implements `IntoResponse` for `AuthError`. Bodies follow the
//! RFC 6750 error vocabulary:
//!
//! ```json
//! {"error": "invalid_token", "error_description": "Token expired"}
//! ```

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

const REALM: &str = "tokengate";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error_code = self.error_code();

        // Server-side failures are logged in full; clients get the category only.
        let description = if self.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Token operation failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Token store temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let mut headers = HeaderMap::new();
        match &self {
            AuthError::TokenNotProvided => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer realm=\"tokengate\""),
                );
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                let www_auth = build_www_authenticate_header(error_code, &description);
                if let Ok(value) = HeaderValue::from_str(&www_auth) {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
            }
            _ => {}
        }

        let body = json!({
            "error": error_code,
            "error_description": description,
        });

        (status, headers, Json(body)).into_response()
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="tokengate", error="invalid_token", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('\"', "\\\"");
    format!("Bearer realm=\"{REALM}\", error=\"{error}\", error_description=\"{escaped_desc}\"")
}
