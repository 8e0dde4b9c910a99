//! Bearer token lookup in HTTP requests.
//!
//! A [`TokenParser`] runs an ordered chain of [`TokenExtractor`]s against the
//! request head and returns the first token found. The default chain checks
//! the `Authorization` header and then the `token` query parameter.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, HeaderName};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use crate::AuthResult;
use crate::config::{ConfigError, ParserConfig};
use crate::error::AuthError;

/// One place a bearer token may be carried.
pub trait TokenExtractor: Send + Sync {
    /// Returns the token if this source carries one.
    fn extract(&self, parts: &Parts) -> Option<String>;
}

/// Reads `<scheme> <token>` from a header.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    header: HeaderName,
    prefix: String,
}

impl AuthHeaders {
    /// Creates an extractor for `header` with the given scheme.
    #[must_use]
    pub fn new(header: HeaderName, prefix: impl Into<String>) -> Self {
        Self {
            header,
            prefix: prefix.into(),
        }
    }
}

impl Default for AuthHeaders {
    fn default() -> Self {
        Self::new(AUTHORIZATION, "bearer")
    }
}

impl TokenExtractor for AuthHeaders {
    fn extract(&self, parts: &Parts) -> Option<String> {
        let value = parts.headers.get(&self.header)?.to_str().ok()?.trim();
        let (scheme, token) = value.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// Reads the token from a query parameter.
#[derive(Debug, Clone)]
pub struct QueryString {
    key: String,
}

impl QueryString {
    /// Creates an extractor for the query parameter `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for QueryString {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenExtractor for QueryString {
    fn extract(&self, parts: &Parts) -> Option<String> {
        parts
            .uri
            .query()?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == self.key)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    }
}

/// Ordered chain of token extractors.
#[derive(Clone)]
pub struct TokenParser {
    extractors: Arc<[Arc<dyn TokenExtractor>]>,
}

impl TokenParser {
    /// Creates a parser that tries `extractors` in order.
    #[must_use]
    pub fn new(extractors: Vec<Arc<dyn TokenExtractor>>) -> Self {
        Self {
            extractors: extractors.into(),
        }
    }

    /// Builds the chain described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the header name is not a valid
    /// HTTP header name.
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        let header = HeaderName::try_from(config.header.trim()).map_err(|_| {
            ConfigError::InvalidValue(format!("Invalid header name: '{}'", config.header))
        })?;

        let mut extractors: Vec<Arc<dyn TokenExtractor>> =
            vec![Arc::new(AuthHeaders::new(header, config.prefix.trim()))];
        if let Some(param) = &config.query_param {
            extractors.push(Arc::new(QueryString::new(param.trim())));
        }

        Ok(Self::new(extractors))
    }

    /// Returns the first token any extractor finds.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenNotProvided`] if no extractor finds one.
    pub fn parse(&self, parts: &Parts) -> AuthResult<String> {
        self.extractors
            .iter()
            .find_map(|extractor| extractor.extract(parts))
            .ok_or(AuthError::TokenNotProvided)
    }

    /// Returns `true` if the request carries a token.
    #[must_use]
    pub fn has_token(&self, parts: &Parts) -> bool {
        self.parse(parts).is_ok()
    }
}

impl Default for TokenParser {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(AuthHeaders::default()),
            Arc::new(QueryString::default()),
        ])
    }
}

/// Sets `Authorization: Bearer <token>`.
///
/// # Errors
///
/// Returns [`AuthError::Encoding`] if the token is not a valid header value.
pub fn set_bearer(headers: &mut HeaderMap, token: &str) -> AuthResult<()> {
    let value = HeaderValue::try_from(format!("Bearer {token}"))
        .map_err(|e| AuthError::encoding(format!("token is not a valid header value: {e}")))?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
