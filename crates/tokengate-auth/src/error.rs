//! Token lifecycle error types.
//!
//! Every failure the engine can report is a variant of [`AuthError`]. Callers
//! branch on the variant (or on [`AuthError::category`]) instead of matching
//! on message text.

use std::fmt;

/// Errors that can occur while issuing, validating, refreshing or revoking tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request carried no bearer token.
    #[error("Token not provided")]
    TokenNotProvided,

    /// The token is not a well-formed compact JWT.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of the structural problem.
        message: String,
    },

    /// The token signature does not verify against the configured key.
    #[error("Token signature could not be verified")]
    SignatureInvalid,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token is not valid yet (`nbf` is in the future).
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// A required claim is absent or has the wrong type.
    #[error("Missing required claim: {claim}")]
    MissingClaim {
        /// Name of the missing claim.
        claim: String,
    },

    /// The token identifier is on the blacklist (replay or lost refresh race).
    #[error("Token has already been revoked")]
    TokenAlreadyRevoked,

    /// The blacklist store could not answer in time.
    #[error("Blacklist store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the store failure.
        message: String,
    },

    /// A claim set could not be turned into a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Key material or settings are unusable.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim {
            claim: claim.into(),
        }
    }

    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller is at fault (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Request | ErrorCategory::Token)
    }

    /// Returns `true` if the server side is at fault (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if the presented token itself was rejected.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        self.category() == ErrorCategory::Token
    }

    /// Returns the error category for logging and response mapping.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TokenNotProvided => ErrorCategory::Request,
            Self::MalformedToken { .. }
            | Self::SignatureInvalid
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::MissingClaim { .. }
            | Self::TokenAlreadyRevoked => ErrorCategory::Token,
            Self::StoreUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::Encoding { .. } | Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Returns the HTTP status code this error is reported with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Request => 400,
            ErrorCategory::Token => 401,
            ErrorCategory::Infrastructure => 503,
            ErrorCategory::Configuration => 500,
        }
    }

    /// Returns the RFC 6750 error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Request => "invalid_request",
            ErrorCategory::Token => "invalid_token",
            ErrorCategory::Infrastructure => "temporarily_unavailable",
            ErrorCategory::Configuration => "server_error",
        }
    }
}

/// Categories of token errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The request itself is incomplete (no token at all).
    Request,
    /// The presented token was rejected.
    Token,
    /// A backing store failed or timed out.
    Infrastructure,
    /// Programming or deployment defect.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Token => write!(f, "token"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
