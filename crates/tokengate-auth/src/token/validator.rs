//! Temporal and structural checks on verified claim sets.
//!
//! The validator is a pure function of the claims and the current time. A
//! token is acceptable when `nbf <= now < exp`, each bound widened by the
//! configured clock-skew leeway.

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::claims::{ClaimSet, EXPIRES_AT, NOT_BEFORE};

/// Applies expiry, not-before and required-claim checks.
#[derive(Debug, Clone, Default)]
pub struct TokenValidator {
    leeway: i64,
    required_claims: Vec<String>,
}

impl TokenValidator {
    /// Creates a validator.
    ///
    /// # Arguments
    ///
    /// * `leeway_seconds` - Clock skew tolerance applied to `exp` and `nbf`
    /// * `required_claims` - Claims required in addition to `sub`, `iat`, `exp`, `jti`
    #[must_use]
    pub fn new(leeway_seconds: i64, required_claims: Vec<String>) -> Self {
        Self {
            leeway: leeway_seconds.max(0),
            required_claims,
        }
    }

    /// Returns the clock skew tolerance in seconds.
    #[must_use]
    pub fn leeway(&self) -> i64 {
        self.leeway
    }

    /// Checks a claim set for normal use at `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingClaim`] if a mandatory or required claim is absent
    ///   or mistyped
    /// - [`AuthError::TokenExpired`] if `exp <= now - leeway`
    /// - [`AuthError::TokenNotYetValid`] if `nbf > now + leeway`
    pub fn validate(&self, claims: &ClaimSet, now: i64) -> AuthResult<()> {
        self.check(claims, now, 0)
    }

    /// Checks a claim set presented for refresh at `now`.
    ///
    /// Identical to [`validate`](Self::validate) except that expiry is
    /// extended by `grace_seconds`.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn validate_for_refresh(
        &self,
        claims: &ClaimSet,
        now: i64,
        grace_seconds: i64,
    ) -> AuthResult<()> {
        self.check(claims, now, grace_seconds.max(0))
    }

    fn check(&self, claims: &ClaimSet, now: i64, grace: i64) -> AuthResult<()> {
        if let Some(claim) = claims.first_missing_mandatory() {
            return Err(AuthError::missing_claim(claim));
        }
        if let Some(claim) = self
            .required_claims
            .iter()
            .find(|name| !claims.contains(name))
        {
            return Err(AuthError::missing_claim(claim.clone()));
        }

        let exp = claims
            .expires_at()
            .ok_or_else(|| AuthError::missing_claim(EXPIRES_AT))?;
        if exp.saturating_add(self.leeway).saturating_add(grace) <= now {
            return Err(AuthError::TokenExpired);
        }

        if let Some(nbf) = claims.not_before() {
            if nbf > now.saturating_add(self.leeway) {
                return Err(AuthError::TokenNotYetValid);
            }
        } else if claims.contains(NOT_BEFORE) {
            return Err(AuthError::missing_claim(NOT_BEFORE));
        }

        Ok(())
    }
}
