//! Token service facade.
//!
//! [`TokenService`] ties the codec, validator, blacklist and refresh
//! coordinator together behind one type that request handlers hold:
//!
//! - Issuing tokens for an already authenticated principal
//! - Authenticating presented tokens (verify, validate, blacklist check)
//! - Single-use refresh
//! - Logout (revocation)
//!
//! # Usage
//!
//! ```ignore
//! use tokengate_auth::token::{TokenConfig, TokenService};
//!
//! let service = TokenService::new(codec, blacklist, TokenConfig::default());
//! let issued = service.issue("alice", Map::new())?;
//! let claims = service.authenticate(&issued.token).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{BlacklistStorage, bounded};
use crate::token::claims::{ClaimSet, EXPIRES_AT, MANDATORY_CLAIMS, NOT_BEFORE, TOKEN_ID};
use crate::token::jwt::{Jwks, TokenCodec};
use crate::token::refresh::{IssuedToken, RefreshCoordinator, blacklist_expiry};
use crate::token::validator::TokenValidator;

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Issuer written into minted tokens as `iss`.
    pub issuer: Option<String>,

    /// Lifetime of minted tokens.
    pub token_ttl: Duration,

    /// How long past `exp` a token may still be refreshed.
    pub refresh_grace: Duration,

    /// Clock skew tolerance for `exp` and `nbf` comparisons.
    pub leeway: Duration,

    /// Claims required in addition to `sub`, `iat`, `exp` and `jti`.
    pub required_claims: Vec<String>,

    /// Deadline for each blacklist store call.
    pub store_timeout: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            token_ttl: Duration::from_secs(3600),
            refresh_grace: Duration::from_secs(14 * 24 * 3600),
            leeway: Duration::ZERO,
            required_claims: Vec::new(),
            store_timeout: Duration::from_secs(2),
        }
    }
}

impl TokenConfig {
    /// Sets the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the token lifetime.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Sets the refresh grace window.
    #[must_use]
    pub fn with_refresh_grace(mut self, grace: Duration) -> Self {
        self.refresh_grace = grace;
        self
    }

    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Sets the additional required claims.
    #[must_use]
    pub fn with_required_claims(mut self, claims: Vec<String>) -> Self {
        self.required_claims = claims;
        self
    }

    /// Sets the blacklist store call deadline.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub(crate) fn ttl_seconds(&self) -> i64 {
        whole_seconds(self.token_ttl)
    }

    pub(crate) fn refresh_grace_seconds(&self) -> i64 {
        whole_seconds(self.refresh_grace)
    }

    /// Builds the validator these settings describe.
    #[must_use]
    pub fn validator(&self) -> TokenValidator {
        TokenValidator::new(whole_seconds(self.leeway), self.required_claims.clone())
    }
}

fn whole_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Issues, authenticates, refreshes and revokes bearer tokens.
pub struct TokenService {
    codec: Arc<dyn TokenCodec>,
    blacklist: Arc<dyn BlacklistStorage>,
    validator: TokenValidator,
    refresher: RefreshCoordinator,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    ///
    /// # Arguments
    ///
    /// * `codec` - Signs and verifies tokens
    /// * `blacklist` - Store for revoked token identifiers
    /// * `config` - Service configuration
    #[must_use]
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        blacklist: Arc<dyn BlacklistStorage>,
        config: TokenConfig,
    ) -> Self {
        let refresher = RefreshCoordinator::new(codec.clone(), blacklist.clone(), &config);
        Self {
            validator: config.validator(),
            codec,
            blacklist,
            refresher,
            config,
        }
    }

    /// Returns the service configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Mints a token for `subject` with the configured lifetime.
    ///
    /// Custom claims named `sub`, `iat`, `nbf`, `exp` or `jti` are ignored;
    /// those are always set by the service.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if a configured required claim is not
    /// among `custom_claims`.
    pub fn issue(
        &self,
        subject: &str,
        custom_claims: Map<String, Value>,
    ) -> AuthResult<IssuedToken> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let custom = custom_claims
            .into_iter()
            .filter(|(name, _)| !MANDATORY_CLAIMS.contains(&name.as_str()) && name != NOT_BEFORE);

        let mut builder = ClaimSet::builder(subject)
            .claims(custom)
            .issued_at(now)
            .expires_in_seconds(self.config.ttl_seconds());
        if let Some(issuer) = &self.config.issuer {
            builder = builder.issuer(issuer.clone());
        }
        let claims = builder.build();

        let token = self.codec.encode(&claims)?;
        tracing::debug!(sub = subject, jti = ?claims.token_id(), "Token issued");

        Ok(IssuedToken { token, claims })
    }

    /// Signs a caller-built claim set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if mandatory or required claims are missing.
    pub fn mint(&self, claims: &ClaimSet) -> AuthResult<String> {
        self.codec.encode(claims)
    }

    /// Verifies a presented token and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] / [`AuthError::SignatureInvalid`]
    /// - [`AuthError::TokenExpired`] / [`AuthError::TokenNotYetValid`] /
    ///   [`AuthError::MissingClaim`]
    /// - [`AuthError::TokenAlreadyRevoked`] if the `jti` is blacklisted
    /// - [`AuthError::StoreUnavailable`] if the blacklist cannot answer
    pub async fn authenticate(&self, token: &str) -> AuthResult<ClaimSet> {
        self.authenticate_at(token, OffsetDateTime::now_utc().unix_timestamp())
            .await
    }

    /// Verifies a presented token as of `now` (Unix seconds).
    ///
    /// `now` drives the claim checks only. Blacklist entries are judged live
    /// or lapsed by the store against its own clock.
    ///
    /// # Errors
    ///
    /// Same as [`authenticate`](Self::authenticate).
    pub async fn authenticate_at(&self, token: &str, now: i64) -> AuthResult<ClaimSet> {
        let claims = self.codec.decode(token).inspect_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
        })?;
        self.validator.validate(&claims, now).inspect_err(|e| {
            tracing::debug!(jti = ?claims.token_id(), error = %e, "Token rejected");
        })?;

        let jti = claims
            .token_id()
            .ok_or_else(|| AuthError::missing_claim(TOKEN_ID))?;
        let revoked = bounded(
            self.config.store_timeout,
            "is_revoked",
            self.blacklist.is_revoked(jti),
        )
        .await
        .inspect_err(|e| tracing::warn!(jti, error = %e, "Blacklist lookup failed"))?;

        if revoked {
            tracing::debug!(jti, "Token rejected: revoked");
            return Err(AuthError::TokenAlreadyRevoked);
        }

        Ok(claims)
    }

    /// Exchanges `token` for a new one and revokes it.
    ///
    /// # Errors
    ///
    /// See [`RefreshCoordinator::refresh`].
    pub async fn refresh(&self, token: &str) -> AuthResult<IssuedToken> {
        self.refresher.refresh(token).await
    }

    /// Exchanges `token` for a new one as of `now` (Unix seconds).
    ///
    /// See [`RefreshCoordinator::refresh_at`] for how `now` relates to the
    /// blacklist.
    ///
    /// # Errors
    ///
    /// See [`RefreshCoordinator::refresh`].
    pub async fn refresh_at(&self, token: &str, now: i64) -> AuthResult<IssuedToken> {
        self.refresher.refresh_at(token, now).await
    }

    /// Revokes `token` (logout).
    ///
    /// Tokens that are still refreshable can be invalidated. Revoking an
    /// already revoked token succeeds.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] / [`AuthError::SignatureInvalid`]
    /// - [`AuthError::TokenExpired`] if the token is past its refresh window
    /// - [`AuthError::StoreUnavailable`] if the blacklist cannot be written
    pub async fn invalidate(&self, token: &str) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let grace = self.config.refresh_grace_seconds();

        let claims = self.codec.decode(token)?;
        self.validator.validate_for_refresh(&claims, now, grace)?;

        let jti = claims
            .token_id()
            .ok_or_else(|| AuthError::missing_claim(TOKEN_ID))?;
        let exp = claims
            .expires_at()
            .ok_or_else(|| AuthError::missing_claim(EXPIRES_AT))?;

        bounded(
            self.config.store_timeout,
            "revoke",
            self.blacklist
                .revoke(jti, blacklist_expiry(exp, grace, self.validator.leeway())),
        )
        .await
        .inspect_err(|e| tracing::warn!(jti, error = %e, "Logout failed"))?;

        tracing::info!(sub = ?claims.subject(), jti, "Token invalidated");
        Ok(())
    }

    /// Checks whether a token identifier is revoked.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] if the blacklist cannot answer.
    pub async fn is_revoked(&self, jti: &str) -> AuthResult<bool> {
        bounded(
            self.config.store_timeout,
            "is_revoked",
            self.blacklist.is_revoked(jti),
        )
        .await
    }

    /// Removes expired blacklist entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] if the blacklist cannot be written.
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        let purged = bounded(
            self.config.store_timeout,
            "purge_expired",
            self.blacklist.purge_expired(),
        )
        .await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired blacklist entries");
        }
        Ok(purged)
    }

    /// Returns the public verification keys.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        self.codec.jwks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::{MockBlacklist, UnavailableBlacklist};
    use crate::token::jwt::{JwtCodec, KeyMaterial, SigningAlgorithm};
    use serde_json::json;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> Arc<dyn TokenCodec> {
        Arc::new(JwtCodec::new(
            KeyMaterial::from_secret(SigningAlgorithm::HS256, SECRET).unwrap(),
        ))
    }

    fn service_with(blacklist: Arc<dyn BlacklistStorage>) -> TokenService {
        let config = TokenConfig::default()
            .with_issuer("https://auth.example.com")
            .with_store_timeout(Duration::from_millis(50));
        TokenService::new(codec(), blacklist, config)
    }

    fn service() -> TokenService {
        service_with(Arc::new(MockBlacklist::new()))
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    #[tokio::test]
    async fn test_issue_and_authenticate() {
        let service = service();
        let mut custom = Map::new();
        custom.insert("role".to_string(), json!("admin"));

        let issued = service.issue("alice", custom).unwrap();
        let claims = service.authenticate(&issued.token).await.unwrap();

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.subject(), Some("alice"));
        assert_eq!(claims.issuer(), Some("https://auth.example.com"));
        assert_eq!(claims.get("role"), Some(&json!("admin")));
        assert_eq!(
            claims.expires_at(),
            claims.issued_at().map(|iat| iat + 3600)
        );
    }

    #[tokio::test]
    async fn test_issue_ignores_reserved_custom_claims() {
        let service = service();
        let mut custom = Map::new();
        custom.insert("sub".to_string(), json!("mallory"));
        custom.insert("exp".to_string(), json!(i64::MAX));
        custom.insert("jti".to_string(), json!("fixed"));

        let issued = service.issue("alice", custom).unwrap();

        assert_eq!(issued.claims.subject(), Some("alice"));
        assert_ne!(issued.claims.token_id(), Some("fixed"));
        assert!(issued.claims.expires_at().unwrap() < i64::MAX);
    }

    #[tokio::test]
    async fn test_issue_requires_configured_claims() {
        let codec = Arc::new(
            JwtCodec::new(KeyMaterial::from_secret(SigningAlgorithm::HS256, SECRET).unwrap())
                .with_required_claims(vec!["tenant".to_string()]),
        );
        let config = TokenConfig::default().with_required_claims(vec!["tenant".to_string()]);
        let service = TokenService::new(codec, Arc::new(MockBlacklist::new()), config);

        let err = service.issue("alice", Map::new()).unwrap_err();
        assert!(matches!(err, AuthError::Encoding { .. }));

        let mut custom = Map::new();
        custom.insert("tenant".to_string(), json!("acme"));
        let issued = service.issue("alice", custom).unwrap();
        assert!(service.authenticate(&issued.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_mint_then_authenticate_expired() {
        let service = service();
        let claims = ClaimSet::builder("alice")
            .issued_at(now() - 7200)
            .expires_at(now() - 3600)
            .build();

        let token = service.mint(&claims).unwrap();
        let err = service.authenticate(&token).await.unwrap_err();

        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let service = service();

        let issued = service.issue("alice", Map::new()).unwrap();
        let old_jti = issued.claims.token_id().unwrap().to_string();
        assert!(service.authenticate(&issued.token).await.is_ok());

        let refreshed = service.refresh(&issued.token).await.unwrap();
        assert!(service.is_revoked(&old_jti).await.unwrap());
        assert_eq!(refreshed.claims.subject(), Some("alice"));
        assert_ne!(refreshed.claims.token_id(), Some(old_jti.as_str()));
        assert!(refreshed.claims.expires_at() >= issued.claims.expires_at());

        let err = service.refresh(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));

        let err = service.authenticate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));

        assert!(service.authenticate(&refreshed.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_fails_closed() {
        let service = service_with(Arc::new(UnavailableBlacklist));
        let issued = service.issue("alice", Map::new()).unwrap();

        let err = service.authenticate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let service = service();
        let issued = service.issue("alice", Map::new()).unwrap();

        service.invalidate(&issued.token).await.unwrap();
        service.invalidate(&issued.token).await.unwrap();

        let err = service.authenticate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
        let err = service.refresh(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
    }

    #[tokio::test]
    async fn test_logout_holds_while_leeway_exceeds_grace() {
        let config = TokenConfig::default()
            .with_refresh_grace(Duration::from_secs(10))
            .with_leeway(Duration::from_secs(60))
            .with_store_timeout(Duration::from_millis(50));
        let service = TokenService::new(codec(), Arc::new(MockBlacklist::new()), config);
        let now = now();
        let claims = ClaimSet::builder("alice")
            .issued_at(now - 3600)
            .expires_at(now - 15)
            .build();
        let token = service.mint(&claims).unwrap();

        // Expired, but inside the leeway.
        assert!(service.authenticate(&token).await.is_ok());

        service.invalidate(&token).await.unwrap();

        let err = service.authenticate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
        let err = service.refresh(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
    }

    #[tokio::test]
    async fn test_authenticate_at_uses_store_clock_for_revocation() {
        let blacklist = Arc::new(MockBlacklist::new());
        let service = service_with(blacklist.clone());
        let issued = service.issue("alice", Map::new()).unwrap();
        let jti = issued.claims.token_id().unwrap();
        let issued_at = issued.claims.issued_at().unwrap();

        // An entry that lapsed by the wall clock is not revoked, whatever the
        // caller's notion of now.
        blacklist
            .revoke(jti, OffsetDateTime::now_utc() - time::Duration::seconds(1))
            .await
            .unwrap();
        assert!(service.authenticate_at(&issued.token, issued_at).await.is_ok());

        blacklist
            .revoke(jti, OffsetDateTime::now_utc() + time::Duration::minutes(5))
            .await
            .unwrap();
        let err = service
            .authenticate_at(&issued.token, issued_at)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
    }

    #[tokio::test]
    async fn test_unbounded_ttl_does_not_overflow() {
        let config = TokenConfig::default()
            .with_token_ttl(Duration::from_secs(u64::MAX))
            .with_store_timeout(Duration::from_millis(50));
        let service = TokenService::new(codec(), Arc::new(MockBlacklist::new()), config);

        let issued = service.issue("alice", Map::new()).unwrap();
        assert_eq!(issued.claims.expires_at(), Some(i64::MAX));
        assert!(service.authenticate(&issued.token).await.is_ok());

        let refreshed = service.refresh(&issued.token).await.unwrap();
        assert_eq!(refreshed.claims.expires_at(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_invalidate_rejects_forged_token() {
        let service = service();
        let err = service.invalidate("a.b.c").await.unwrap_err();
        assert!(err.is_token_error());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let blacklist = Arc::new(MockBlacklist::new());
        let service = service_with(blacklist.clone());
        blacklist
            .revoke("stale", OffsetDateTime::now_utc() - time::Duration::minutes(1))
            .await
            .unwrap();
        blacklist
            .revoke("live", OffsetDateTime::now_utc() + time::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert!(service.is_revoked("live").await.unwrap());
        assert!(!service.is_revoked("stale").await.unwrap());
    }

    #[test]
    fn test_jwks_empty_for_shared_secret() {
        assert!(service().jwks().keys.is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config = TokenConfig::default();
        assert_eq!(config.ttl_seconds(), 3600);
        assert_eq!(config.refresh_grace_seconds(), 14 * 24 * 3600);
        assert_eq!(config.store_timeout, Duration::from_secs(2));
        assert_eq!(config.validator().leeway(), 0);
    }
}
