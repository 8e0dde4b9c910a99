//! Single-use token refresh.
//!
//! A refresh exchanges a token that is still acceptable (possibly expired but
//! inside the refresh grace window) for a newly minted one and revokes the
//! original. The sequence is:
//!
//! 1. Decode and verify the signature
//! 2. Validate temporal claims, allowing the grace window past `exp`
//! 3. Atomically revoke the old `jti` unless it is already revoked
//! 4. Mint the renewed claim set
//! 5. Encode and return the new token
//!
//! Revocation happens before minting. If encoding fails afterwards the old
//! token stays revoked and the caller has to authenticate again. Two
//! concurrent refreshes of the same token are serialized by the blacklist's
//! compare-and-set; exactly one proceeds to step 4.

use std::sync::Arc;
use std::time::Duration;

use time::{OffsetDateTime, PrimitiveDateTime};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{BlacklistStorage, bounded};
use crate::token::claims::{ClaimSet, EXPIRES_AT, TOKEN_ID};
use crate::token::jwt::TokenCodec;
use crate::token::service::TokenConfig;
use crate::token::validator::TokenValidator;

/// A freshly minted token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact serialized token.
    pub token: String,
    /// Claims encoded in `token`.
    pub claims: ClaimSet,
}

impl IssuedToken {
    /// Seconds from `now` until the token expires, zero if already expired.
    #[must_use]
    pub fn expires_in(&self, now: i64) -> u64 {
        self.claims
            .expires_at()
            .map(|exp| exp.saturating_sub(now).max(0) as u64)
            .unwrap_or(0)
    }
}

/// Coordinates the refresh state machine.
pub struct RefreshCoordinator {
    codec: Arc<dyn TokenCodec>,
    blacklist: Arc<dyn BlacklistStorage>,
    validator: TokenValidator,
    ttl_seconds: i64,
    grace_seconds: i64,
    store_timeout: Duration,
}

impl RefreshCoordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    ///
    /// * `codec` - Codec used to verify the presented token and sign the new one
    /// * `blacklist` - Store holding revoked token identifiers
    /// * `config` - Lifetimes, leeway, required claims and store timeout
    #[must_use]
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        blacklist: Arc<dyn BlacklistStorage>,
        config: &TokenConfig,
    ) -> Self {
        Self {
            codec,
            blacklist,
            validator: config.validator(),
            ttl_seconds: config.ttl_seconds(),
            grace_seconds: config.refresh_grace_seconds(),
            store_timeout: config.store_timeout,
        }
    }

    /// Refreshes `token` at the current time.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] / [`AuthError::SignatureInvalid`] if the
    ///   token does not verify
    /// - [`AuthError::TokenExpired`] if it expired more than the grace window ago
    /// - [`AuthError::TokenAlreadyRevoked`] on replay or when another refresh
    ///   of the same token won
    /// - [`AuthError::StoreUnavailable`] if the blacklist failed or timed out
    /// - [`AuthError::Encoding`] if the renewed claims could not be signed; the
    ///   old token is already revoked at that point
    pub async fn refresh(&self, token: &str) -> AuthResult<IssuedToken> {
        self.refresh_at(token, OffsetDateTime::now_utc().unix_timestamp())
            .await
    }

    /// Refreshes `token` as of `now` (Unix seconds).
    ///
    /// `now` drives the claim checks and the renewed lifetime only. Blacklist
    /// entries are judged live or lapsed by the store against its own clock.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refresh_at(&self, token: &str, now: i64) -> AuthResult<IssuedToken> {
        let claims = self.codec.decode(token).inspect_err(|e| {
            tracing::debug!(error = %e, "Refresh rejected: token did not verify");
        })?;

        self.validator
            .validate_for_refresh(&claims, now, self.grace_seconds)
            .inspect_err(|e| {
                tracing::debug!(jti = ?claims.token_id(), error = %e, "Refresh rejected");
            })?;

        let jti = claims
            .token_id()
            .ok_or_else(|| AuthError::missing_claim(TOKEN_ID))?;
        let exp = claims
            .expires_at()
            .ok_or_else(|| AuthError::missing_claim(EXPIRES_AT))?;

        let revoked_until =
            blacklist_expiry(exp, self.grace_seconds, self.validator.leeway());
        let won = bounded(
            self.store_timeout,
            "revoke_if_absent",
            self.blacklist.revoke_if_absent(jti, revoked_until),
        )
        .await
        .inspect_err(|e| tracing::warn!(jti, error = %e, "Refresh aborted: blacklist failure"))?;

        if !won {
            tracing::debug!(jti, "Refresh rejected: token already revoked");
            return Err(AuthError::TokenAlreadyRevoked);
        }

        let renewed = claims.renewed(now, self.ttl_seconds);
        let token = self.codec.encode(&renewed).inspect_err(|e| {
            tracing::error!(jti, error = %e, "Failed to sign refreshed token; old token stays revoked");
        })?;

        tracing::info!(
            sub = ?renewed.subject(),
            old_jti = jti,
            new_jti = ?renewed.token_id(),
            "Token refreshed"
        );

        Ok(IssuedToken {
            token,
            claims: renewed,
        })
    }
}

/// Point until which a revoked token must stay on the blacklist.
///
/// The validator accepts a token for refresh until `exp + grace + leeway`,
/// so its entry has to outlive that window.
pub(crate) fn blacklist_expiry(
    exp: i64,
    grace_seconds: i64,
    leeway_seconds: i64,
) -> OffsetDateTime {
    let until = exp
        .saturating_add(grace_seconds.max(0))
        .saturating_add(leeway_seconds.max(0));
    OffsetDateTime::from_unix_timestamp(until)
        .unwrap_or_else(|_| PrimitiveDateTime::MAX.assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::{MockBlacklist, StallingBlacklist, UnavailableBlacklist};
    use crate::token::jwt::{JwtCodec, KeyMaterial, SigningAlgorithm};

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    fn codec() -> Arc<dyn TokenCodec> {
        Arc::new(JwtCodec::new(
            KeyMaterial::from_secret(SigningAlgorithm::HS256, SECRET).unwrap(),
        ))
    }

    fn config() -> TokenConfig {
        TokenConfig::default()
            .with_token_ttl(Duration::from_secs(3600))
            .with_refresh_grace(Duration::from_secs(600))
            .with_store_timeout(Duration::from_millis(50))
    }

    fn coordinator(blacklist: Arc<dyn BlacklistStorage>) -> RefreshCoordinator {
        RefreshCoordinator::new(codec(), blacklist, &config())
    }

    fn token_expiring_at(exp: i64) -> (String, ClaimSet) {
        let claims = ClaimSet::builder("alice")
            .issued_at(exp - 3600)
            .expires_at(exp)
            .claim("role", "admin")
            .build();
        (codec().encode(&claims).unwrap(), claims)
    }

    /// Verifies with a real codec but refuses to sign.
    struct SignFailingCodec(Arc<dyn TokenCodec>);

    impl TokenCodec for SignFailingCodec {
        fn encode(&self, _claims: &ClaimSet) -> AuthResult<String> {
            Err(AuthError::encoding("signer offline"))
        }

        fn decode(&self, token: &str) -> AuthResult<ClaimSet> {
            self.0.decode(token)
        }
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let now = now();
        let blacklist = Arc::new(MockBlacklist::new());
        let coordinator = coordinator(blacklist.clone());
        let (token, original) = token_expiring_at(now + 60);

        let issued = coordinator.refresh_at(&token, now).await.unwrap();

        assert_eq!(issued.claims.subject(), Some("alice"));
        assert_eq!(issued.claims.get("role"), original.get("role"));
        assert_ne!(issued.claims.token_id(), original.token_id());
        assert_eq!(issued.claims.issued_at(), Some(now));
        assert_eq!(issued.claims.expires_at(), Some(now + 3600));
        assert_eq!(issued.expires_in(now), 3600);

        let decoded = codec().decode(&issued.token).unwrap();
        assert_eq!(decoded, issued.claims);

        let jti = original.token_id().unwrap();
        assert!(blacklist.is_revoked(jti).await.unwrap());
        assert_eq!(
            blacklist.expiry_of(jti).unwrap().unix_timestamp(),
            original.expires_at().unwrap() + 600
        );
    }

    #[tokio::test]
    async fn test_refresh_replay_rejected() {
        let now = now();
        let coordinator = coordinator(Arc::new(MockBlacklist::new()));
        let (token, _) = token_expiring_at(now + 60);

        coordinator.refresh_at(&token, now).await.unwrap();
        let err = coordinator.refresh_at(&token, now).await.unwrap_err();

        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
    }

    #[tokio::test]
    async fn test_refresh_inside_grace_window() {
        let now = now();
        let coordinator = coordinator(Arc::new(MockBlacklist::new()));
        let (token, _) = token_expiring_at(now - 300);

        let issued = coordinator.refresh_at(&token, now).await.unwrap();
        assert_eq!(issued.claims.expires_at(), Some(now + 3600));
    }

    #[tokio::test]
    async fn test_refresh_past_grace_window_leaves_store_untouched() {
        let now = now();
        let blacklist = Arc::new(MockBlacklist::new());
        let coordinator = coordinator(blacklist.clone());
        let (token, _) = token_expiring_at(now - 600);

        let err = coordinator.refresh_at(&token, now).await.unwrap_err();

        assert!(matches!(err, AuthError::TokenExpired));
        assert_eq!(blacklist.writes(), 0);
    }

    #[tokio::test]
    async fn test_refresh_bad_signature_leaves_store_untouched() {
        let now = now();
        let blacklist = Arc::new(MockBlacklist::new());
        let coordinator = coordinator(blacklist.clone());
        let other = JwtCodec::new(
            KeyMaterial::from_secret(SigningAlgorithm::HS256, b"another-secret-another-secret-xx")
                .unwrap(),
        );
        let forged = other
            .encode(&ClaimSet::builder("mallory").build())
            .unwrap();

        let err = coordinator.refresh_at(&forged, now).await.unwrap_err();

        assert!(matches!(err, AuthError::SignatureInvalid));
        assert_eq!(blacklist.writes(), 0);
    }

    #[tokio::test]
    async fn test_refresh_fails_closed_when_store_unavailable() {
        let now = now();
        let coordinator = coordinator(Arc::new(UnavailableBlacklist));
        let (token, _) = token_expiring_at(now + 60);

        let err = coordinator.refresh_at(&token, now).await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_refresh_fails_closed_when_store_stalls() {
        let now = now();
        let coordinator = coordinator(Arc::new(StallingBlacklist));
        let (token, _) = token_expiring_at(now + 60);

        let err = coordinator.refresh_at(&token, now).await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_mint_failure_keeps_old_token_revoked() {
        let now = now();
        let blacklist = Arc::new(MockBlacklist::new());
        let coordinator = RefreshCoordinator::new(
            Arc::new(SignFailingCodec(codec())),
            blacklist.clone(),
            &config(),
        );
        let (token, original) = token_expiring_at(now + 60);

        let err = coordinator.refresh_at(&token, now).await.unwrap_err();

        assert!(matches!(err, AuthError::Encoding { .. }));
        assert!(
            blacklist
                .is_revoked(original.token_id().unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_has_single_winner() {
        let now = now();
        let coordinator = Arc::new(coordinator(Arc::new(MockBlacklist::new())));
        let (token, _) = token_expiring_at(now + 60);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = coordinator.clone();
                let token = token.clone();
                tokio::spawn(async move { coordinator.refresh_at(&token, now).await })
            })
            .collect();

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AuthError::TokenAlreadyRevoked) => losers += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(losers, 15);
    }

    #[tokio::test]
    async fn test_replay_rejected_inside_leeway_past_grace() {
        let now = now();
        let config = TokenConfig::default()
            .with_refresh_grace(Duration::from_secs(10))
            .with_leeway(Duration::from_secs(60))
            .with_store_timeout(Duration::from_millis(50));
        let blacklist = Arc::new(MockBlacklist::new());
        let coordinator = RefreshCoordinator::new(codec(), blacklist.clone(), &config);
        // Past exp + grace, still inside exp + grace + leeway.
        let (token, original) = token_expiring_at(now - 15);

        coordinator.refresh_at(&token, now).await.unwrap();
        let err = coordinator.refresh_at(&token, now).await.unwrap_err();

        assert!(matches!(err, AuthError::TokenAlreadyRevoked));
        assert_eq!(
            blacklist
                .expiry_of(original.token_id().unwrap())
                .unwrap()
                .unix_timestamp(),
            now - 15 + 10 + 60
        );
    }

    #[test]
    fn test_blacklist_expiry_saturates() {
        assert_eq!(blacklist_expiry(100, 50, 0).unix_timestamp(), 150);
        assert_eq!(blacklist_expiry(100, 50, 30).unix_timestamp(), 180);
        assert_eq!(
            blacklist_expiry(i64::MAX, 10, 10),
            PrimitiveDateTime::MAX.assume_utc()
        );
    }
}
