//! Claim sets carried inside bearer tokens.
//!
//! A [`ClaimSet`] is a flat map from claim name to JSON value. Four claims are
//! mandatory for every token the engine mints: `sub`, `iat`, `exp` and `jti`.
//! Timestamps are NumericDate values (integer seconds since the Unix epoch).
//!
//! Claim sets are immutable once built. Refreshing a token derives a new set
//! through [`ClaimSet::renewed`]; the original is never touched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Subject identifier claim.
pub const SUBJECT: &str = "sub";
/// Issued-at claim.
pub const ISSUED_AT: &str = "iat";
/// Expiration claim.
pub const EXPIRES_AT: &str = "exp";
/// Not-before claim.
pub const NOT_BEFORE: &str = "nbf";
/// Unique token identifier claim, used as the blacklist key.
pub const TOKEN_ID: &str = "jti";
/// Issuer claim.
pub const ISSUER: &str = "iss";

/// Claims every minted token must carry.
pub const MANDATORY_CLAIMS: [&str; 4] = [SUBJECT, ISSUED_AT, EXPIRES_AT, TOKEN_ID];

/// Default lifetime applied by [`ClaimSetBuilder`] when none is given.
const DEFAULT_TTL_SECONDS: i64 = 3600;

/// An immutable set of token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    /// Starts building a claim set for `subject`, issued now with a fresh `jti`.
    #[must_use]
    pub fn builder(subject: impl Into<String>) -> ClaimSetBuilder {
        ClaimSetBuilder::new(subject)
    }

    /// Wraps an arbitrary claim map without checking it.
    ///
    /// Use [`crate::token::TokenValidator`] to find out whether the result is
    /// acceptable.
    #[must_use]
    pub fn from_map(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Returns the subject (`sub`) if present and a string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.str_claim(SUBJECT)
    }

    /// Returns the issued-at time (`iat`) if present and an integer.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.numeric_claim(ISSUED_AT)
    }

    /// Returns the expiration time (`exp`) if present and an integer.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.numeric_claim(EXPIRES_AT)
    }

    /// Returns the not-before time (`nbf`) if present and an integer.
    #[must_use]
    pub fn not_before(&self) -> Option<i64> {
        self.numeric_claim(NOT_BEFORE)
    }

    /// Returns the token identifier (`jti`) if present and a string.
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.str_claim(TOKEN_ID)
    }

    /// Returns the issuer (`iss`) if present and a string.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.str_claim(ISSUER)
    }

    /// Returns the raw value of any claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns `true` if a claim with this name is present (even if `null`).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over all claims in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrows the underlying claim map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the set, returning the underlying claim map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Returns the first mandatory claim that is absent or mistyped.
    #[must_use]
    pub fn first_missing_mandatory(&self) -> Option<&'static str> {
        if self.subject().is_none_or(str::is_empty) {
            return Some(SUBJECT);
        }
        if self.issued_at().is_none() {
            return Some(ISSUED_AT);
        }
        if self.expires_at().is_none() {
            return Some(EXPIRES_AT);
        }
        if self.token_id().is_none_or(str::is_empty) {
            return Some(TOKEN_ID);
        }
        None
    }

    /// Derives the claim set for a refreshed token.
    ///
    /// Every claim is carried over except the temporal ones and the token
    /// identifier: `iat` and `nbf` become `now`, `exp` becomes `now + ttl_seconds`
    /// (saturating) and `jti` is regenerated.
    #[must_use]
    pub fn renewed(&self, now: i64, ttl_seconds: i64) -> ClaimSet {
        let mut claims = self.0.clone();
        claims.insert(ISSUED_AT.to_string(), Value::from(now));
        claims.insert(NOT_BEFORE.to_string(), Value::from(now));
        claims.insert(
            EXPIRES_AT.to_string(),
            Value::from(now.saturating_add(ttl_seconds)),
        );
        claims.insert(TOKEN_ID.to_string(), Value::from(new_token_id()));
        ClaimSet(claims)
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    fn numeric_claim(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }
}

/// Generates a fresh token identifier.
#[must_use]
pub fn new_token_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builder for [`ClaimSet`].
pub struct ClaimSetBuilder {
    claims: Map<String, Value>,
}

impl ClaimSetBuilder {
    fn new(subject: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut claims = Map::new();
        claims.insert(SUBJECT.to_string(), Value::from(subject.into()));
        claims.insert(ISSUED_AT.to_string(), Value::from(now));
        claims.insert(NOT_BEFORE.to_string(), Value::from(now));
        claims.insert(
            EXPIRES_AT.to_string(),
            Value::from(now + DEFAULT_TTL_SECONDS),
        );
        claims.insert(TOKEN_ID.to_string(), Value::from(new_token_id()));
        Self { claims }
    }

    /// Sets the issued-at and not-before times.
    #[must_use]
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.claims
            .insert(ISSUED_AT.to_string(), Value::from(timestamp));
        self.claims
            .insert(NOT_BEFORE.to_string(), Value::from(timestamp));
        self
    }

    /// Sets the not-before time.
    #[must_use]
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.claims
            .insert(NOT_BEFORE.to_string(), Value::from(timestamp));
        self
    }

    /// Sets the absolute expiration time.
    #[must_use]
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.claims
            .insert(EXPIRES_AT.to_string(), Value::from(timestamp));
        self
    }

    /// Sets the expiration time relative to the issued-at time, saturating at
    /// the largest representable timestamp.
    #[must_use]
    pub fn expires_in_seconds(self, seconds: i64) -> Self {
        let iat = self
            .claims
            .get(ISSUED_AT)
            .and_then(Value::as_i64)
            .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp());
        self.expires_at(iat.saturating_add(seconds))
    }

    /// Overrides the generated token identifier.
    #[must_use]
    pub fn token_id(mut self, jti: impl Into<String>) -> Self {
        self.claims
            .insert(TOKEN_ID.to_string(), Value::from(jti.into()));
        self
    }

    /// Sets the issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims
            .insert(ISSUER.to_string(), Value::from(issuer.into()));
        self
    }

    /// Adds a custom claim.
    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Adds several custom claims at once.
    #[must_use]
    pub fn claims(mut self, extra: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.claims.extend(extra);
        self
    }

    /// Builds the claim set.
    #[must_use]
    pub fn build(self) -> ClaimSet {
        ClaimSet(self.claims)
    }
}
