//! Token engine configuration.
//!
//! Covers token signing, lifetimes, clock skew, the blacklist store and how
//! bearer tokens are located in requests.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//! token_ttl = "1h"
//! refresh_grace = "14d"
//! leeway = "30s"
//!
//! [auth.signing]
//! algorithm = "ES384"
//! private_key_path = "keys/signing.pem"
//! public_key_path = "keys/signing.pub.pem"
//! kid = "2026-01"
//!
//! [auth.blacklist]
//! store_timeout = "2s"
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::jwt::{JwtCodec, KeyMaterial, MIN_SECRET_LEN, SigningAlgorithm};
use crate::storage::BlacklistStorage;
use crate::token::service::{TokenConfig, TokenService};

/// Root token engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer written into minted tokens (`iss`). Omitted when unset.
    pub issuer: Option<String>,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Lifetime of minted tokens.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// How long past expiry a token may still be exchanged for a new one.
    #[serde(with = "humantime_serde")]
    pub refresh_grace: Duration,

    /// Clock skew allowance applied to `exp` and `nbf`.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Claims every token must carry besides `sub`, `iat`, `exp` and `jti`.
    pub required_claims: Vec<String>,

    /// Blacklist store configuration.
    pub blacklist: BlacklistConfig,

    /// Bearer token lookup configuration.
    pub parser: ParserConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            signing: SigningConfig::default(),
            token_ttl: Duration::from_secs(3600),
            refresh_grace: Duration::from_secs(14 * 24 * 3600),
            leeway: Duration::ZERO,
            required_claims: Vec::new(),
            blacklist: BlacklistConfig::default(),
            parser: ParserConfig::default(),
        }
    }
}

/// Token signing configuration.
///
/// HMAC algorithms take `secret`; RSA and EC algorithms take a PKCS#8
/// private key and an SPKI public key from PEM files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm: HS256, HS384, HS512, RS256, RS384 or ES384.
    pub algorithm: String,

    /// Shared secret for HMAC algorithms.
    pub secret: Option<String>,

    /// Private key PEM file for asymmetric algorithms.
    pub private_key_path: Option<PathBuf>,

    /// Public key PEM file for asymmetric algorithms.
    pub public_key_path: Option<PathBuf>,

    /// Key identifier written to the `kid` header and the JWKS.
    pub kid: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            secret: None,
            private_key_path: None,
            public_key_path: None,
            kid: None,
        }
    }
}

/// Blacklist store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Deadline for a single store call. Elapsed calls fail closed.
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Interval of the background purge task.
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,

    /// In-memory store: purge expired entries after this many writes.
    pub purge_every_writes: usize,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            purge_interval: Duration::from_secs(300),
            purge_every_writes: 1024,
        }
    }
}

/// Where bearer tokens are looked up in a request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Header carrying the token.
    pub header: String,

    /// Authentication scheme preceding the token (matched case-insensitively).
    pub prefix: String,

    /// Query parameter checked when the header is absent. `None` disables it.
    pub query_param: Option<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            header: "authorization".to_string(),
            prefix: "bearer".to_string(),
            query_param: Some("token".to_string()),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// Key material could not be read or parsed.
    #[error("Unable to load signing key: {0}")]
    Key(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The signing algorithm is not supported
    /// - The HMAC secret is shorter than 32 bytes
    /// - `token_ttl` or `blacklist.store_timeout` is zero
    /// - `blacklist.purge_every_writes` is zero
    /// - The parser header, prefix or query parameter is empty
    ///
    /// Returns `ConfigError::Missing` if the key material for the chosen
    /// algorithm is not configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let algorithm = self.algorithm()?;

        if algorithm.is_hmac() {
            let secret = self
                .signing
                .secret
                .as_deref()
                .ok_or_else(|| ConfigError::Missing("auth.signing.secret".to_string()))?;
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::InvalidValue(format!(
                    "auth.signing.secret must be at least {MIN_SECRET_LEN} bytes"
                )));
            }
        } else {
            if self.signing.private_key_path.is_none() {
                return Err(ConfigError::Missing(
                    "auth.signing.private_key_path".to_string(),
                ));
            }
            if self.signing.public_key_path.is_none() {
                return Err(ConfigError::Missing(
                    "auth.signing.public_key_path".to_string(),
                ));
            }
        }

        if self.token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.token_ttl must be > 0".to_string(),
            ));
        }

        if self.blacklist.store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.blacklist.store_timeout must be > 0".to_string(),
            ));
        }

        if self.blacklist.purge_every_writes == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.blacklist.purge_every_writes must be > 0".to_string(),
            ));
        }

        if self.parser.header.trim().is_empty() || self.parser.prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.parser header and prefix cannot be empty".to_string(),
            ));
        }

        if self
            .parser
            .query_param
            .as_deref()
            .is_some_and(|param| param.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue(
                "auth.parser.query_param cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Parses the configured signing algorithm.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unsupported algorithm names.
    pub fn algorithm(&self) -> Result<SigningAlgorithm, ConfigError> {
        SigningAlgorithm::from_str(&self.signing.algorithm).map_err(|_| {
            ConfigError::InvalidValue(format!(
                "Invalid signing algorithm: '{}'. Must be HS256, HS384, HS512, RS256, RS384, or ES384",
                self.signing.algorithm
            ))
        })
    }

    /// Loads the signing key material, reading PEM files for asymmetric
    /// algorithms.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or a key file
    /// cannot be read or parsed.
    pub fn load_key_material(&self) -> Result<KeyMaterial, ConfigError> {
        self.validate()?;
        let algorithm = self.algorithm()?;

        let key = if algorithm.is_hmac() {
            let secret = self.signing.secret.as_deref().unwrap_or_default();
            KeyMaterial::from_secret(algorithm, secret.as_bytes())
                .map_err(|e| ConfigError::Key(e.to_string()))?
        } else {
            let private_pem = read_pem(self.signing.private_key_path.as_ref())?;
            let public_pem = read_pem(self.signing.public_key_path.as_ref())?;
            KeyMaterial::from_pem(algorithm, &private_pem, &public_pem)
                .map_err(|e| ConfigError::Key(e.to_string()))?
        };

        Ok(match &self.signing.kid {
            Some(kid) => key.with_kid(kid.clone()),
            None => key,
        })
    }

    /// Builds the token codec from the signing configuration.
    ///
    /// # Errors
    ///
    /// See [`load_key_material`](Self::load_key_material).
    pub fn build_codec(&self) -> Result<JwtCodec, ConfigError> {
        Ok(JwtCodec::new(self.load_key_material()?)
            .with_required_claims(self.required_claims.iter().cloned()))
    }

    /// Builds a token service over `blacklist`.
    ///
    /// # Errors
    ///
    /// See [`load_key_material`](Self::load_key_material).
    pub fn build_service(
        &self,
        blacklist: Arc<dyn BlacklistStorage>,
    ) -> Result<TokenService, ConfigError> {
        let codec = self.build_codec()?;
        Ok(TokenService::new(
            Arc::new(codec),
            blacklist,
            self.token_config(),
        ))
    }

    /// Returns the token service configuration.
    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        let config = TokenConfig::default()
            .with_token_ttl(self.token_ttl)
            .with_refresh_grace(self.refresh_grace)
            .with_leeway(self.leeway)
            .with_required_claims(self.required_claims.clone())
            .with_store_timeout(self.blacklist.store_timeout);
        match &self.issuer {
            Some(issuer) => config.with_issuer(issuer.clone()),
            None => config,
        }
    }
}

fn read_pem(path: Option<&PathBuf>) -> Result<String, ConfigError> {
    let path = path.ok_or_else(|| ConfigError::Missing("key path".to_string()))?;
    std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Key(format!("{}: {e}", path.display())))
}
