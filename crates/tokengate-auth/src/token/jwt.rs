//! JWT encoding and decoding.
//!
//! This module turns a [`ClaimSet`] into a compact, signed JWT and back. The
//! wire format is the standard three base64url segments
//! (`header.payload.signature`) so any conforming verifier can check tokens
//! minted here.
//!
//! ## Supported Algorithms
//!
//! - **HS256 / HS384 / HS512**: HMAC with a shared secret (at least 32 bytes)
//! - **RS256 / RS384**: RSA PKCS#1 v1.5
//! - **ES384**: ECDSA with the P-384 curve
//!
//! ## Example
//!
//! ```ignore
//! use tokengate_auth::token::{ClaimSet, JwtCodec, KeyMaterial, SigningAlgorithm, TokenCodec};
//!
//! let key = KeyMaterial::from_secret(SigningAlgorithm::HS256, secret.as_bytes())?;
//! let codec = JwtCodec::new(key);
//!
//! let token = codec.encode(&ClaimSet::builder("alice").build())?;
//! let claims = codec.decode(&token)?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::pkcs8::{
    DecodePublicKey as EcDecodePublicKey, EncodePrivateKey as EcEncodePrivateKey,
    EncodePublicKey as EcEncodePublicKey,
};
use p384::{PublicKey as EcPublicKey, SecretKey as EcSecretKey};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::claims::ClaimSet;

/// Minimum accepted length of an HMAC secret.
pub const MIN_SECRET_LEN: usize = 32;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// The token is not structurally a JWT.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the structural problem.
        message: String,
    },

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// The algorithm name is not one this crate signs with.
    #[error("Unsupported signing algorithm: '{name}'")]
    UnsupportedAlgorithm {
        /// The rejected algorithm name.
        name: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. }
                | Self::KeyGenerationError { .. }
                | Self::UnsupportedAlgorithm { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::malformed(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError { message } => AuthError::Encoding { message },
            JwtError::Malformed { message } => AuthError::MalformedToken { message },
            JwtError::InvalidSignature => AuthError::SignatureInvalid,
            other => AuthError::configuration(other.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for JWT tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this algorithm uses a shared secret.
    #[must_use]
    pub fn is_hmac(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::UnsupportedAlgorithm {
                name: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Creates a new empty JWKS.
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Adds a key to the set.
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }
}

impl Default for Jwks {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    // RSA-specific fields
    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC-specific fields
    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Key Material
// ============================================================================

/// Signing and verification keys, loaded once at startup and read-only afterwards.
pub struct KeyMaterial {
    algorithm: SigningAlgorithm,
    kid: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: Option<PublicKeyData>,
}

/// Internal representation of public key data for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Builds HMAC key material from a shared secret.
    ///
    /// # Errors
    /// Returns an error if the algorithm is not HMAC-based or the secret is
    /// shorter than [`MIN_SECRET_LEN`] bytes.
    pub fn from_secret(algorithm: SigningAlgorithm, secret: &[u8]) -> Result<Self, JwtError> {
        if !algorithm.is_hmac() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} does not use a shared secret",
                algorithm
            )));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(JwtError::invalid_key(format!(
                "Secret must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                secret.len()
            )));
        }

        Ok(Self {
            algorithm,
            kid: None,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            public_key_data: None,
        })
    }

    /// Loads an asymmetric key pair from PEM strings.
    ///
    /// The private key must be PKCS#8; the public key must be SPKI.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid or the algorithm is HMAC-based.
    pub fn from_pem(
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key, public_key_data) = if algorithm.is_rsa() {
            let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;

            // Parse public key to extract n and e
            let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let n = public_key.n().to_bytes_be();
            let e = public_key.e().to_bytes_be();

            (encoding_key, decoding_key, PublicKeyData::Rsa { n, e })
        } else if algorithm.is_ec() {
            let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let decoding_key = DecodingKey::from_ec_pem(public_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;

            let public_key = EcPublicKey::from_public_key_pem(public_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let point = public_key.to_encoded_point(false);
            let x = point
                .x()
                .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
            let y = point
                .y()
                .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

            (
                encoding_key,
                decoding_key,
                PublicKeyData::Ec {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        } else {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} uses a shared secret, not a PEM key pair",
                algorithm
            )));
        };

        Ok(Self {
            algorithm,
            kid: None,
            encoding_key,
            decoding_key,
            public_key_data: Some(public_key_data),
        })
    }

    /// Sets the key ID written to the `kid` header.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Returns the key ID, if any.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Exports the verification key as a JWK. Shared secrets are never exported.
    #[must_use]
    pub fn to_jwk(&self) -> Option<Jwk> {
        let jwk = match self.public_key_data.as_ref()? {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        };
        Some(jwk)
    }
}

/// A freshly generated PEM key pair.
#[derive(Clone)]
pub struct GeneratedKeyPair {
    /// PKCS#8 private key.
    pub private_pem: String,
    /// SPKI public key.
    pub public_pem: String,
}

impl GeneratedKeyPair {
    /// Generates a key pair suitable for `algorithm`.
    ///
    /// # Errors
    /// Returns an error for HMAC algorithms (use [`generate_secret`]) or if
    /// key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            Self::generate_rsa()
        } else if algorithm.is_ec() {
            Self::generate_ec()
        } else {
            Err(JwtError::key_generation_error(format!(
                "Algorithm {} uses a shared secret",
                algorithm
            )))
        }
    }

    /// Generates a 2048-bit RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation or PEM export fails.
    pub fn generate_rsa() -> Result<Self, JwtError> {
        let bits = 2048;
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            private_pem: private_pem.to_string(),
            public_pem,
        })
    }

    /// Generates a P-384 key pair.
    ///
    /// # Errors
    /// Returns an error if PEM export fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);

        // Export to PKCS8 PEM (required by jsonwebtoken)
        let private_pem = EcEncodePrivateKey::to_pkcs8_pem(&secret_key, LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = EcEncodePublicKey::to_public_key_pem(&secret_key.public_key(), LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            private_pem: private_pem.to_string(),
            public_pem,
        })
    }
}

/// Generates a random HMAC secret, base64url encoded (64 random bytes).
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ============================================================================
// Token Codec
// ============================================================================

/// Turns claim sets into signed tokens and back.
///
/// Implementations must only return claims whose signature has been verified.
pub trait TokenCodec: Send + Sync {
    /// Signs `claims` into a compact token.
    ///
    /// # Errors
    /// Returns [`AuthError::Encoding`] if mandatory or required claims are
    /// missing or mistyped.
    fn encode(&self, claims: &ClaimSet) -> AuthResult<String>;

    /// Verifies `token` and returns its claims.
    ///
    /// No temporal checks are made here; see [`crate::token::TokenValidator`].
    ///
    /// # Errors
    /// Returns [`AuthError::MalformedToken`] or [`AuthError::SignatureInvalid`].
    fn decode(&self, token: &str) -> AuthResult<ClaimSet>;

    /// Returns the public verification keys, empty for shared secrets.
    fn jwks(&self) -> Jwks {
        Jwks::new()
    }
}

/// [`TokenCodec`] backed by `jsonwebtoken`.
///
/// Cheap to clone; the key material is shared.
#[derive(Clone)]
pub struct JwtCodec {
    key: Arc<KeyMaterial>,
    required_claims: Arc<[String]>,
    validation: Arc<Validation>,
}

impl JwtCodec {
    /// Creates a codec that signs and verifies with `key`.
    #[must_use]
    pub fn new(key: KeyMaterial) -> Self {
        // Signature only: temporal checks belong to the validator so that
        // refresh can apply its grace window.
        let mut validation = Validation::new(key.algorithm.to_jwt_algorithm());
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        Self {
            key: Arc::new(key),
            required_claims: Arc::from(Vec::new()),
            validation: Arc::new(validation),
        }
    }

    /// Adds claims that must be present (besides the mandatory four) when encoding.
    #[must_use]
    pub fn with_required_claims(mut self, claims: impl IntoIterator<Item = String>) -> Self {
        self.required_claims = claims.into_iter().collect();
        self
    }

    /// Returns the key material in use.
    #[must_use]
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }
}

impl TokenCodec for JwtCodec {
    fn encode(&self, claims: &ClaimSet) -> AuthResult<String> {
        if let Some(claim) = claims.first_missing_mandatory() {
            return Err(AuthError::encoding(format!(
                "claim '{claim}' is missing or has the wrong type"
            )));
        }
        if let Some(claim) = self
            .required_claims
            .iter()
            .find(|name| !claims.contains(name))
        {
            return Err(AuthError::encoding(format!(
                "required claim '{claim}' is missing"
            )));
        }

        let mut header = Header::new(self.key.algorithm.to_jwt_algorithm());
        header.kid = self.key.kid.clone();

        encode(&header, claims.as_map(), &self.key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()).into())
    }

    fn decode(&self, token: &str) -> AuthResult<ClaimSet> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(JwtError::malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            ))
            .into());
        }

        let header = decode_header(token)
            .map_err(|e| JwtError::malformed(format!("invalid header: {e}")))?;
        if header.alg != self.key.algorithm.to_jwt_algorithm() {
            tracing::debug!(alg = ?header.alg, "Token algorithm does not match signing key");
            return Err(AuthError::SignatureInvalid);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(segments[1])
            .map_err(|e| JwtError::malformed(format!("payload is not base64url: {e}")))?;
        serde_json::from_slice::<Map<String, Value>>(&payload)
            .map_err(|e| JwtError::malformed(format!("payload is not a JSON object: {e}")))?;

        let data = decode::<Map<String, Value>>(token, &self.key.decoding_key, &self.validation)
            .map_err(|err| {
                let claims_rejected = matches!(err.kind(), ErrorKind::Json(_));
                match JwtError::from(err) {
                    JwtError::Malformed { message } if claims_rejected => {
                        JwtError::malformed(message)
                    }
                    // Header and payload were checked above, so any remaining
                    // structural failure is in the signature segment.
                    JwtError::Malformed { .. } => JwtError::InvalidSignature,
                    other => other,
                }
            })?;

        Ok(ClaimSet::from_map(data.claims))
    }

    fn jwks(&self) -> Jwks {
        let mut jwks = Jwks::new();
        if let Some(jwk) = self.key.to_jwk() {
            jwks.add_key(jwk);
        }
        jwks
    }
}

// ============================================================================
// Tests
// ============================================================================
