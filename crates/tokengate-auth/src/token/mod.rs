//! Token lifecycle: claims, signing, validation, refresh.

pub mod claims;
pub mod jwt;
pub mod refresh;
pub mod service;
pub mod validator;

pub use claims::{ClaimSet, ClaimSetBuilder, new_token_id};
pub use jwt::{
    GeneratedKeyPair, JwtCodec, JwtError, Jwk, Jwks, KeyMaterial, SigningAlgorithm, TokenCodec,
    generate_secret,
};
pub use refresh::{IssuedToken, RefreshCoordinator};
pub use service::{TokenConfig, TokenService};
pub use validator::TokenValidator;
