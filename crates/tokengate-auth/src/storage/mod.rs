//! Storage traits for token revocation data.
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `tokengate-auth-memory` - in-memory blacklist backend

pub mod blacklist;

#[cfg(test)]
pub(crate) mod mock;

pub use blacklist::{BlacklistStorage, bounded};
