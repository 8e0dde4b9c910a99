//! In-memory blacklist backend for tokengate.
//!
//! This crate provides an in-process implementation of the
//! `BlacklistStorage` trait from `tokengate-auth`, using a sharded
//! `DashMap` so that lookups and revocations of unrelated token identifiers
//! never contend on the same lock.
//!
//! Entries live only as long as the process. Deployments with several
//! instances need a shared store instead.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokengate_auth::{TokenConfig, TokenService};
//! use tokengate_auth_memory::InMemoryBlacklist;
//!
//! let blacklist = Arc::new(InMemoryBlacklist::new());
//! let service = TokenService::new(codec, blacklist, TokenConfig::default());
//! ```

pub mod blacklist;

pub use blacklist::InMemoryBlacklist;
