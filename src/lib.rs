//! Core of a photo-sharing service: keyed-digest request authentication,
//! a resolver enforcing ownership and notification semantics, and a
//! pluggable persistence layer with in-memory and SQLite backends.
//!
//! A transport adapter (HTTP or otherwise) parses requests into the payload
//! types in [`models`], builds [`auth::Credentials`], and calls one
//! [`resolver::Resolver`] method per operation.

pub mod auth;
pub mod config;
pub mod models;
pub mod resolver;
pub mod store;

pub use config::Config;
pub use resolver::{Resolver, ServiceError, ServiceResult};
pub use store::{DataStore, MemoryStore, SqliteStore};
