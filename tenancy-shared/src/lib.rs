//! # Tenancy Shared Library
//!
//! Core of the Tenancy identity and membership backend: credentials, signed
//! tokens, the organisation/role/member model, and the workflows that combine
//! them. The API server is a thin HTTP layer over this crate.
//!
//! ## Module Organization
//!
//! - `auth`: Password hashing and JWT issuance/validation
//! - `models`: Entity types and typed lookup keys
//! - `store`: Persistence contract with PostgreSQL and in-memory backends
//! - `membership`: Get-or-create and member operations over a unit of work
//! - `notify`: Outbound notification (email) delivery
//! - `identity`: Registration, login, invitation, password reset, role changes
//! - `reporting`: Read-only membership statistics
//! - `db`: Connection pool and migrations

pub mod auth;
pub mod db;
pub mod identity;
pub mod membership;
pub mod models;
pub mod notify;
pub mod reporting;
pub mod store;

/// Current version of the Tenancy shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
