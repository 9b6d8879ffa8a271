//! # Tasklane Access Core
//!
//! Authorization and membership for Tasklane projects: who may do what to a
//! project and its tasks, and how new people are invited in.
//!
//! ## Module Organization
//!
//! - `auth`: Role resolution, the permission matrix, task visibility, tokens
//! - `membership`: The only writer of membership rows; keeps every project owned
//! - `invitations`: Invitation create/accept/revoke/resend with lazy expiry
//! - `projects`: Project and task operations behind the permission guard
//! - `notify`: Hand-off of invitation notices to the surrounding application
//! - `store`: Transactional storage seam with Postgres and in-memory backends
//! - `models`: Persisted entities and their Postgres queries
//! - `db`: Connection pool and migrations
//! - `config`: Configuration from environment variables
//! - `clock`: Time source for expiry decisions
//! - `error`: The error taxonomy shared by every operation

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod invitations;
pub mod membership;
pub mod models;
pub mod notify;
pub mod projects;
pub mod store;

pub use error::{AccessError, AccessResult};

/// Current version of the access core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
