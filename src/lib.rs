//! # Hubkeeper
//!
//! Authorization and lifecycle engine for a multi-tenant registry backend,
//! usable both as a standalone administrative binary and as a library.
//!
//! It answers *who may act on what* across users, organizations, teams and
//! repositories, and keeps the membership graph consistent when entities are
//! suspended and restored.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! hubkeeper = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hubkeeper::auth::{Authenticator, Authn};
//! use hubkeeper::config::ServerConfig;
//! use hubkeeper::service::Registry;
//! use hubkeeper::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = Arc::new(SqliteStore::new(config.db_path()).unwrap());
//! store.initialize().unwrap();
//!
//! let authn = Authn::from_config(&config.authn, store.clone(), None).unwrap();
//! let registry = Registry::new(store);
//!
//! let owner = authn.authenticate("alice", "secret").unwrap();
//! registry.deactivate_organization(&owner, "acme").unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `hubkeeper` binary. Disable with `default-features = false`.

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod store;
pub mod types;
