//! # Warden
//!
//! A permission-enforcing persistence gateway over a document store.
//!
//! Callers hand the [`Gateway`] loosely-typed JSON: queries, entities and
//! patch expressions. The gateway translates them into store-native form,
//! scopes every read and write by the caller's ACL rights, seals declared
//! fields, stamps actor metadata and records a version history of each
//! entity next to the live collection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use warden::{Gateway, GatewayConfig};
//! use warden_perms::Identity;
//! use warden_store::{FindOptions, MemoryStore, WriteConcern};
//!
//! # async fn example() -> warden::Result<()> {
//! let gateway = Gateway::new(MemoryStore::new(), GatewayConfig::default());
//! let alice = Identity::new("u1", "Alice", "alice");
//!
//! let item = json!({"name": "report", "_encrypt": ["secret"], "secret": "s3"});
//! gateway.insert(&alice, "entities", &item, WriteConcern::default()).await?;
//!
//! let found = gateway
//!     .query(&alice, "entities", &json!({"name": "report"}), FindOptions::default())
//!     .await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod history;
pub mod roles;

pub use config::GatewayConfig;
pub use entity::{MetadataPolicy, Stamp};
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use history::{HistoryEntry, HistoryRecord, HistoryRecorder};
pub use roles::{DocumentRoleStore, Role, RoleStore};
