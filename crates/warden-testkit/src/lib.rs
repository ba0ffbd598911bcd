//! # Warden Testkit
//!
//! Testing utilities for Warden.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a gateway over an in-memory store with encryption on,
//!   well-known identities and a token verifier
//! - **Generators**: Proptest strategies for values and documents
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use serde_json::json;
//! use warden_store::WriteConcern;
//! use warden_testkit::fixtures::{alice, TestFixture};
//!
//! # async fn example() {
//! let fixture = TestFixture::new();
//! let item = json!({"name": "report"});
//! fixture
//!     .gateway
//!     .insert(&alice(), "entities", &item, WriteConcern::default())
//!     .await
//!     .unwrap();
//! assert_eq!(fixture.raw("entities").len(), 1);
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use warden_testkit::generators::document;
//!
//! proptest! {
//!     #[test]
//!     fn encoding_is_stable(doc in document()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{admin, alice, bob, random_id, StaticVerifier, TestFixture};
pub use generators::{document, edited_documents, value};
