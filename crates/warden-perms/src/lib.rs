//! # Warden Permissions
//!
//! Access control and field protection for Warden.
//!
//! ## Overview
//!
//! Every persisted entity carries an ordered ACL. Each entry grants (or
//! denies) a rights bitmask to a user or role. Reads and writes are scoped by
//! an access filter built from the caller's identity; a handful of structural
//! rules that bitmasks cannot express are checked in process by
//! [`authorize`].
//!
//! ## Key Concepts
//!
//! - **Right**: create, read, update, delete, invoke or full control
//! - **Ace / Acl**: grantee, rights mask and deny flag, in order
//! - **AccessControl**: bypass switch, root rule and filter builder together
//! - **FieldCodec**: seals and opens the fields listed in `_encrypt`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warden_perms::{AccessControl, Identity, Right};
//!
//! let access = AccessControl::default();
//! let alice = Identity::new("u1", "Alice", "alice");
//! let filter = access.filter(&alice, "entities", &[Right::Read]);
//! # let _ = filter;
//! ```

pub mod acl;
pub mod authorize;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod identity;
pub mod rights;

pub use acl::{Ace, Acl};
pub use authorize::{authorize, Action};
pub use codec::{FieldCodec, ENCRYPT_FIELD};
pub use crypto::{ChaChaFieldCipher, EncryptionKey, EncryptionNonce, FieldCipher};
pub use error::{PermsError, Result};
pub use filter::{AccessControl, AccessFilterBuilder, AclLocation, BitmaskFilterBuilder, FILES_COLLECTION};
pub use identity::{
    Identity, IdentityVerifier, RoleRef, ADMINS_ID, ADMINS_NAME, RESERVED_ROLE_NAMES,
    RESERVED_USER_NAMES, ROOT_ID, ROOT_NAME, USERS_ID, USERS_NAME, WORKFLOW_NAME,
};
pub use rights::{required_bits, Right, RightsMask};
