//! pwvault
//!
//! Local, single-user encrypted credential store. Records are sealed with a
//! two-layer Argon2id key scheme, persisted in a hashed binary container,
//! and audited for age, reuse and complexity.

pub mod audit;
pub mod config;
pub mod container;
pub mod crypto;
pub mod database;
pub mod error;
pub mod record;
pub mod rows;
pub mod store;

pub use audit::{AuditEngine, AuditRow, SecurityBand};
pub use config::{KdfParams, StoreConfig};
pub use container::{Container, ContainerVersion, IntegrityCheck, ReadState};
pub use crypto::{KeyMaterial, KeySource, SecretBuffer, SecureKey};
pub use database::{Credentials, Database};
pub use error::{VaultError, VaultResult};
pub use record::{AgeBucket, Complexity, Record, RecordDraft, Reuse, TwoFactor};
pub use store::{ImportSummary, RecordStore, RecordSummary, SearchField};
