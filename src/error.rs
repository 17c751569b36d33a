//! Error kinds surfaced by the credential store
//!
//! Every failure maps to exactly one variant so callers can pick a
//! recovery path (re-prompt, abort, offer repair) by matching on it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Incorrect key")]
    IncorrectKey,

    /// Raw cipher failure; the store translates it into
    /// `IncorrectPassword` or `IncorrectKey` depending on how it was unlocked.
    #[error("Decryption failed: invalid key or tampered data")]
    IncorrectKeyOrCorrupt,

    #[error("Integrity check failed - database file was modified or damaged")]
    IntegrityCheckFailed,

    #[error("Unsupported file format: {0}")]
    UnsupportedFileFormat(String),

    #[error("Decrypted data is not valid UTF-8")]
    DataCorrupted,

    #[error("Invalid keyfile: {0}")]
    KeyfileInvalid(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No key has been derived yet")]
    NoKeyFound,

    #[error("Failed to initialize sodiumoxide")]
    CipherUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VaultResult<T> = Result<T, VaultError>;
