//! On-disk container format
//!
//! ```text
//! offset  size  field
//! 0       5     magic "PWMGR"
//! 5       2     version "00" (empty) | "01" (with data), ASCII
//! 7       64    SHA-256 of everything below plus magic and version, ASCII hex
//! 71      32    salt1
//! 103     32    salt2
//! 135     *     payload token (version "01" only)
//! ```
//!
//! The hash covers `magic || version || salt1 || salt2 || payload`.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::crypto::{KeyMaterial, SecretBuffer, SALT_LEN};
use crate::error::{VaultError, VaultResult};

pub const MAGIC: &[u8; 5] = b"PWMGR";
pub const HASH_HEX_LEN: usize = 64;

const VERSION_LEN: usize = 2;
const VERSION_OFFSET: usize = MAGIC.len();
const HASH_OFFSET: usize = VERSION_OFFSET + VERSION_LEN;
const SALT1_OFFSET: usize = HASH_OFFSET + HASH_HEX_LEN;
const SALT2_OFFSET: usize = SALT1_OFFSET + SALT_LEN;
pub const PAYLOAD_OFFSET: usize = SALT2_OFFSET + SALT_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVersion {
    Empty,
    WithData,
}

impl ContainerVersion {
    pub fn as_bytes(&self) -> &'static [u8; VERSION_LEN] {
        match self {
            ContainerVersion::Empty => b"00",
            ContainerVersion::WithData => b"01",
        }
    }

    fn parse(bytes: &[u8]) -> VaultResult<Self> {
        match bytes {
            b"00" => Ok(ContainerVersion::Empty),
            b"01" => Ok(ContainerVersion::WithData),
            other => Err(VaultError::UnsupportedFileFormat(format!(
                "unknown version {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// How far a container has been processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadState {
    Unread,
    HeaderRead,
    SaltsRead,
    PayloadRead,
    Verified,
    Decrypted,
}

/// Whether to enforce the stored hash when opening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityCheck {
    #[default]
    Enforce,
    /// Repair path: accept a container whose hash does not match
    Skip,
}

/// SHA-256 over the authenticated fields, as lower-case hex
pub fn compute_hash(
    version: ContainerVersion,
    salt1: &[u8; SALT_LEN],
    salt2: &[u8; SALT_LEN],
    payload: Option<&[u8]>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(MAGIC);
    hasher.update(version.as_bytes());
    hasher.update(salt1);
    hasher.update(salt2);
    if let Some(payload) = payload {
        hasher.update(payload);
    }
    format!("{:x}", hasher.finalize())
}

/// Encode a container; the version follows from whether a payload is given
pub fn write(salt1: &[u8; SALT_LEN], salt2: &[u8; SALT_LEN], payload: Option<&[u8]>) -> Vec<u8> {
    let version = match payload {
        Some(_) => ContainerVersion::WithData,
        None => ContainerVersion::Empty,
    };
    let hash = compute_hash(version, salt1, salt2, payload);

    let mut out = Vec::with_capacity(PAYLOAD_OFFSET + payload.map_or(0, <[u8]>::len));
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(version.as_bytes());
    out.extend_from_slice(hash.as_bytes());
    out.extend_from_slice(salt1);
    out.extend_from_slice(salt2);
    if let Some(payload) = payload {
        out.extend_from_slice(payload);
    }
    out
}

/// A parsed container
#[derive(Debug, Clone)]
pub struct Container {
    version: ContainerVersion,
    stored_hash: Vec<u8>,
    salt1: [u8; SALT_LEN],
    salt2: [u8; SALT_LEN],
    payload: Option<Vec<u8>>,
    state: ReadState,
}

fn truncated(state: ReadState) -> VaultError {
    VaultError::UnsupportedFileFormat(format!("file truncated after {:?}", state))
}

impl Container {
    pub fn read(bytes: &[u8]) -> VaultResult<Self> {
        let mut state = ReadState::Unread;

        if bytes.len() < HASH_OFFSET {
            return Err(truncated(state));
        }
        if &bytes[..VERSION_OFFSET] != MAGIC {
            return Err(VaultError::UnsupportedFileFormat("bad magic header".into()));
        }
        let version = ContainerVersion::parse(&bytes[VERSION_OFFSET..HASH_OFFSET])?;
        if bytes.len() < SALT1_OFFSET {
            return Err(truncated(state));
        }
        let stored_hash = bytes[HASH_OFFSET..SALT1_OFFSET].to_vec();
        state = ReadState::HeaderRead;

        if bytes.len() < PAYLOAD_OFFSET {
            return Err(truncated(state));
        }
        let mut salt1 = [0u8; SALT_LEN];
        let mut salt2 = [0u8; SALT_LEN];
        salt1.copy_from_slice(&bytes[SALT1_OFFSET..SALT2_OFFSET]);
        salt2.copy_from_slice(&bytes[SALT2_OFFSET..PAYLOAD_OFFSET]);
        state = ReadState::SaltsRead;

        let rest = &bytes[PAYLOAD_OFFSET..];
        let payload = match version {
            ContainerVersion::WithData if rest.is_empty() => return Err(truncated(state)),
            ContainerVersion::WithData => Some(rest.to_vec()),
            ContainerVersion::Empty if !rest.is_empty() => {
                return Err(VaultError::UnsupportedFileFormat(
                    "empty database carries trailing data".into(),
                ))
            }
            ContainerVersion::Empty => None,
        };

        debug!(?version, payload_len = rest.len(), "read container");
        Ok(Self {
            version,
            stored_hash,
            salt1,
            salt2,
            payload,
            state: ReadState::PayloadRead,
        })
    }

    pub fn version(&self) -> ContainerVersion {
        self.version
    }

    pub fn salt1(&self) -> &[u8; SALT_LEN] {
        &self.salt1
    }

    pub fn salt2(&self) -> &[u8; SALT_LEN] {
        &self.salt2
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn computed_hash(&self) -> String {
        compute_hash(self.version, &self.salt1, &self.salt2, self.payload())
    }

    /// Compare the stored hash with a fresh one
    pub fn verify(&mut self, check: IntegrityCheck) -> VaultResult<()> {
        if self.state < ReadState::PayloadRead {
            return Err(VaultError::InvalidParameter("container has not been read".into()));
        }
        if self.computed_hash().as_bytes() != self.stored_hash.as_slice() {
            match check {
                IntegrityCheck::Enforce => return Err(VaultError::IntegrityCheckFailed),
                IntegrityCheck::Skip => warn!("integrity check failed; continuing as requested"),
            }
        }
        self.state = ReadState::Verified;
        Ok(())
    }

    /// Decrypt the payload with key 1. Returns `None` for an empty database.
    ///
    /// The returned buffer is guaranteed to hold valid UTF-8.
    pub fn decrypt(&mut self, keys: &KeyMaterial) -> VaultResult<Option<SecretBuffer>> {
        if self.state < ReadState::Verified {
            return Err(VaultError::InvalidParameter(
                "container must be verified before decrypting".into(),
            ));
        }
        let plaintext = match &self.payload {
            Some(token) => {
                let buffer = keys.open_payload(token)?;
                buffer.as_str()?;
                Some(buffer)
            }
            None => None,
        };
        self.state = ReadState::Decrypted;
        Ok(plaintext)
    }
}
