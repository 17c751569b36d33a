//! Core cryptographic operations
//!
//! Implements:
//! - Argon2id key derivation for both key layers
//! - XChaCha20-Poly1305 AEAD encryption in a versioned token
//! - Secure memory handling for keys and decrypted secrets

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use secrecy::{ExposeSecret, Secret};
use sodiumoxide::crypto::aead::xchacha20poly1305_ietf::{self, Key, Nonce, NONCEBYTES, TAGBYTES};
use sodiumoxide::randombytes::randombytes;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::KdfParams;
use crate::error::{VaultError, VaultResult};

// Key/nonce sizes
pub const SALT_LEN: usize = 32;
pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = NONCEBYTES; // 24 bytes for XChaCha20

/// Minimum keyfile size in bytes
pub const KEYFILE_MIN_LEN: usize = 1000;

/// First byte of every token produced by `encrypt`
pub const TOKEN_VERSION: u8 = 0x01;

/// Secure key wrapper with auto-zeroing
#[derive(Clone)]
pub struct SecureKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl SecureKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { inner: Secret::new(key) }
    }

    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate random key
    pub fn generate() -> Self {
        let mut bytes = randombytes(KEY_LEN);
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Self::new(key)
    }

    /// URL-safe base64 form, suitable for caching in an OS keyring
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(URL_SAFE.encode(self.expose()))
    }

    pub fn from_base64(encoded: &str) -> VaultResult<Self> {
        let bytes = Zeroizing::new(
            URL_SAFE
                .decode(encoded.trim())
                .map_err(|e| VaultError::InvalidParameter(format!("Malformed key: {}", e)))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(VaultError::InvalidParameter(format!(
                "Key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }
}

/// Heap buffer for decrypted secrets, wiped when dropped
#[derive(ZeroizeOnDrop)]
pub struct SecretBuffer {
    data: Vec<u8>,
}

impl SecretBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// View as UTF-8 text
    pub fn as_str(&self) -> VaultResult<&str> {
        std::str::from_utf8(&self.data).map_err(|_| VaultError::DataCorrupted)
    }
}

impl From<Vec<u8>> for SecretBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for SecretBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Generate cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let bytes = randombytes(SALT_LEN);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes);
    salt
}

/// Generate random nonce for XChaCha20
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let bytes = randombytes(NONCE_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes);
    nonce
}

fn argon2_hash(input: &[u8], salt: &[u8; SALT_LEN], params: &KdfParams) -> VaultResult<SecureKey> {
    params.validate()?;
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::InvalidParameter(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(input, salt, &mut output)
        .map_err(|e| VaultError::InvalidParameter(format!("Argon2 hashing failed: {}", e)))?;

    let key = SecureKey::new(output);
    output.zeroize();
    Ok(key)
}

/// Derive the first-layer key from the password and optional keyfile contents
///
/// This is the expensive operation that protects against brute-force
/// attacks. The keyfile, when given, is appended to the password bytes.
pub fn derive_key1(
    password: &str,
    salt1: &[u8; SALT_LEN],
    keyfile: Option<&[u8]>,
    params: &KdfParams,
) -> VaultResult<SecureKey> {
    if password.is_empty() {
        return Err(VaultError::InvalidParameter("Password must not be empty".into()));
    }

    let mut input = Zeroizing::new(Vec::with_capacity(
        password.len() + keyfile.map_or(0, <[u8]>::len),
    ));
    input.extend_from_slice(password.as_bytes());

    if let Some(keyfile) = keyfile {
        if keyfile.len() < KEYFILE_MIN_LEN {
            return Err(VaultError::KeyfileInvalid(format!(
                "keyfile must be at least {} bytes, got {}",
                KEYFILE_MIN_LEN,
                keyfile.len()
            )));
        }
        input.extend_from_slice(keyfile);
    }

    argon2_hash(&input, salt1, params)
}

/// Derive the second-layer key from the raw bytes of the first
pub fn derive_key2(key1: &[u8], salt2: &[u8; SALT_LEN], params: &KdfParams) -> VaultResult<SecureKey> {
    if key1.is_empty() {
        return Err(VaultError::InvalidParameter(
            "Cannot derive a dependent key from empty key material".into(),
        ));
    }
    argon2_hash(key1, salt2, params)
}

/// Encrypt plaintext using XChaCha20-Poly1305
///
/// Returns: version (1 byte) || nonce (24 bytes) || ciphertext || tag (16 bytes)
pub fn encrypt(plaintext: &[u8], key: &SecureKey) -> VaultResult<Vec<u8>> {
    // Initialize sodiumoxide (safe to call multiple times)
    sodiumoxide::init().map_err(|_| VaultError::CipherUnavailable)?;

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes)
        .ok_or_else(|| VaultError::InvalidParameter("Invalid nonce".into()))?;
    let key = Key::from_slice(key.expose())
        .ok_or_else(|| VaultError::InvalidParameter("Invalid key".into()))?;

    // The version byte is authenticated as associated data
    let ciphertext = xchacha20poly1305_ietf::seal(plaintext, Some(&[TOKEN_VERSION][..]), &nonce, &key);

    let mut output = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    output.push(TOKEN_VERSION);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Decrypt a token produced by `encrypt`
///
/// A wrong key and a modified token are indistinguishable; both yield
/// `IncorrectKeyOrCorrupt`.
pub fn decrypt(token: &[u8], key: &SecureKey) -> VaultResult<SecretBuffer> {
    sodiumoxide::init().map_err(|_| VaultError::CipherUnavailable)?;

    if token.len() < 1 + NONCE_LEN + TAGBYTES || token[0] != TOKEN_VERSION {
        return Err(VaultError::IncorrectKeyOrCorrupt);
    }

    let nonce = Nonce::from_slice(&token[1..1 + NONCE_LEN]).ok_or(VaultError::IncorrectKeyOrCorrupt)?;
    let key = Key::from_slice(key.expose())
        .ok_or_else(|| VaultError::InvalidParameter("Invalid key".into()))?;

    xchacha20poly1305_ietf::open(&token[1 + NONCE_LEN..], Some(&[TOKEN_VERSION][..]), &nonce, &key)
        .map(SecretBuffer::new)
        .map_err(|_| VaultError::IncorrectKeyOrCorrupt)
}

/// How the key material was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Password,
    RawKey,
}

/// Both key layers plus the salts they were derived with
#[derive(Clone)]
pub struct KeyMaterial {
    key1: SecureKey,
    key2: SecureKey,
    salt1: [u8; SALT_LEN],
    salt2: [u8; SALT_LEN],
    source: KeySource,
}

impl KeyMaterial {
    /// Fresh salts and keys, for a new database or a password change
    pub fn generate(password: &str, keyfile: Option<&[u8]>, params: &KdfParams) -> VaultResult<Self> {
        Self::derive(password, keyfile, generate_salt(), generate_salt(), params)
    }

    /// Re-derive keys from persisted salts
    pub fn derive(
        password: &str,
        keyfile: Option<&[u8]>,
        salt1: [u8; SALT_LEN],
        salt2: [u8; SALT_LEN],
        params: &KdfParams,
    ) -> VaultResult<Self> {
        let key1 = derive_key1(password, &salt1, keyfile, params)?;
        let key2 = derive_key2(key1.expose(), &salt2, params)?;
        Ok(Self { key1, key2, salt1, salt2, source: KeySource::Password })
    }

    /// Rebuild from keys cached outside the database (base64-url strings)
    ///
    /// Key 2 must be the one derived from key 1 and salt 2, otherwise
    /// passwords sealed later would be unreadable under the master password.
    pub fn from_raw_keys(
        key1: &str,
        key2: &str,
        salt1: [u8; SALT_LEN],
        salt2: [u8; SALT_LEN],
        params: &KdfParams,
    ) -> VaultResult<Self> {
        let key1 = SecureKey::from_base64(key1).map_err(|_| VaultError::IncorrectKey)?;
        let key2 = SecureKey::from_base64(key2).map_err(|_| VaultError::IncorrectKey)?;

        let expected = derive_key2(key1.expose(), &salt2, params)?;
        if !sodiumoxide::utils::memcmp(expected.expose(), key2.expose()) {
            return Err(VaultError::IncorrectKey);
        }

        Ok(Self { key1, key2, salt1, salt2, source: KeySource::RawKey })
    }

    pub fn export_raw_keys(&self) -> (Zeroizing<String>, Zeroizing<String>) {
        (self.key1.to_base64(), self.key2.to_base64())
    }

    pub fn key1(&self) -> &SecureKey {
        &self.key1
    }

    pub fn key2(&self) -> &SecureKey {
        &self.key2
    }

    pub fn salt1(&self) -> &[u8; SALT_LEN] {
        &self.salt1
    }

    pub fn salt2(&self) -> &[u8; SALT_LEN] {
        &self.salt2
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    /// Error reported when authentication fails under this key material
    pub fn auth_error(&self) -> VaultError {
        match self.source {
            KeySource::Password => VaultError::IncorrectPassword,
            KeySource::RawKey => VaultError::IncorrectKey,
        }
    }

    fn map_auth(&self, err: VaultError) -> VaultError {
        match err {
            VaultError::IncorrectKeyOrCorrupt => self.auth_error(),
            other => other,
        }
    }

    /// Encrypt the serialized record payload with key 1
    pub fn seal_payload(&self, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        encrypt(plaintext, &self.key1)
    }

    pub fn open_payload(&self, token: &[u8]) -> VaultResult<SecretBuffer> {
        decrypt(token, &self.key1).map_err(|e| self.map_auth(e))
    }

    /// Encrypt a single record password with key 2
    pub fn seal_password(&self, plaintext: &str) -> VaultResult<String> {
        let token = encrypt(plaintext.as_bytes(), &self.key2)?;
        Ok(URL_SAFE.encode(token))
    }

    pub fn open_password(&self, encoded: &str) -> VaultResult<SecretBuffer> {
        let token = URL_SAFE.decode(encoded).map_err(|_| self.auth_error())?;
        decrypt(&token, &self.key2).map_err(|e| self.map_auth(e))
    }
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams::new(64, 1, 1)
}
