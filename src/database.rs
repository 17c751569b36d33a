//! Database file management
//!
//! Ties the key material, record store and container codec to a path:
//! create, open (with password or cached keys), save, change password.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use zeroize::Zeroizing;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::audit::{AuditEngine, AuditRow};
use crate::config::StoreConfig;
use crate::container::{self, Container, IntegrityCheck};
use crate::crypto::{KeyMaterial, KEYFILE_MIN_LEN};
use crate::error::{VaultError, VaultResult};
use crate::store::RecordStore;

/// How to unlock an existing database
pub enum Credentials<'a> {
    Password {
        password: &'a str,
        keyfile: Option<&'a Path>,
    },
    /// Keys previously exported with `Database::export_raw_keys`
    RawKeys { key1: &'a str, key2: &'a str },
}

/// Read a keyfile, rejecting missing or undersized files
pub fn load_keyfile(path: &Path) -> VaultResult<Zeroizing<Vec<u8>>> {
    let bytes = Zeroizing::new(
        fs::read(path)
            .map_err(|e| VaultError::KeyfileInvalid(format!("{}: {}", path.display(), e)))?,
    );
    if bytes.len() < KEYFILE_MIN_LEN {
        return Err(VaultError::KeyfileInvalid(format!(
            "{} is {} bytes, need at least {}",
            path.display(),
            bytes.len(),
            KEYFILE_MIN_LEN
        )));
    }
    Ok(bytes)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Write to a temp file next to `path`, then rename over it
fn write_atomic(path: &Path, bytes: &[u8], keep_backup: bool) -> VaultResult<()> {
    let tmp = sibling(path, ".tmp");
    let result = (|| -> std::io::Result<()> {
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        if keep_backup && path.exists() {
            fs::copy(path, sibling(path, ".bak"))?;
        }
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// An unlocked database bound to a file
pub struct Database {
    path: PathBuf,
    config: StoreConfig,
    store: Option<RecordStore>,
}

impl Database {
    /// Create a new, empty database file. Fails if the file already exists.
    pub fn create(
        path: impl AsRef<Path>,
        password: &str,
        keyfile: Option<&Path>,
        config: StoreConfig,
    ) -> VaultResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(VaultError::InvalidParameter(format!(
                "{} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let keyfile = keyfile.map(load_keyfile).transpose()?;
        let keys = KeyMaterial::generate(password, keyfile.as_deref().map(Vec::as_slice), &config.kdf)?;

        let mut db = Self {
            path,
            config,
            store: Some(RecordStore::new(keys)),
        };
        db.save()?;
        info!(path = %db.path.display(), "created database");
        Ok(db)
    }

    /// Open and decrypt an existing database
    ///
    /// `IntegrityCheck::Skip` is the repair path for a file whose hash no
    /// longer matches; it should only be used after the user confirms.
    pub fn open(
        path: impl AsRef<Path>,
        credentials: Credentials<'_>,
        config: StoreConfig,
        check: IntegrityCheck,
    ) -> VaultResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;

        let mut container = Container::read(&bytes)?;
        container.verify(check)?;
        if check == IntegrityCheck::Skip {
            warn!(path = %path.display(), "opened without enforcing integrity check");
        }

        let keys = match credentials {
            Credentials::Password { password, keyfile } => {
                let keyfile = keyfile.map(load_keyfile).transpose()?;
                KeyMaterial::derive(
                    password,
                    keyfile.as_deref().map(Vec::as_slice),
                    *container.salt1(),
                    *container.salt2(),
                    &config.kdf,
                )?
            }
            Credentials::RawKeys { key1, key2 } => {
                KeyMaterial::from_raw_keys(key1, key2, *container.salt1(), *container.salt2(), &config.kdf)?
            }
        };

        let store = match container.decrypt(&keys)? {
            Some(text) => RecordStore::deserialize(keys, text.as_str()?, Utc::now())?,
            None => RecordStore::new(keys),
        };

        info!(path = %path.display(), records = store.len(), "opened database");
        Ok(Self {
            path,
            config,
            store: Some(store),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_unlocked(&self) -> bool {
        self.store.is_some()
    }

    /// Drop the records and all key material from memory
    pub fn lock(&mut self) {
        self.store = None;
        info!(path = %self.path.display(), "locked database");
    }

    pub fn store(&self) -> VaultResult<&RecordStore> {
        self.store.as_ref().ok_or(VaultError::NoKeyFound)
    }

    pub fn store_mut(&mut self) -> VaultResult<&mut RecordStore> {
        self.store.as_mut().ok_or(VaultError::NoKeyFound)
    }

    /// Encrypt and write the current records
    pub fn save(&mut self) -> VaultResult<()> {
        let store = self.store.as_ref().ok_or(VaultError::NoKeyFound)?;
        self.write_store(store)
    }

    fn write_store(&self, store: &RecordStore) -> VaultResult<()> {
        let keys = store.keys();

        let bytes = if store.is_empty() {
            container::write(keys.salt1(), keys.salt2(), None)
        } else {
            let text = Zeroizing::new(store.serialize());
            let token = keys.seal_payload(text.as_bytes())?;
            container::write(keys.salt1(), keys.salt2(), Some(token.as_slice()))
        };

        write_atomic(&self.path, &bytes, self.config.keep_backup)?;
        info!(path = %self.path.display(), records = store.len(), "saved database");
        Ok(())
    }

    /// Replace both salts and keys, re-encrypt every password, then save
    ///
    /// The re-keyed records replace the in-memory ones only once the file
    /// has been written; on any error the old password stays in effect.
    pub fn change_password(&mut self, new_password: &str, keyfile: Option<&Path>) -> VaultResult<()> {
        let mut rekeyed = self.store()?.clone();

        let keyfile = keyfile.map(load_keyfile).transpose()?;
        let new_keys =
            KeyMaterial::generate(new_password, keyfile.as_deref().map(Vec::as_slice), &self.config.kdf)?;
        rekeyed.rekey(new_keys)?;

        self.write_store(&rekeyed)?;
        self.store = Some(rekeyed);
        info!("master password changed");
        Ok(())
    }

    /// Cached-key form of the current key material
    pub fn export_raw_keys(&self) -> VaultResult<(Zeroizing<String>, Zeroizing<String>)> {
        Ok(self.store()?.keys().export_raw_keys())
    }

    /// Run a full audit and return the report, weakest first
    pub fn audit(&mut self, now: DateTime<Utc>) -> VaultResult<Vec<AuditRow>> {
        let store = self.store_mut()?;
        AuditEngine::audit(store, now)?;
        Ok(AuditEngine::report(store.records()))
    }
}
