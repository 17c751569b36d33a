//! Store configuration
//!
//! KDF cost parameters are not written into the container, so a database
//! must be opened with the same parameters it was created with.

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::Path;

use crate::error::{VaultError, VaultResult};

// Argon2id parameters (fixed baseline)
pub const ARGON2_MEMORY_KIB: u32 = 262_144; // 256 MiB
pub const ARGON2_ITERATIONS: u32 = 4;
pub const ARGON2_PARALLELISM: u32 = 4;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: ARGON2_MEMORY_KIB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self { memory_kib, iterations, parallelism }
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.iterations == 0 {
            return Err(VaultError::InvalidParameter("KDF iterations must be at least 1".into()));
        }
        if self.parallelism == 0 {
            return Err(VaultError::InvalidParameter("KDF parallelism must be at least 1".into()));
        }
        // argon2 requires 8 KiB per lane
        if self.memory_kib < 8 * self.parallelism {
            return Err(VaultError::InvalidParameter(format!(
                "KDF memory too low: {} KiB for {} lanes",
                self.memory_kib, self.parallelism
            )));
        }
        Ok(())
    }
}

/// Settings for opening and saving a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kdf: KdfParams,
    /// Copy the previous file to `<name>.bak` before overwriting it
    pub keep_backup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            keep_backup: true,
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(json: &str) -> VaultResult<Self> {
        let config: StoreConfig =
            serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))?;
        config.kdf.validate()?;
        Ok(config)
    }

    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.kdf.memory_kib, 262_144);
        assert_eq!(config.kdf.iterations, 4);
        assert!(config.keep_backup);
        assert!(config.kdf.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = StoreConfig::from_json_str(r#"{"keep_backup": false}"#).unwrap();
        assert!(!config.keep_backup);
        assert_eq!(config.kdf, KdfParams::default());

        let config =
            StoreConfig::from_json_str(r#"{"kdf": {"memory_kib": 1024, "iterations": 1}}"#).unwrap();
        assert_eq!(config.kdf.memory_kib, 1024);
        assert_eq!(config.kdf.iterations, 1);
        assert_eq!(config.kdf.parallelism, ARGON2_PARALLELISM);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            StoreConfig::from_json_str("not json"),
            Err(VaultError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{"kdf": {"iterations": 0}}"#),
            Err(VaultError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::load(tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }
}
