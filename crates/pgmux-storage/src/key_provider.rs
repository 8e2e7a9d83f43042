//! Master key sources.
//!
//! A daemon normally gets its key from `PGMUX_MASTER_KEY`; when that is
//! unset a key file is created next to the platform database on first start.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::{generate_master_key, KEY_SIZE};

/// Key file name under the platform data directory.
pub const MASTER_KEY_FILE: &str = "master.key";

pub trait MasterKeyProvider: Send + Sync {
    /// Get the master key, creating one if it doesn't exist.
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>>;
}

/// Key supplied by configuration.
pub struct StaticKeyProvider {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl StaticKeyProvider {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }
}

impl MasterKeyProvider for StaticKeyProvider {
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        Ok(self.key.clone())
    }
}

/// Hex-encoded key in a file readable only by the owner.
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        let contents = Zeroizing::new(
            std::fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read key file {:?}", self.path))?,
        );
        let bytes = Zeroizing::new(hex::decode(contents.trim()).context("Invalid key file format")?);
        if bytes.len() != KEY_SIZE {
            anyhow::bail!(
                "Invalid key size in {:?}: expected {}, got {}",
                self.path,
                KEY_SIZE,
                bytes.len()
            );
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    fn write_key(&self, key: &[u8; KEY_SIZE]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create key directory {:?}", parent))?;
        }
        let encoded = Zeroizing::new(hex::encode(key));
        std::fs::write(&self.path, encoded.as_bytes())
            .with_context(|| format!("Failed to write key file {:?}", self.path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
            {
                warn!("[Storage] Could not restrict key file permissions: {}", e);
            }
        }
        Ok(())
    }
}

impl MasterKeyProvider for FileKeyProvider {
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        if self.path.exists() {
            return self.read_key();
        }

        info!("[Storage] Generating new master key at {:?}", self.path);
        let key = Zeroizing::new(generate_master_key()?);
        self.write_key(&key)?;
        Ok(key)
    }
}
