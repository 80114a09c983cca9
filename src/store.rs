//! License key persistence.
//!
//! The engine persists the raw validated key, not the decoded license:
//! the key is re-validated on startup, so a tampered store entry buys an
//! attacker nothing. Writes are atomic via temp file + rename.

use crate::errors::TierlockError;
use std::fs;
use std::path::PathBuf;

/// Persistence seam for the active license key.
pub trait LicenseStore: Send + Sync {
    /// Load the persisted key, if any.
    fn load(&self) -> Result<Option<String>, TierlockError>;

    /// Persist the key.
    fn save(&self, key: &str) -> Result<(), TierlockError>;

    /// Remove any persisted key.
    fn clear(&self) -> Result<(), TierlockError>;
}

/// File-backed store under `dirs::data_dir()/<namespace>/`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store in the platform data directory under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, TierlockError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| TierlockError::StoreIO("Could not find data directory".to_string()))?;

        let dir = base_dir.join(namespace);
        fs::create_dir_all(&dir)
            .map_err(|e| TierlockError::StoreIO(format!("Failed to create dir: {}", e)))?;

        Ok(Self {
            path: dir.join("license.key"),
        })
    }

    /// Create a store at an explicit path (for testing).
    pub fn at_path(path: PathBuf) -> Result<Self, TierlockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TierlockError::StoreIO(format!("Failed to create dir: {}", e)))?;
        }
        Ok(Self { path })
    }
}

impl LicenseStore for FileStore {
    fn load(&self) -> Result<Option<String>, TierlockError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let key = fs::read_to_string(&self.path)
            .map_err(|e| TierlockError::StoreIO(format!("Failed to read license: {}", e)))?;
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }
        Ok(Some(key.to_string()))
    }

    fn save(&self, key: &str) -> Result<(), TierlockError> {
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, key)
            .map_err(|e| TierlockError::StoreIO(format!("Failed to write temp: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| TierlockError::StoreIO(format!("Failed to rename: {}", e)))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), TierlockError> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| TierlockError::StoreIO(format!("Failed to delete: {}", e)))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    key: std::sync::Mutex<Option<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a key.
    pub fn with_key(key: &str) -> Self {
        Self {
            key: std::sync::Mutex::new(Some(key.to_string())),
        }
    }
}

impl LicenseStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, TierlockError> {
        Ok(self.key.lock().expect("store lock").clone())
    }

    fn save(&self, key: &str) -> Result<(), TierlockError> {
        *self.key.lock().expect("store lock") = Some(key.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TierlockError> {
        *self.key.lock().expect("store lock") = None;
        Ok(())
    }
}
