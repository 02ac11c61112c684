//! Durable storage for the session credential.
//!
//! There is exactly one slot: saving replaces whatever was stored, and
//! clearing empties it. The credential is opaque here; nothing in this module
//! checks whether the server would still accept it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use branches_types::Credential;
use branches_utils::{atomic_write, ensure_private_dir, remove_file_if_exists};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read saved session from {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to save session to {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to remove saved session at {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },
}

pub trait TokenStore {
    fn load(&self) -> Result<Option<Credential>, StoreError>;
    fn save(&self, credential: &Credential) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        (**self).load()
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        (**self).save(credential)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

// ============================================================================
// File store
// ============================================================================

/// Stores the credential as the sole content of one owner-only file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let credential = Credential::new(content).ok();
                if credential.is_none() {
                    tracing::debug!(path = %self.path.display(), "Saved session file is blank");
                }
                Ok(credential)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let write = || -> io::Result<()> {
            // Only a directory created here is narrowed to owner-only.
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                ensure_private_dir(parent)?;
            }
            atomic_write(&self.path, credential.expose_secret().as_bytes())
        };
        write().map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "Session credential saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let removed = remove_file_if_exists(&self.path).map_err(|source| StoreError::Remove {
            path: self.path.clone(),
            source,
        })?;
        if removed {
            tracing::debug!(path = %self.path.display(), "Session credential cleared");
        }
        Ok(())
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// In-process store. Clones share the slot, so dropping a controller and
/// building a new one from a clone behaves like a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<Mutex<Option<Credential>>>,
    fail_writes: bool,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::default();
        *store.lock() = Some(credential);
        store
    }

    /// A store whose `save` and `clear` always fail, leaving the slot as it
    /// was. For exercising persistence errors.
    #[must_use]
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    #[must_use]
    pub fn current(&self) -> Option<Credential> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        // The slot holds plain data; a poisoned lock still has a usable value.
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.lock().clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Write {
                path: PathBuf::from("<memory>"),
                source: io::Error::other("writes disabled"),
            });
        }
        *self.lock() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Remove {
                path: PathBuf::from("<memory>"),
                source: io::Error::other("writes disabled"),
            });
        }
        *self.lock() = None;
        Ok(())
    }
}
