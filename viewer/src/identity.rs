//! Durable viewer identity.
//!
//! A viewer keeps one [`ViewerId`] across restarts so the relay can tell a
//! reconnect from a new arrival. Storage sits behind [`ViewerIdStore`]; the
//! binary uses a small file, tests use memory.

use std::cell::RefCell;
use std::io;
use std::path::PathBuf;

use frames::ViewerId;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read viewer id from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write viewer id to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub trait ViewerIdStore {
    /// The stored id, if any.
    ///
    /// # Errors
    ///
    /// Fails when the backing storage exists but cannot be read.
    fn load(&self) -> Result<Option<ViewerId>, IdentityError>;

    /// Persist `id`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Fails when the backing storage cannot be written.
    fn save(&self, id: &ViewerId) -> Result<(), IdentityError>;
}

/// Return the stored id, minting and saving a fresh one on first run.
///
/// # Errors
///
/// Propagates store read/write failures.
pub fn obtain(store: &impl ViewerIdStore) -> Result<ViewerId, IdentityError> {
    if let Some(id) = store.load()? {
        return Ok(id);
    }
    let id = ViewerId::generate();
    store.save(&id)?;
    info!(viewer = %id, "identity: created viewer id");
    Ok(id)
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One id per file, stored as a single line of text.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ViewerIdStore for FileStore {
    fn load(&self) -> Result<Option<ViewerId>, IdentityError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let id = ViewerId::new(raw);
                Ok((!id.is_empty()).then_some(id))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(IdentityError::Read { path: self.path.clone(), source }),
        }
    }

    fn save(&self, id: &ViewerId) -> Result<(), IdentityError> {
        let write_err = |source| IdentityError::Write { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.path, format!("{id}\n")).map_err(write_err)
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    id: RefCell<Option<ViewerId>>,
}

impl MemoryStore {
    #[must_use]
    pub fn with_id(id: ViewerId) -> Self {
        Self { id: RefCell::new(Some(id)) }
    }
}

impl ViewerIdStore for MemoryStore {
    fn load(&self) -> Result<Option<ViewerId>, IdentityError> {
        Ok(self.id.borrow().clone())
    }

    fn save(&self, id: &ViewerId) -> Result<(), IdentityError> {
        *self.id.borrow_mut() = Some(id.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
