//! Session credential providers
//!
//! The provider is passed to the client at construction. Code that learns the
//! session is no longer valid (a 401 from the backend) calls
//! [`CredentialsProvider::invalidate`] on it.

use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// Source of the bearer token sent with every request
pub trait CredentialsProvider: Send + Sync + Debug {
    /// Current token, if a session exists
    fn token(&self) -> Option<String>;

    /// Replace the stored token
    fn store(&self, token: &str) -> Result<()>;

    /// Forget the stored token
    fn invalidate(&self);

    /// Whether a token is present
    fn is_present(&self) -> bool {
        self.token().is_some()
    }
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialsProvider for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn store(&self, token: &str) -> Result<()> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    fn invalidate(&self) {
        *self.token.write() = None;
    }
}

/// Token persisted in a single file
///
/// The file holds the raw token; an empty or missing file means no session.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialsProvider for FileCredentials {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn store(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        debug!("Stored token in {}", self.path.display());
        Ok(())
    }

    fn invalidate(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed token file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove token file {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_credentials() {
        let creds = MemoryCredentials::new();
        assert!(!creds.is_present());

        creds.store("abc").unwrap();
        assert_eq!(creds.token().as_deref(), Some("abc"));

        creds.invalidate();
        assert_eq!(creds.token(), None);
    }

    #[test]
    fn test_file_credentials_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let creds = FileCredentials::new(dir.path().join("nested").join("token"));
        assert_eq!(creds.token(), None);

        creds.store("file-token").unwrap();
        assert_eq!(creds.token().as_deref(), Some("file-token"));

        creds.invalidate();
        assert!(!creds.path().exists());
        assert_eq!(creds.token(), None);

        // Invalidating twice is harmless
        creds.invalidate();
    }

    #[test]
    fn test_blank_token_file_means_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(FileCredentials::new(path).token(), None);
    }
}
