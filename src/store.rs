//! Directory-keyed document store
//!
//! Every working directory gets its own subdirectory under the base directory,
//! named by a one-way hash of the directory path. Each subdirectory holds the
//! JSON documents owned by that directory (conversation context, permissions).

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Filesystem-safe identifier derived from an absolute directory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryKey(String);

impl DirectoryKey {
    /// Hash a path into its key. Pure: the same path always yields the same key.
    pub fn resolve(path: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        DirectoryKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DirectoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The documents kept per directory key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Context,
    Permissions,
}

impl DocumentKind {
    pub fn file_name(self) -> &'static str {
        match self {
            DocumentKind::Context => "context.json",
            DocumentKind::Permissions => "permissions.json",
        }
    }
}

/// Atomic write: write to a .tmp sibling then rename into place.
/// A crash mid-write leaves the previous generation intact.
fn atomic_write(path: &Path, contents: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct KeyedStore {
    base_dir: PathBuf,
}

impl KeyedStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn dir_for(&self, key: &DirectoryKey) -> PathBuf {
        self.base_dir.join(key.as_str())
    }

    pub fn path_for(&self, key: &DirectoryKey, kind: DocumentKind) -> PathBuf {
        self.dir_for(key).join(kind.file_name())
    }

    /// Load a document, or build the default when it has never been written.
    ///
    /// An existing file that fails to parse is an error: replacing it with the
    /// default would silently throw away user history.
    pub fn load_or<T, F>(&self, key: &DirectoryKey, kind: DocumentKind, default: F) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        let path = self.path_for(key, kind);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(default()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        serde_json::from_str(&content).map_err(|source| StoreError::Parse { path, source })
    }

    /// Serialize with indentation and write atomically, creating directories on demand.
    pub fn save<T: Serialize>(&self, key: &DirectoryKey, kind: DocumentKind, document: &T) -> Result<(), StoreError> {
        let dir = self.dir_for(key);
        fs::create_dir_all(&dir)?;

        let content = serde_json::to_string_pretty(document)?;
        atomic_write(&dir.join(kind.file_name()), &content)?;

        tracing::debug!(key = %key, file = kind.file_name(), "Saved document");
        Ok(())
    }

    /// Remove a document. Returns whether anything was deleted.
    pub fn remove(&self, key: &DirectoryKey, kind: DocumentKind) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key, kind)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        items: Vec<String>,
    }

    #[test]
    fn test_resolve_is_stable() {
        let a = DirectoryKey::resolve(Path::new("/home/user/project"));
        let b = DirectoryKey::resolve(Path::new("/home/user/project"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_distinguishes_paths() {
        let a = DirectoryKey::resolve(Path::new("/home/user/project"));
        let b = DirectoryKey::resolve(Path::new("/home/user/project2"));
        assert_ne!(a, b);
        assert!(!a.as_str().contains("project"));
    }

    #[test]
    fn test_load_missing_returns_default() {
        let tmp = TempDir::new().unwrap();
        let store = KeyedStore::new(tmp.path());
        let key = DirectoryKey::resolve(Path::new("/nowhere"));

        let doc: Doc = store.load_or(&key, DocumentKind::Context, Doc::default).unwrap();
        assert_eq!(doc, Doc::default());
        assert!(!store.dir_for(&key).exists());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = KeyedStore::new(tmp.path().join("nested/base"));
        let key = DirectoryKey::resolve(Path::new("/work"));
        let doc = Doc {
            items: vec!["héllo".into(), "世界".into()],
        };

        store.save(&key, DocumentKind::Permissions, &doc).unwrap();
        store.save(&key, DocumentKind::Permissions, &doc).unwrap();
        let loaded: Doc = store.load_or(&key, DocumentKind::Permissions, Doc::default).unwrap();
        assert_eq!(loaded, doc);

        let raw = fs::read_to_string(store.path_for(&key, DocumentKind::Permissions)).unwrap();
        assert!(raw.contains('\n'), "expected indented JSON");
        assert!(!store.dir_for(&key).join("permissions.json.tmp").exists());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = KeyedStore::new(tmp.path());
        let key = DirectoryKey::resolve(Path::new("/work"));
        fs::create_dir_all(store.dir_for(&key)).unwrap();
        fs::write(store.path_for(&key, DocumentKind::Context), "{not json").unwrap();

        let result: Result<Doc, _> = store.load_or(&key, DocumentKind::Context, Doc::default);
        assert!(matches!(result, Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = KeyedStore::new(tmp.path());
        let key = DirectoryKey::resolve(Path::new("/work"));

        assert!(!store.remove(&key, DocumentKind::Context).unwrap());
        store.save(&key, DocumentKind::Context, &Doc::default()).unwrap();
        assert!(store.remove(&key, DocumentKind::Context).unwrap());
        assert!(!store.remove(&key, DocumentKind::Context).unwrap());
    }
}
