//! Reference store manager: the directory of reference images and the
//! cached list of known identities derived from it.

use facegate_core::reference::{scan_reference_dir, SUPPORTED_EXTENSIONS};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid identity name {0:?}")]
    InvalidIdentity(String),
    #[error("unsupported image extension {0:?} (expected one of jpg, jpeg, png)")]
    UnsupportedExtension(String),
    #[error("reference store {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Directory-backed registry of identities.
///
/// The cached identity list is rebuilt wholesale on `refresh()`; readers see
/// either the old or the new list, never a mix.
pub struct Registry {
    dir: PathBuf,
    identities: RwLock<Vec<String>>,
}

impl Registry {
    /// Open the store at `dir`, creating it if absent, and build the identity cache.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| RegistryError::Io {
            path: dir.clone(),
            source,
        })?;
        let registry = Self {
            dir,
            identities: RwLock::new(Vec::new()),
        };
        registry.refresh()?;
        Ok(registry)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rescan the directory and replace the cached identity list.
    ///
    /// The write lock is held across the scan; refreshes are serialised.
    pub fn refresh(&self) -> Result<(), RegistryError> {
        let mut identities = self.identities.write().unwrap_or_else(|e| e.into_inner());
        let people = self.scan_people()?;
        tracing::debug!(count = people.len(), "identity list refreshed");
        *identities = people;
        Ok(())
    }

    /// Store `image` as `<identity>.<extension>` (overwriting) and refresh the cache.
    pub fn register(&self, identity: &str, image: &[u8], extension: &str) -> Result<String, RegistryError> {
        validate_identity(identity)?;
        let ext = extension.trim_start_matches('.');
        if !SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return Err(RegistryError::UnsupportedExtension(extension.to_string()));
        }

        let path = self.dir.join(format!("{identity}.{ext}"));
        std::fs::write(&path, image).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(identity, path = %path.display(), bytes = image.len(), "reference image stored");

        self.refresh()?;
        Ok(identity.to_string())
    }

    /// Cached identity list; not rescanned.
    pub fn list_identities(&self) -> Vec<String> {
        self.identities.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fresh directory scan, independent of the cache.
    pub fn scan_people(&self) -> Result<Vec<String>, RegistryError> {
        let refs = scan_reference_dir(&self.dir).map_err(|source| RegistryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        Ok(refs.into_iter().map(|r| r.identity).collect())
    }
}

/// Labels become file names, so anything that would escape the store is refused.
fn validate_identity(identity: &str) -> Result<(), RegistryError> {
    let bad = identity.is_empty()
        || identity == "."
        || identity == ".."
        || identity.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(RegistryError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("known_faces");
        let registry = Registry::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(registry.list_identities().is_empty());
    }

    #[test]
    fn test_register_then_list() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();

        let stored = registry.register("alice", b"jpeg bytes", ".jpg").unwrap();
        assert_eq!(stored, "alice");
        assert_eq!(registry.list_identities(), vec!["alice"]);
        assert_eq!(std::fs::read(tmp.path().join("alice.jpg")).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_register_overwrites_same_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        registry.register("bob", b"old", "png").unwrap();
        registry.register("bob", b"new", "png").unwrap();
        assert_eq!(std::fs::read(tmp.path().join("bob.png")).unwrap(), b"new");
        assert_eq!(registry.list_identities(), vec!["bob"]);
    }

    #[test]
    fn test_same_label_different_extensions_keeps_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        registry.register("alice", b"a", "png").unwrap();
        registry.register("alice", b"b", "jpg").unwrap();

        assert!(tmp.path().join("alice.png").exists());
        assert!(tmp.path().join("alice.jpg").exists());
        assert_eq!(registry.list_identities(), vec!["alice"]);
    }

    #[test]
    fn test_cache_is_stale_until_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("carol.jpg"), b"x").unwrap();

        assert!(registry.list_identities().is_empty());
        assert_eq!(registry.scan_people().unwrap(), vec!["carol"]);

        registry.refresh().unwrap();
        assert_eq!(registry.list_identities(), vec!["carol"]);
    }

    #[test]
    fn test_concurrent_registrations_all_listed() {
        for _ in 0..50 {
            let tmp = tempfile::tempdir().unwrap();
            let registry = Registry::open(tmp.path()).unwrap();

            std::thread::scope(|s| {
                for i in 0..8 {
                    let registry = &registry;
                    s.spawn(move || registry.register(&format!("p{i}"), b"x", "jpg").unwrap());
                }
            });

            let cached = registry.list_identities();
            assert_eq!(cached.len(), 8);
            assert_eq!(cached, registry.scan_people().unwrap());
        }
    }

    #[test]
    fn test_register_rejects_path_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        for name in ["", ".", "..", "../evil", "a/b", "a\\b"] {
            let err = registry.register(name, b"x", "jpg").unwrap_err();
            assert!(matches!(err, RegistryError::InvalidIdentity(_)), "{name:?}");
        }
    }

    #[test]
    fn test_register_rejects_unsupported_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::open(tmp.path()).unwrap();
        let err = registry.register("dave", b"x", ".gif").unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedExtension(_)));
        assert!(!tmp.path().join("dave.gif").exists());
    }
}
