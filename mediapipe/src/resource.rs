//! Asset lookup for graph calculators (models, label maps).
//!
//! A [`ResourceManager`] supplies the bytes of the assets a graph needs at
//! start. Two implementations are provided: one reading files under a
//! directory, one backed by a process-wide registry of embedded assets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::MediapipeError;

/// Supplies asset bytes by the path the graph config refers to.
pub trait ResourceManager: Send + Sync {
    fn read(&self, name: &str) -> Result<Vec<u8>, MediapipeError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Reads assets relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirResourceManager {
    root: PathBuf,
}

impl DirResourceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceManager for DirResourceManager {
    fn read(&self, name: &str) -> Result<Vec<u8>, MediapipeError> {
        let relative = Path::new(name);
        if relative.is_absolute() || relative.components().any(|c| c.as_os_str() == "..") {
            return Err(MediapipeError::Resource(
                name.to_string(),
                "path escapes the asset root".into(),
            ));
        }
        let path = self.root.join(relative);
        std::fs::read(&path)
            .map_err(|e| MediapipeError::Resource(name.to_string(), format!("{}: {e}", path.display())))
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}

static REGISTRY: Lazy<Mutex<HashMap<String, &'static [u8]>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers an embedded asset under `name`.
/// Registering the same name twice replaces the previous data.
pub fn register_asset(name: &str, data: &'static [u8]) {
    REGISTRY.lock().insert(name.to_string(), data);
}

/// Returns the names of all registered assets, sorted.
pub fn list_assets() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY.lock().keys().cloned().collect();
    names.sort();
    names
}

/// Returns true if an asset is registered under `name`.
pub fn is_registered(name: &str) -> bool {
    REGISTRY.lock().contains_key(name)
}

/// Serves assets from the process-wide registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryResourceManager;

impl ResourceManager for RegistryResourceManager {
    fn read(&self, name: &str) -> Result<Vec<u8>, MediapipeError> {
        REGISTRY
            .lock()
            .get(name)
            .map(|data| data.to_vec())
            .ok_or_else(|| MediapipeError::Resource(name.to_string(), "not registered".into()))
    }

    fn describe(&self) -> String {
        "registry".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_reads_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/face.tflite"), b"tflite").unwrap();

        let rm = DirResourceManager::new(dir.path());
        assert_eq!(rm.read("models/face.tflite").unwrap(), b"tflite");
        assert!(rm.describe().starts_with("dir:"));
    }

    #[test]
    fn dir_missing_file_names_asset() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirResourceManager::new(dir.path()).read("nope.tflite").unwrap_err();
        assert!(matches!(err, MediapipeError::Resource(ref name, _) if name == "nope.tflite"));
    }

    #[test]
    fn dir_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let rm = DirResourceManager::new(dir.path());
        assert!(rm.read("../secret").is_err());
        assert!(rm.read("/etc/passwd").is_err());
    }

    #[test]
    fn registry_roundtrip() {
        register_asset("test/registry_roundtrip.bin", b"abc");
        assert!(is_registered("test/registry_roundtrip.bin"));
        assert!(list_assets().contains(&"test/registry_roundtrip.bin".to_string()));
        assert_eq!(
            RegistryResourceManager.read("test/registry_roundtrip.bin").unwrap(),
            b"abc"
        );
        assert!(RegistryResourceManager.read("test/unregistered.bin").is_err());
    }
}
