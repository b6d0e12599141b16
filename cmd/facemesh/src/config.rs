//! Optional YAML defaults for the command line.
//!
//! Looked up at `--config`, else `~/.facecap/config.yaml`. Every value can be
//! overridden by the matching flag.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default base directory name under the home directory.
pub const DEFAULT_BASE_DIR: &str = ".facecap";

/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graph: GraphSection,
    pub pipeline: PipelineSection,
    pub assets: AssetsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Text-format graph replacing the built-in face mesh graph.
    pub config: Option<PathBuf>,
    pub num_faces: Option<i32>,
    pub poll_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_fps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsSection {
    /// Root directory for the resource manager.
    pub root: Option<PathBuf>,
}

/// `~/.facecap/config.yaml`, if the home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
}

/// Loads the configuration.
///
/// An explicit path must exist. The default path is optional; a missing
/// file yields the defaults.
pub fn load_config(custom_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = match custom_path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(AppConfig::default()),
        },
    };
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "graph:\n  config: /tmp/face.pbtxt\n  num_faces: 2\n  poll_timeout_ms: 50\n\
             pipeline:\n  max_fps: 15\n\
             assets:\n  root: /opt/mediapipe\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.graph.config, Some(PathBuf::from("/tmp/face.pbtxt")));
        assert_eq!(cfg.graph.num_faces, Some(2));
        assert_eq!(cfg.graph.poll_timeout_ms, Some(50));
        assert_eq!(cfg.pipeline.max_fps, Some(15));
        assert_eq!(cfg.assets.root, Some(PathBuf::from("/opt/mediapipe")));
    }

    #[test]
    fn missing_sections_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pipeline:\n  max_fps: 5\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.pipeline.max_fps, Some(5));
        assert_eq!(cfg.graph, GraphSection::default());
    }

    #[test]
    fn empty_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn malformed_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "graph: [1, 2").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
