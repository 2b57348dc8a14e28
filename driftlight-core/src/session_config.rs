//! Small persisted session state, read at orchestrator construction and
//! written back on clean shutdown. Grounded on the broader example pack's
//! convention of `serde`/`serde_json` for this kind of thing rather than
//! any scene-file format — the reference renderer itself has no
//! persistence layer.

use std::path::{Path, PathBuf};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::engine_warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub scene_path: Option<PathBuf>,
    pub last_camera_position: Vec3,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { scene_path: None, last_camera_position: Vec3::ZERO }
    }
}

impl SessionConfig {
    /// Load from `path`. A missing or corrupt file is non-fatal: logs a
    /// warning and falls back to [`Default`].
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    engine_warn!("driftlight::session_config", "failed to parse {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::Error::InitializationFailed(e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::Error::InitializationFailed(e.to_string()))?;
        std::fs::write(path, contents)
            .map_err(|e| crate::error::Error::InitializationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = SessionConfig::load("/nonexistent/path/driftlight-session.json");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("driftlight-test-{}", std::process::id()));
        let path = dir.join("session.json");

        let mut config = SessionConfig::default();
        config.scene_path = Some(PathBuf::from("scenes/demo.dlscene"));
        config.last_camera_position = Vec3::new(1.0, 2.0, 3.0);
        config.save(&path).unwrap();

        let loaded = SessionConfig::load(&path);
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).ok();
    }
}
