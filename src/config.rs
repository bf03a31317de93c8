use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::error::{AtlasError, AtlasResult};

/// Environment variable holding a platform path list that replaces `content_roots`.
pub const CONTENT_ROOTS_ENV: &str = "NODE_ATLAS_CONTENT_ROOTS";

/// Upper bound for `phase_timeout_secs` (one day).
pub const MAX_PHASE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Texture roots, scanned in order. A later root wins basename collisions.
    pub content_roots: Vec<PathBuf>,
    /// Glob, relative to each content root, selecting texture files.
    pub texture_glob: String,
    /// Per-node frame sequences land under `<frames_dir>/<mod>/<node>/`.
    pub frames_dir: PathBuf,
    /// Scaled frames and combined animations land under `<work_dir>/<mod>/<node>/`.
    pub work_dir: PathBuf,
    /// Change-gate snapshots live under `<state_dir>/<mod>/<node>.json`.
    pub state_dir: PathBuf,
    pub dist_dir: Option<PathBuf>,
    pub workers: usize,
    pub phase_timeout_secs: u64,
    /// Per-frame display delay handed to the animation assembler.
    pub frame_delay: u32,
    pub tools: ToolConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            content_roots: Vec::new(),
            texture_glob: "**/textures/*.png".to_string(),
            frames_dir: PathBuf::from("tmp/assets/images/nodes"),
            work_dir: PathBuf::from("tmp/tmp/assets/images/nodes"),
            state_dir: PathBuf::from("tmp/atlas-state"),
            dist_dir: None,
            workers: 8,
            phase_timeout_secs: 120,
            frame_delay: 100,
            tools: ToolConfig::default(),
        }
    }
}

/// Program names for the external raster tools.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub scaler: String,
    pub apng_assembler: String,
    pub gif_converter: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            scaler: "convert".to_string(),
            apng_assembler: "apngasm".to_string(),
            gif_converter: "apng2gif".to_string(),
        }
    }
}

impl ToolConfig {
    pub fn programs(&self) -> [&str; 3] {
        [
            self.scaler.as_str(),
            self.apng_assembler.as_str(),
            self.gif_converter.as_str(),
        ]
    }
}

impl AtlasConfig {
    pub fn from_json_file(path: &Path) -> AtlasResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            AtlasError::serde(format!("parse config '{}': {e}", path.display()))
        })
    }

    /// Overlay environment settings onto this config.
    pub fn with_env(mut self) -> Self {
        if let Some(roots) = std::env::var_os(CONTENT_ROOTS_ENV) {
            self.content_roots = std::env::split_paths(&roots)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        self
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }

    pub fn validate(&self) -> AtlasResult<()> {
        if self.workers == 0 {
            return Err(AtlasError::validation("workers must be >= 1"));
        }
        if self.phase_timeout_secs == 0 {
            return Err(AtlasError::validation("phase_timeout_secs must be >= 1"));
        }
        if self.phase_timeout_secs > MAX_PHASE_TIMEOUT_SECS {
            return Err(AtlasError::validation(format!(
                "phase_timeout_secs must be <= {MAX_PHASE_TIMEOUT_SECS}"
            )));
        }
        if self.frame_delay == 0 {
            return Err(AtlasError::validation("frame_delay must be >= 1"));
        }
        for (field, dir) in [
            ("frames_dir", &self.frames_dir),
            ("work_dir", &self.work_dir),
            ("state_dir", &self.state_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(AtlasError::validation(format!("{field} must be non-empty")));
            }
        }
        glob::Pattern::new(&self.texture_glob).map_err(|e| {
            AtlasError::validation(format!("texture_glob '{}': {e}", self.texture_glob))
        })?;
        for program in self.tools.programs() {
            if program.trim().is_empty() {
                return Err(AtlasError::validation("tool program names must be non-empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let cfg = AtlasConfig::default();
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.phase_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.frame_delay, 100);
        assert_eq!(cfg.tools.programs(), ["convert", "apngasm", "apng2gif"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AtlasConfig = serde_json::from_str(
            r#"{"content_roots": ["game/mods", "modpack"], "workers": 2, "tools": {"scaler": "magick"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.content_roots.len(), 2);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.tools.scaler, "magick");
        assert_eq!(cfg.tools.apng_assembler, "apngasm");
        assert_eq!(cfg.texture_glob, "**/textures/*.png");
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = AtlasConfig {
            workers: 0,
            ..AtlasConfig::default()
        };
        assert!(cfg.validate().is_err());

        cfg.workers = 8;
        cfg.phase_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        cfg.phase_timeout_secs = u64::MAX;
        assert!(cfg.validate().is_err());
        cfg.phase_timeout_secs = MAX_PHASE_TIMEOUT_SECS;
        cfg.validate().unwrap();

        cfg.phase_timeout_secs = 120;
        cfg.texture_glob = "**/[".to_string();
        assert!(cfg.validate().is_err());

        cfg.texture_glob = "*.png".to_string();
        cfg.work_dir = PathBuf::new();
        assert!(cfg.validate().is_err());
    }
}
