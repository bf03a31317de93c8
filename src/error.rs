use std::{path::PathBuf, time::Duration};

pub type AtlasResult<T> = Result<T, AtlasError>;

#[derive(thiserror::Error, Debug)]
pub enum AtlasError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported render mode '{0}'")]
    UnsupportedMode(String),

    #[error("failed to decode texture '{name}' from '{}': {source}", path.display())]
    Decode {
        name: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("external tool '{program}' failed: {detail}")]
    ExternalTool { program: String, detail: String },

    #[error("{phase} phase timed out after {timeout:?} ({completed}/{total} jobs finished)")]
    PoolTimeout {
        phase: &'static str,
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AtlasError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    pub fn external_tool(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalTool {
            program: program.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error came from the worker pool's bounded wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::PoolTimeout { .. })
    }
}

/// Non-fatal build diagnostics. These are logged and reported; they never stop a build.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildWarning {
    /// No content root holds a file with this basename.
    UnresolvedTexture { name: String },
    /// A base tile slot had no decoded texture; its cell stays blank.
    MissingTile { slot: u32, name: String },
    /// A special tile overlay had no decoded texture.
    MissingSpecialTile { slot: u32, name: String },
    /// The slot index addresses a row below the canvas.
    CellOutsideCanvas { slot: u32 },
    /// Some registered tag did not resolve to an input file.
    TagsMismatch,
    /// The previous snapshot references inputs that are no longer referenced.
    UnusedLoadedReferences,
    /// A built artifact was gone when publishing.
    MissingArtifact { path: PathBuf },
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::UnresolvedTexture { name } => {
                write!(f, "texture '{name}' not found in any content root")
            }
            BuildWarning::MissingTile { slot, name } => {
                write!(f, "missing tile texture '{name}' (tile {slot})")
            }
            BuildWarning::MissingSpecialTile { slot, name } => {
                write!(f, "missing special tile texture '{name}' (special tile {slot})")
            }
            BuildWarning::CellOutsideCanvas { slot } => {
                write!(f, "tile {slot} falls outside the atlas grid")
            }
            BuildWarning::TagsMismatch => f.write_str("tags mismatch"),
            BuildWarning::UnusedLoadedReferences => {
                f.write_str("not all loaded references are still in use")
            }
            BuildWarning::MissingArtifact { path } => {
                write!(f, "missing artifact '{}'", path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            AtlasError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            AtlasError::evaluation("x")
                .to_string()
                .contains("evaluation error:")
        );
        assert!(
            AtlasError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
        assert_eq!(
            AtlasError::UnsupportedMode("wallmounted".to_string()).to_string(),
            "unsupported render mode 'wallmounted'"
        );
        assert_eq!(
            AtlasError::external_tool("apngasm", "exit status: 1").to_string(),
            "external tool 'apngasm' failed: exit status: 1"
        );
    }

    #[test]
    fn timeout_reports_progress() {
        let err = AtlasError::PoolTimeout {
            phase: "render",
            timeout: Duration::from_secs(120),
            completed: 3,
            total: 8,
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("render phase timed out"));
        assert!(err.to_string().contains("3/8"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = AtlasError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
        assert!(!err.is_timeout());
    }
}
