use std::{io, path::PathBuf};
use thiserror::Error;

/// Which of the two user-supplied paths failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    ConfigFile,
    ModRoot,
}

impl PathKind {
    pub fn label(self) -> &'static str {
        match self {
            PathKind::ConfigFile => "game config file",
            PathKind::ModRoot => "mod directory",
        }
    }
}

/// Failures raised by the load order core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {}: {}", .kind.label(), .path.display())]
    PathInvalid { kind: PathKind, path: PathBuf },

    #[error("descriptor for {mod_id} unreadable: {reason}")]
    DescriptorParseFailure { mod_id: String, reason: String },

    #[error("backup of {} failed: {source}", .path.display())]
    BackupFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("position {index} out of range for {len} mod(s)")]
    IndexError { index: usize, len: usize },

    #[error("no load order loaded")]
    NotLoaded,
}
