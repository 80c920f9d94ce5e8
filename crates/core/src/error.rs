use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing a transcript file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("transcript file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied reading file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors that can occur while walking the transcript tree.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("transcript root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("cannot access transcript root: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("home directory not found")]
    HomeDirNotFound,
}

impl DiscoveryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::RootNotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors returned by `WorkingDirValidator::validate`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("no allowed working directories are configured")]
    EmptyAllowlist,

    #[error("path is empty")]
    EmptyPath,

    #[error("path '{path}' is not within any allowed directory")]
    NotAllowed { path: String },

    #[error("failed to resolve path '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}
