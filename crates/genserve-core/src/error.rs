use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which half of the dynamic load failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailure {
    OpenFailed,
    EntryPointNotFound,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::OpenFailed => f.write_str("open failed"),
            LoadFailure::EntryPointNotFound => f.write_str("entry point not found"),
        }
    }
}

/// Every way a specialization attempt can fail.
///
/// Only `Conflict` is terminal; after any other variant the container is
/// still generic and accepts a corrected request.
#[derive(Debug, Error)]
pub enum SpecializeError {
    /// The code location does not exist.
    #[error("{}: not found", path.display())]
    NotFound { path: PathBuf },
    /// Any other failure to stat or list the code location.
    #[error("error checking plugin path {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The code location is a directory that could not be listed.
    #[error("error reading directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no files to load: {}", path.display())]
    EmptyDirectory { path: PathBuf },
    #[error("{reason}: {detail}")]
    Load { reason: LoadFailure, detail: String },
    /// The entry point is not one of the recognized shapes.
    #[error("entry point has unrecognized shape: {0}")]
    Adapt(String),
    #[error("Not a generic container")]
    Conflict,
}

impl SpecializeError {
    pub fn load(reason: LoadFailure, detail: impl Into<String>) -> Self {
        SpecializeError::Load { reason, detail: detail.into() }
    }

    /// `EmptyDirectory` belongs to the I/O class alongside `Io`.
    pub fn is_io(&self) -> bool {
        matches!(self, SpecializeError::Io { .. } | SpecializeError::EmptyDirectory { .. })
    }
}
