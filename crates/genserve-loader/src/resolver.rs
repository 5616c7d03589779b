use std::io;
use std::path::{Path, PathBuf};

use genserve_core::SpecializeError;

/// Resolves a code location to one loadable artifact.
///
/// A file is returned as-is. A directory resolves to its first entry by file
/// name, so the choice is stable across calls regardless of the order the
/// filesystem lists entries in. Nested directories are not searched.
///
/// The returned path is always absolute: the dynamic linker searches its
/// library path for names without a slash, which would open a different file
/// than the one checked here. Errors report `path` as given.
pub fn resolve(path: &Path) -> Result<PathBuf, SpecializeError> {
    let meta = std::fs::metadata(path).map_err(|source| stat_error(path, source))?;
    let concrete = std::path::absolute(path).map_err(|source| SpecializeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Ok(concrete);
    }

    let read_dir_error = |source: io::Error| SpecializeError::ReadDir {
        path: path.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&concrete).map_err(read_dir_error)? {
        names.push(entry.map_err(read_dir_error)?.file_name());
    }

    match names.into_iter().min() {
        Some(first) => Ok(concrete.join(first)),
        None => Err(SpecializeError::EmptyDirectory {
            path: path.to_path_buf(),
        }),
    }
}

fn stat_error(path: &Path, source: io::Error) -> SpecializeError {
    if source.kind() == io::ErrorKind::NotFound {
        SpecializeError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        SpecializeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
