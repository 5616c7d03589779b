use std::path::{Path, PathBuf};

use genserve_abi::EntryPoint;
use genserve_core::{LoadFailure, SpecializeError};
use libloading::Library;

/// An opened function artifact and the descriptor exported by it.
///
/// Owns the `Library`, so the descriptor and every function pointer it names
/// stay mapped for as long as this value (or the handler adapted from it)
/// lives. In practice that is the rest of the process.
pub struct RawEntryPoint {
    descriptor: *const EntryPoint,
    name: String,
    artifact: PathBuf,
    _library: Option<Library>,
}

// # Safety: the descriptor is an immutable exported static (`EntryPoint: Sync`)
// kept alive by `_library`.
unsafe impl Send for RawEntryPoint {}
unsafe impl Sync for RawEntryPoint {}

impl RawEntryPoint {
    /// Opens `artifact` and looks up `name` as an exported descriptor.
    pub fn open(artifact: &Path, name: &str) -> Result<Self, SpecializeError> {
        // # Safety: running the artifact's initializers is the point of
        // specialization; the container does not sandbox loaded code.
        let library = unsafe { Library::new(artifact) }
            .map_err(|e| SpecializeError::load(LoadFailure::OpenFailed, e.to_string()))?;

        if name.is_empty() {
            return Err(SpecializeError::load(
                LoadFailure::EntryPointNotFound,
                "empty entry point name",
            ));
        }

        let descriptor = {
            // # Safety: the symbol is declared as a data export of type
            // `EntryPoint`; its shape is validated by the adapter before use.
            let symbol = unsafe { library.get::<*const EntryPoint>(name.as_bytes()) }
                .map_err(|e| SpecializeError::load(LoadFailure::EntryPointNotFound, e.to_string()))?;
            *symbol
        };
        if descriptor.is_null() {
            return Err(SpecializeError::load(
                LoadFailure::EntryPointNotFound,
                format!("symbol {} resolves to null", name),
            ));
        }

        tracing::debug!("resolved entry point {} in {}", name, artifact.display());
        Ok(Self {
            descriptor,
            name: name.to_string(),
            artifact: artifact.to_path_buf(),
            _library: Some(library),
        })
    }

    /// Wraps a descriptor linked into the running binary.
    pub fn from_static(descriptor: &'static EntryPoint, name: &str) -> Self {
        Self {
            descriptor,
            name: name.to_string(),
            artifact: PathBuf::new(),
            _library: None,
        }
    }

    pub fn descriptor(&self) -> &EntryPoint {
        // # Safety: non-null, checked in `open`; `from_static` takes a reference.
        unsafe { &*self.descriptor }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }
}

impl std::fmt::Debug for RawEntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawEntryPoint")
            .field("name", &self.name)
            .field("artifact", &self.artifact)
            .finish()
    }
}
