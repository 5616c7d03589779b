//! # genserve-loader: Native Function Loading
//!
//! Resolves a code location, opens it as a shared library and adapts the
//! exported [`genserve_abi::EntryPoint`] into a [`genserve_core::LoadedHandler`].

pub mod adapter;
pub mod library;
pub mod resolver;

use std::path::{Path, PathBuf};

use genserve_core::{CodeLoader, LoadedHandler, SpecializeError};

pub use adapter::{adapt, EntryShape};
pub use library::RawEntryPoint;
pub use resolver::resolve;

/// `CodeLoader` backed by the host's dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl CodeLoader for NativeLoader {
    type EntryPoint = RawEntryPoint;

    fn resolve(&self, location: &Path) -> Result<PathBuf, SpecializeError> {
        resolver::resolve(location)
    }

    fn load(&self, artifact: &Path, entry_point: &str) -> Result<RawEntryPoint, SpecializeError> {
        RawEntryPoint::open(artifact, entry_point)
    }

    fn adapt(&self, raw: RawEntryPoint) -> Result<LoadedHandler, SpecializeError> {
        adapter::adapt(raw)
    }
}
