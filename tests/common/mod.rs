//! Shared fixtures: a scripted `CodeLoader` and filesystem helpers.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use genserve_core::{
    CodeLoader, HandlerRequest, HandlerResponse, LoadFailure, LoadedHandler, SpecializeError,
};
use http_body_util::{BodyExt, Full};
use hyper::Response;
use tempfile::TempDir;

/// Loader whose behaviour is picked by entry-point name:
///
/// - `Handler`: replies 201 "ok"
/// - `Echo`: replies 200 with the request body
/// - `Missing`: load fails with "entry point not found"
/// - anything else: adapt fails (unrecognized shape)
pub struct FakeLoader {
    pub loads: AtomicUsize,
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeLoader for FakeLoader {
    type EntryPoint = String;

    fn resolve(&self, location: &Path) -> Result<PathBuf, SpecializeError> {
        genserve_loader::resolve(location)
    }

    fn load(&self, _artifact: &Path, entry_point: &str) -> Result<String, SpecializeError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match entry_point {
            "Missing" => Err(SpecializeError::load(
                LoadFailure::EntryPointNotFound,
                "undefined symbol: Missing",
            )),
            name => Ok(name.to_string()),
        }
    }

    fn adapt(&self, raw: String) -> Result<LoadedHandler, SpecializeError> {
        let calls = self.calls.clone();
        match raw.as_str() {
            "Handler" => Ok(Arc::new(move |_: &HandlerRequest, resp: &mut HandlerResponse| {
                calls.fetch_add(1, Ordering::SeqCst);
                resp.set_status(201);
                resp.write(b"ok");
            })),
            "Echo" => Ok(Arc::new(move |req: &HandlerRequest, resp: &mut HandlerResponse| {
                calls.fetch_add(1, Ordering::SeqCst);
                resp.add_header("X-Uri", req.uri.as_str());
                resp.write(&req.body);
            })),
            other => Err(SpecializeError::Adapt(format!("{} is not a handler", other))),
        }
    }
}

/// A directory holding one artifact, as the fetcher would leave it.
pub fn artifact_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("user.so"), b"artifact").unwrap();
    dir
}

pub async fn body_of(resp: Response<Full<Bytes>>) -> Bytes {
    resp.into_body().collect().await.unwrap().to_bytes()
}
