use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Owned snapshot of an inbound request, handed to the loaded function.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub id: u64,
    pub method: String,
    /// Path plus query.
    pub uri: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Bytes,
    cancelled: Arc<AtomicBool>,
}

impl HandlerRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            method: method.into(),
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Flag raised by the transport when the client disconnects mid-call.
    pub fn cancel_flag(&self) -> &Arc<AtomicBool> {
        &self.cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Response produced by the loaded function, relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl Default for HandlerResponse {
    fn default() -> Self {
        Self { status: 200, headers: Vec::new(), body: Vec::new() }
    }
}

impl HandlerResponse {
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn write(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }
}

/// The canonical request-handling capability every entry point is adapted to.
pub trait Handler: Send + Sync {
    fn serve(&self, req: &HandlerRequest, resp: &mut HandlerResponse);
}

impl<F> Handler for F
where
    F: Fn(&HandlerRequest, &mut HandlerResponse) + Send + Sync,
{
    fn serve(&self, req: &HandlerRequest, resp: &mut HandlerResponse) {
        self(req, resp)
    }
}

pub type LoadedHandler = Arc<dyn Handler>;
