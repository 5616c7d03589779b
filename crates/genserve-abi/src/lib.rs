//! # genserve-abi: Function Entry-Point ABI
//!
//! The C-compatible contract between the generic container and a function
//! artifact (a `cdylib`). The artifact exports one [`EntryPoint`] descriptor
//! under a symbol name chosen at specialization time ("Handler" by default).
//!
//! ## Closed Shape Set
//! The descriptor's `shape` tag selects exactly one of three callable forms:
//!
//! | Tag | Form |
//! |---|---|
//! | [`SHAPE_HANDLER_OBJECT`] | object pointer + `invoke(this, req, w)` |
//! | [`SHAPE_HANDLER_FN`] | `handler(req, w)` |
//! | [`SHAPE_CONTEXT_HANDLER_FN`] | `context_handler(ctx, req, w)` |
//!
//! Any other tag is rejected by the container. Adding a shape means bumping
//! [`ABI_VERSION`].
//!
//! ## Writing a function
//! ```ignore
//! use genserve_abi::{Request, ResponseWriter};
//!
//! fn hello(_req: &Request<'_>, w: &mut ResponseWriter<'_>) {
//!     w.set_status(201);
//!     w.write(b"ok");
//! }
//!
//! genserve_abi::export_handler!(Handler, hello);
//! ```
#![cfg_attr(not(test), no_std)]

use core::ffi::c_void;
use core::sync::atomic::{AtomicBool, Ordering};

/// Version of the descriptor layout. The container refuses any other value.
pub const ABI_VERSION: u32 = 1;

pub const SHAPE_HANDLER_OBJECT: u32 = 1;
pub const SHAPE_HANDLER_FN: u32 = 2;
pub const SHAPE_CONTEXT_HANDLER_FN: u32 = 3;

/// A borrowed byte string crossing the FFI boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl RawStr {
    pub const fn empty() -> Self {
        Self { ptr: core::ptr::null(), len: 0 }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { ptr: bytes.as_ptr(), len: bytes.len() }
    }

    /// # Safety
    /// `ptr`/`len` must describe memory that stays live and unmodified for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.ptr.is_null() || self.len == 0 {
            return &[];
        }
        core::slice::from_raw_parts(self.ptr, self.len)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawHeader {
    pub name: RawStr,
    pub value: RawStr,
}

/// The inbound request as seen by a function. Valid only for the duration of
/// one call.
#[repr(C)]
#[derive(Debug)]
pub struct RawRequest {
    pub method: RawStr,
    pub uri: RawStr,
    pub headers: *const RawHeader,
    pub headers_len: usize,
    pub body: RawStr,
}

/// Callback table the container hands to a function for producing its response.
#[repr(C)]
pub struct RawResponseWriter {
    pub state: *mut c_void,
    pub set_status: unsafe extern "C" fn(state: *mut c_void, status: u16),
    pub add_header: unsafe extern "C" fn(state: *mut c_void, name: RawStr, value: RawStr),
    pub write: unsafe extern "C" fn(state: *mut c_void, chunk: RawStr),
}

/// Per-request context derived by the container at call time.
#[repr(C)]
#[derive(Debug)]
pub struct RawContext {
    pub request_id: u64,
    /// Raised by the container once the client has gone away.
    pub cancelled: *const AtomicBool,
}

pub type HandlerFn = unsafe extern "C" fn(req: *const RawRequest, w: *const RawResponseWriter);
pub type ContextHandlerFn =
    unsafe extern "C" fn(ctx: *const RawContext, req: *const RawRequest, w: *const RawResponseWriter);
pub type InvokeFn =
    unsafe extern "C" fn(this: *const c_void, req: *const RawRequest, w: *const RawResponseWriter);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HandlerObject {
    pub this: *const c_void,
    pub invoke: Option<InvokeFn>,
}

impl HandlerObject {
    pub const fn null() -> Self {
        Self { this: core::ptr::null(), invoke: None }
    }
}

/// The exported descriptor. Only the payload field matching `shape` is read.
#[repr(C)]
#[derive(Debug)]
pub struct EntryPoint {
    pub abi_version: u32,
    pub shape: u32,
    pub object: HandlerObject,
    pub handler: Option<HandlerFn>,
    pub context_handler: Option<ContextHandlerFn>,
}

// # Safety: descriptors are immutable statics; `object.this` must point to a
// `Sync` value (enforced by `ServeHttp: Sync` in `export_handler_object!`).
unsafe impl Sync for EntryPoint {}

impl EntryPoint {
    pub const fn handler(f: HandlerFn) -> Self {
        Self {
            abi_version: ABI_VERSION,
            shape: SHAPE_HANDLER_FN,
            object: HandlerObject::null(),
            handler: Some(f),
            context_handler: None,
        }
    }

    pub const fn context_handler(f: ContextHandlerFn) -> Self {
        Self {
            abi_version: ABI_VERSION,
            shape: SHAPE_CONTEXT_HANDLER_FN,
            object: HandlerObject::null(),
            handler: None,
            context_handler: Some(f),
        }
    }

    pub const fn object(this: *const c_void, invoke: InvokeFn) -> Self {
        Self {
            abi_version: ABI_VERSION,
            shape: SHAPE_HANDLER_OBJECT,
            object: HandlerObject { this, invoke: Some(invoke) },
            handler: None,
            context_handler: None,
        }
    }
}

/// Function-side view of a [`RawRequest`].
pub struct Request<'a> {
    raw: &'a RawRequest,
}

impl<'a> Request<'a> {
    /// # Safety
    /// `raw` must be null or point to a request that outlives `'a`.
    pub unsafe fn from_raw(raw: *const RawRequest) -> Option<Self> {
        raw.as_ref().map(|raw| Self { raw })
    }

    pub fn method(&self) -> &'a str {
        core::str::from_utf8(unsafe { self.raw.method.as_bytes() }).unwrap_or("")
    }

    /// Path plus query, exactly as received.
    pub fn uri(&self) -> &'a str {
        core::str::from_utf8(unsafe { self.raw.uri.as_bytes() }).unwrap_or("")
    }

    pub fn path(&self) -> &'a str {
        let uri = self.uri();
        uri.split_once('?').map_or(uri, |(path, _)| path)
    }

    pub fn query(&self) -> Option<&'a str> {
        self.uri().split_once('?').map(|(_, query)| query)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        let headers: &'a [RawHeader] = if self.raw.headers.is_null() {
            &[]
        } else {
            unsafe { core::slice::from_raw_parts(self.raw.headers, self.raw.headers_len) }
        };
        headers
            .iter()
            .map(|h| unsafe { (h.name.as_bytes(), h.value.as_bytes()) })
    }

    /// Case-insensitive lookup of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&'a [u8]> {
        self.headers()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v)
    }

    pub fn body(&self) -> &'a [u8] {
        unsafe { self.raw.body.as_bytes() }
    }
}

/// Function-side view of a [`RawResponseWriter`].
pub struct ResponseWriter<'a> {
    raw: &'a RawResponseWriter,
}

impl<'a> ResponseWriter<'a> {
    /// # Safety
    /// `raw` must be null or point to a writer that outlives `'a`.
    pub unsafe fn from_raw(raw: *const RawResponseWriter) -> Option<Self> {
        raw.as_ref().map(|raw| Self { raw })
    }

    pub fn set_status(&mut self, status: u16) {
        unsafe { (self.raw.set_status)(self.raw.state, status) }
    }

    pub fn add_header(&mut self, name: &str, value: &[u8]) {
        unsafe {
            (self.raw.add_header)(self.raw.state, RawStr::from_bytes(name.as_bytes()), RawStr::from_bytes(value))
        }
    }

    pub fn write(&mut self, chunk: &[u8]) {
        unsafe { (self.raw.write)(self.raw.state, RawStr::from_bytes(chunk)) }
    }
}

/// Function-side view of a [`RawContext`].
pub struct Context<'a> {
    raw: &'a RawContext,
}

impl<'a> Context<'a> {
    /// # Safety
    /// `raw` must be null or point to a context that outlives `'a`.
    pub unsafe fn from_raw(raw: *const RawContext) -> Option<Self> {
        raw.as_ref().map(|raw| Self { raw })
    }

    pub fn request_id(&self) -> u64 {
        self.raw.request_id
    }

    pub fn is_cancelled(&self) -> bool {
        match unsafe { self.raw.cancelled.as_ref() } {
            Some(flag) => flag.load(Ordering::Acquire),
            None => false,
        }
    }
}

/// Implemented by values exported through [`export_handler_object!`].
pub trait ServeHttp: Sync {
    fn serve_http(&self, req: &Request<'_>, w: &mut ResponseWriter<'_>);
}

/// Exports `fn(&Request, &mut ResponseWriter)` as a bare-function entry point.
#[macro_export]
macro_rules! export_handler {
    ($symbol:ident, $func:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::EntryPoint = {
            unsafe extern "C" fn __genserve_handler(
                req: *const $crate::RawRequest,
                w: *const $crate::RawResponseWriter,
            ) {
                if let (Some(req), Some(mut w)) =
                    unsafe { ($crate::Request::from_raw(req), $crate::ResponseWriter::from_raw(w)) }
                {
                    $func(&req, &mut w);
                }
            }
            $crate::EntryPoint::handler(__genserve_handler)
        };
    };
}

/// Exports `fn(&Context, &Request, &mut ResponseWriter)` as a context-aware entry point.
#[macro_export]
macro_rules! export_context_handler {
    ($symbol:ident, $func:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::EntryPoint = {
            unsafe extern "C" fn __genserve_context_handler(
                ctx: *const $crate::RawContext,
                req: *const $crate::RawRequest,
                w: *const $crate::RawResponseWriter,
            ) {
                if let (Some(ctx), Some(req), Some(mut w)) = unsafe {
                    (
                        $crate::Context::from_raw(ctx),
                        $crate::Request::from_raw(req),
                        $crate::ResponseWriter::from_raw(w),
                    )
                } {
                    $func(&ctx, &req, &mut w);
                }
            }
            $crate::EntryPoint::context_handler(__genserve_context_handler)
        };
    };
}

/// Exports a `static` implementing [`ServeHttp`] as a handler-object entry point.
#[macro_export]
macro_rules! export_handler_object {
    ($symbol:ident, $object:ident : $ty:ty) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::EntryPoint = {
            unsafe extern "C" fn __genserve_invoke(
                this: *const ::core::ffi::c_void,
                req: *const $crate::RawRequest,
                w: *const $crate::RawResponseWriter,
            ) {
                let this = unsafe { &*(this as *const $ty) };
                if let (Some(req), Some(mut w)) =
                    unsafe { ($crate::Request::from_raw(req), $crate::ResponseWriter::from_raw(w)) }
                {
                    <$ty as $crate::ServeHttp>::serve_http(this, &req, &mut w);
                }
            }
            $crate::EntryPoint::object(
                &$object as *const $ty as *const ::core::ffi::c_void,
                __genserve_invoke,
            )
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(EntryPoint: Sync);

    fn noop(_req: &Request<'_>, _w: &mut ResponseWriter<'_>) {}
    fn noop_ctx(_ctx: &Context<'_>, _req: &Request<'_>, _w: &mut ResponseWriter<'_>) {}

    struct Greeter;
    impl ServeHttp for Greeter {
        fn serve_http(&self, _req: &Request<'_>, _w: &mut ResponseWriter<'_>) {}
    }
    static GREETER: Greeter = Greeter;

    export_handler!(AbiTestHandler, noop);
    export_context_handler!(AbiTestContextHandler, noop_ctx);
    export_handler_object!(AbiTestObject, GREETER: Greeter);

    #[test]
    fn test_exported_descriptors_carry_matching_shape() {
        assert_eq!(AbiTestHandler.abi_version, ABI_VERSION);
        assert_eq!(AbiTestHandler.shape, SHAPE_HANDLER_FN);
        assert!(AbiTestHandler.handler.is_some());
        assert!(AbiTestHandler.context_handler.is_none());

        assert_eq!(AbiTestContextHandler.shape, SHAPE_CONTEXT_HANDLER_FN);
        assert!(AbiTestContextHandler.context_handler.is_some());
        assert!(AbiTestContextHandler.handler.is_none());

        assert_eq!(AbiTestObject.shape, SHAPE_HANDLER_OBJECT);
        assert!(AbiTestObject.object.invoke.is_some());
        assert_eq!(AbiTestObject.object.this, &GREETER as *const Greeter as *const c_void);
    }

    #[test]
    fn test_request_view_splits_uri_and_finds_headers() {
        let headers = [RawHeader {
            name: RawStr::from_bytes(b"Content-Type"),
            value: RawStr::from_bytes(b"text/plain"),
        }];
        let raw = RawRequest {
            method: RawStr::from_bytes(b"POST"),
            uri: RawStr::from_bytes(b"/items?id=7"),
            headers: headers.as_ptr(),
            headers_len: headers.len(),
            body: RawStr::from_bytes(b"payload"),
        };
        let req = unsafe { Request::from_raw(&raw) }.unwrap();

        assert_eq!(req.method(), "POST");
        assert_eq!(req.path(), "/items");
        assert_eq!(req.query(), Some("id=7"));
        assert_eq!(req.header("content-type"), Some(&b"text/plain"[..]));
        assert_eq!(req.header("x-missing"), None);
        assert_eq!(req.body(), b"payload");
    }

    #[test]
    fn test_context_view_reads_cancellation() {
        let flag = AtomicBool::new(false);
        let raw = RawContext { request_id: 9, cancelled: &flag };
        let ctx = unsafe { Context::from_raw(&raw) }.unwrap();

        assert_eq!(ctx.request_id(), 9);
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Release);
        assert!(ctx.is_cancelled());

        let detached = RawContext { request_id: 0, cancelled: core::ptr::null() };
        assert!(!unsafe { Context::from_raw(&detached) }.unwrap().is_cancelled());
    }
}
