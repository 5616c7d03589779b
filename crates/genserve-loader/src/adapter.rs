use std::ffi::c_void;
use std::sync::Arc;

use genserve_abi::{
    ContextHandlerFn, EntryPoint, HandlerFn, InvokeFn, RawContext, RawHeader, RawRequest,
    RawResponseWriter, RawStr, ABI_VERSION, SHAPE_CONTEXT_HANDLER_FN, SHAPE_HANDLER_FN,
    SHAPE_HANDLER_OBJECT,
};
use genserve_core::{Handler, HandlerRequest, HandlerResponse, LoadedHandler, SpecializeError};

use crate::library::RawEntryPoint;

/// The closed set of callable forms an entry point may take.
#[derive(Debug, Clone, Copy)]
pub enum EntryShape {
    Object { this: *const c_void, invoke: InvokeFn },
    Function(HandlerFn),
    ContextFunction(ContextHandlerFn),
}

impl EntryShape {
    /// Decodes a descriptor. Unknown tags, foreign ABI versions and missing
    /// function pointers are contract violations.
    pub fn decode(descriptor: &EntryPoint) -> Result<Self, SpecializeError> {
        if descriptor.abi_version != ABI_VERSION {
            return Err(SpecializeError::Adapt(format!(
                "abi version {} (container speaks {})",
                descriptor.abi_version, ABI_VERSION
            )));
        }
        let missing = |what: &str| SpecializeError::Adapt(format!("shape {} without {}", descriptor.shape, what));

        match descriptor.shape {
            SHAPE_HANDLER_OBJECT => {
                let invoke = descriptor.object.invoke.ok_or_else(|| missing("invoke"))?;
                Ok(EntryShape::Object { this: descriptor.object.this, invoke })
            }
            SHAPE_HANDLER_FN => descriptor
                .handler
                .map(EntryShape::Function)
                .ok_or_else(|| missing("handler")),
            SHAPE_CONTEXT_HANDLER_FN => descriptor
                .context_handler
                .map(EntryShape::ContextFunction)
                .ok_or_else(|| missing("context_handler")),
            other => Err(SpecializeError::Adapt(format!("unknown shape tag {}", other))),
        }
    }
}

/// Normalizes a loaded entry point into the canonical handler.
pub fn adapt(raw: RawEntryPoint) -> Result<LoadedHandler, SpecializeError> {
    let shape = EntryShape::decode(raw.descriptor())?;
    tracing::debug!("entry point {} adapted as {:?}", raw.name(), shape);
    Ok(Arc::new(AdaptedHandler { shape, _raw: raw }))
}

struct AdaptedHandler {
    shape: EntryShape,
    _raw: RawEntryPoint,
}

// # Safety: `this` points into the artifact kept alive by `_raw`, and the
// ABI requires handler objects to be `Sync`.
unsafe impl Send for AdaptedHandler {}
unsafe impl Sync for AdaptedHandler {}

impl Handler for AdaptedHandler {
    fn serve(&self, req: &HandlerRequest, resp: &mut HandlerResponse) {
        let headers: Vec<RawHeader> = req
            .headers
            .iter()
            .map(|(name, value)| RawHeader {
                name: RawStr::from_bytes(name.as_bytes()),
                value: RawStr::from_bytes(value),
            })
            .collect();
        let raw_req = RawRequest {
            method: RawStr::from_bytes(req.method.as_bytes()),
            uri: RawStr::from_bytes(req.uri.as_bytes()),
            headers: headers.as_ptr(),
            headers_len: headers.len(),
            body: RawStr::from_bytes(&req.body),
        };
        let writer = RawResponseWriter {
            state: resp as *mut HandlerResponse as *mut c_void,
            set_status: writer_set_status,
            add_header: writer_add_header,
            write: writer_write,
        };

        // # Safety: every pointer handed out refers to locals that outlive the call.
        unsafe {
            match self.shape {
                EntryShape::Object { this, invoke } => invoke(this, &raw_req, &writer),
                EntryShape::Function(f) => f(&raw_req, &writer),
                EntryShape::ContextFunction(f) => {
                    let ctx = RawContext {
                        request_id: req.id,
                        cancelled: Arc::as_ptr(req.cancel_flag()),
                    };
                    f(&ctx, &raw_req, &writer)
                }
            }
        }
    }
}

unsafe extern "C" fn writer_set_status(state: *mut c_void, status: u16) {
    if let Some(resp) = (state as *mut HandlerResponse).as_mut() {
        resp.set_status(status);
    }
}

unsafe extern "C" fn writer_add_header(state: *mut c_void, name: RawStr, value: RawStr) {
    if let Some(resp) = (state as *mut HandlerResponse).as_mut() {
        let name = String::from_utf8_lossy(name.as_bytes()).into_owned();
        resp.add_header(name, value.as_bytes().to_vec());
    }
}

unsafe extern "C" fn writer_write(state: *mut c_void, chunk: RawStr) {
    if let Some(resp) = (state as *mut HandlerResponse).as_mut() {
        resp.write(chunk.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genserve_abi::{Context, Request, ResponseWriter, ServeHttp};

    fn created(req: &Request<'_>, w: &mut ResponseWriter<'_>) {
        w.set_status(201);
        w.add_header("X-Method", req.method().as_bytes());
        w.write(b"ok");
    }

    fn echo_context(ctx: &Context<'_>, req: &Request<'_>, w: &mut ResponseWriter<'_>) {
        w.write(format!("{}:{}:{}", ctx.request_id(), ctx.is_cancelled(), req.path()).as_bytes());
    }

    struct Echo;
    impl ServeHttp for Echo {
        fn serve_http(&self, req: &Request<'_>, w: &mut ResponseWriter<'_>) {
            w.add_header("Content-Type", req.header("content-type").unwrap_or(b""));
            w.write(req.body());
        }
    }
    static ECHO: Echo = Echo;

    genserve_abi::export_handler!(AdapterUnitHandler, created);
    genserve_abi::export_context_handler!(AdapterUnitContext, echo_context);
    genserve_abi::export_handler_object!(AdapterUnitObject, ECHO: Echo);

    fn run(descriptor: &'static EntryPoint, req: &HandlerRequest) -> HandlerResponse {
        let handler = adapt(RawEntryPoint::from_static(descriptor, "test")).unwrap();
        let mut resp = HandlerResponse::default();
        handler.serve(req, &mut resp);
        resp
    }

    #[test]
    fn test_bare_function_shape() {
        let resp = run(&AdapterUnitHandler, &HandlerRequest::new("PUT", "/"));
        assert_eq!(resp.status, 201);
        assert_eq!(resp.headers, vec![("X-Method".to_string(), b"PUT".to_vec())]);
        assert_eq!(resp.body, b"ok");
    }

    #[test]
    fn test_context_shape_derives_context_from_request() {
        let req = HandlerRequest::new("GET", "/ctx?x=1");
        let resp = run(&AdapterUnitContext, &req);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, format!("{}:false:/ctx", req.id).into_bytes());

        req.cancel_flag().store(true, std::sync::atomic::Ordering::Release);
        let resp = run(&AdapterUnitContext, &req);
        assert_eq!(resp.body, format!("{}:true:/ctx", req.id).into_bytes());
    }

    #[test]
    fn test_object_shape_invokes_through_this() {
        let req = HandlerRequest::new("POST", "/echo")
            .with_header("Content-Type", "text/plain")
            .with_body("hello");
        let resp = run(&AdapterUnitObject, &req);
        assert_eq!(resp.body, b"hello");
        assert_eq!(resp.headers, vec![("Content-Type".to_string(), b"text/plain".to_vec())]);
    }

    #[test]
    fn test_unknown_tag_and_missing_pointer_are_rejected() {
        let unknown = EntryPoint { shape: 42, ..EntryPoint::handler(AdapterUnitHandler.handler.unwrap()) };
        assert!(matches!(EntryShape::decode(&unknown), Err(SpecializeError::Adapt(_))));

        let hollow = EntryPoint { handler: None, ..EntryPoint::handler(AdapterUnitHandler.handler.unwrap()) };
        assert!(matches!(EntryShape::decode(&hollow), Err(SpecializeError::Adapt(_))));

        let future = EntryPoint { abi_version: ABI_VERSION + 1, ..EntryPoint::handler(AdapterUnitHandler.handler.unwrap()) };
        let err = EntryShape::decode(&future).unwrap_err();
        assert!(err.to_string().contains("abi version"));
    }
}
