use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use genserve_core::{HandlerRequest, HandlerResponse, LoadedHandler};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};

use crate::routes::{empty, text};

pub const NO_HANDLER: &str = "Generic container: no requests supported";

/// Forwards one request to the published handler and relays its response.
///
/// The body is collected before the call and the response after it, because
/// the handler runs synchronously on the blocking pool.
pub async fn dispatch<B>(handler: Option<LoadedHandler>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Display,
{
    let Some(handler) = handler else {
        return text(StatusCode::INTERNAL_SERVER_ERROR, NO_HANDLER);
    };

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!("error reading request body: {}", e);
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut request = HandlerRequest::new(parts.method.as_str(), uri).with_body(body);
    for (name, value) in parts.headers.iter() {
        request = request.with_header(name.as_str(), value.as_bytes());
    }

    let mut guard = CancelOnDrop {
        flag: request.cancel_flag().clone(),
        armed: true,
    };
    let joined = tokio::task::spawn_blocking(move || {
        let mut resp = HandlerResponse::default();
        handler.serve(&request, &mut resp);
        resp
    })
    .await;
    guard.armed = false;

    match joined {
        Ok(resp) => relay(resp),
        Err(e) => {
            tracing::error!("handler task failed: {}", e);
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Raises the request's cancel flag if the dispatch future is dropped before
/// the handler returns (the client went away).
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}

fn relay(resp: HandlerResponse) -> Response<Full<Bytes>> {
    let status = match StatusCode::from_u16(resp.status) {
        Ok(status) => status,
        Err(_) => {
            tracing::error!("handler produced invalid status {}", resp.status);
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut out = Response::new(Full::new(Bytes::from(resp.body)));
    *out.status_mut() = status;
    let headers = out.headers_mut();
    for (name, value) in resp.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_bytes(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!("dropping invalid response header {:?}", name),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_keeps_repeated_headers_in_order() {
        let mut resp = HandlerResponse::default();
        resp.set_status(202);
        resp.add_header("Set-Cookie", "a=1");
        resp.add_header("Set-Cookie", "b=2");
        resp.add_header("Bad Header", "x");
        resp.write(b"queued");

        let out = relay(resp);
        assert_eq!(out.status(), StatusCode::ACCEPTED);
        let cookies: Vec<_> = out.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(out.headers().len(), 2);
    }

    #[test]
    fn test_relay_rejects_out_of_range_status() {
        let resp = HandlerResponse { status: 42, ..HandlerResponse::default() };
        assert_eq!(relay(resp).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cancel_guard_only_fires_when_armed() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(CancelOnDrop { flag: flag.clone(), armed: false });
        assert!(!flag.load(Ordering::Acquire));
        drop(CancelOnDrop { flag: flag.clone(), armed: true });
        assert!(flag.load(Ordering::Acquire));
    }
}
