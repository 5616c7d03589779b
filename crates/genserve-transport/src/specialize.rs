//! The two specialization endpoints.
//!
//! Both funnel into [`Specializer::specialize`]; they differ only in where the
//! code location and entry point come from.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use genserve_core::{
    Ack, CodeLoader, ContainerState, SpecializationRequest, SpecializeError, Specializer,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use crate::routes::{empty, text, Router};

/// JSON body of `/v2/specialize`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FunctionLoadRequest {
    #[serde(default)]
    pub filepath: String,
    #[serde(default, rename = "functionName")]
    pub function_name: String,
    #[serde(default)]
    pub url: String,
}

impl From<FunctionLoadRequest> for SpecializationRequest {
    fn from(payload: FunctionLoadRequest) -> Self {
        let mut req = SpecializationRequest::new(payload.filepath).with_entry_point(payload.function_name);
        if !payload.url.is_empty() {
            req = req.with_route_hint(payload.url);
        }
        req
    }
}

/// `/specialize`: load from the pre-provisioned code path.
pub(crate) async fn provisioned<L: CodeLoader + 'static>(router: &Router<L>) -> Response<Full<Bytes>> {
    let request = SpecializationRequest::provisioned(router.config());
    run(router.specializer().clone(), request).await
}

/// `/v2/specialize`: load from the location named in the JSON body.
pub(crate) async fn from_payload<L, B>(router: &Router<L>, req: Request<B>) -> Response<Full<Bytes>>
where
    L: CodeLoader + 'static,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Display,
{
    if router.specializer().state() == ContainerState::Specialized {
        return status_for(Err(SpecializeError::Conflict));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!("error reading request body: {}", e);
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let payload: FunctionLoadRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("rejecting specialization payload: {}", e);
            return empty(StatusCode::BAD_REQUEST);
        }
    };

    run(router.specializer().clone(), payload.into()).await
}

async fn run<L: CodeLoader + 'static>(
    specializer: Arc<Specializer<L>>,
    request: SpecializationRequest,
) -> Response<Full<Bytes>> {
    tracing::info!("specializing ...");
    let joined = tokio::task::spawn_blocking(move || specializer.specialize(&request)).await;
    match joined {
        Ok(result) => status_for(result),
        Err(e) => {
            tracing::error!("error specializing function: loader task failed: {}", e);
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("error specializing function: {}", e),
            )
        }
    }
}

/// Maps an attempt's outcome to the status and body the container replies with.
pub fn status_for(result: Result<Ack, SpecializeError>) -> Response<Full<Bytes>> {
    match result {
        Ok(ack) => {
            tracing::info!("done ({} from {})", ack.entry_point, ack.artifact.display());
            empty(StatusCode::OK)
        }
        Err(SpecializeError::Conflict) => {
            tracing::warn!("rejecting specialization: container already specialized");
            text(StatusCode::BAD_REQUEST, SpecializeError::Conflict.to_string())
        }
        Err(err @ SpecializeError::NotFound { .. }) => {
            tracing::warn!("code path does not exist: {}", err);
            text(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(SpecializeError::Io { path, source }) => {
            tracing::error!("unknown error looking for code path ({}): {}", path.display(), source);
            text(StatusCode::INTERNAL_SERVER_ERROR, format!("unknown error: {}", source))
        }
        Err(err) => {
            let message = format!("error specializing function: {}", err);
            tracing::error!("{}", message);
            text(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
