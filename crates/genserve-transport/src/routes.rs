use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use genserve_core::{CodeLoader, ServerConfig, Specializer};
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};

use crate::{dispatcher, specialize};

pub const HEALTHZ: &str = "/healthz";
pub const SPECIALIZE: &str = "/specialize";
pub const SPECIALIZE_V2: &str = "/v2/specialize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Healthz,
    Specialize,
    SpecializeV2,
    /// Everything else goes to the loaded function.
    Generic,
}

impl Route {
    pub fn classify(path: &str) -> Self {
        match path {
            HEALTHZ => Route::Healthz,
            SPECIALIZE => Route::Specialize,
            SPECIALIZE_V2 => Route::SpecializeV2,
            _ => Route::Generic,
        }
    }
}

/// The container's front door: admin routes plus the generic pass-through.
pub struct Router<L> {
    specializer: Arc<Specializer<L>>,
    config: Arc<ServerConfig>,
}

impl<L> Clone for Router<L> {
    fn clone(&self) -> Self {
        Self {
            specializer: self.specializer.clone(),
            config: self.config.clone(),
        }
    }
}

impl<L: CodeLoader + 'static> Router<L> {
    pub fn new(specializer: Arc<Specializer<L>>, config: Arc<ServerConfig>) -> Self {
        Self { specializer, config }
    }

    pub fn specializer(&self) -> &Arc<Specializer<L>> {
        &self.specializer
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Display,
    {
        match Route::classify(req.uri().path()) {
            Route::Healthz => empty(StatusCode::OK),
            Route::Specialize => specialize::provisioned(self).await,
            Route::SpecializeV2 => specialize::from_payload(self, req).await,
            Route::Generic => dispatcher::dispatch(self.specializer.handler().cloned(), req).await,
        }
    }
}

pub(crate) fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

pub(crate) fn text(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body.into())));
    *resp.status_mut() = status;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_paths_are_exact() {
        assert_eq!(Route::classify("/healthz"), Route::Healthz);
        assert_eq!(Route::classify("/specialize"), Route::Specialize);
        assert_eq!(Route::classify("/v2/specialize"), Route::SpecializeV2);
        assert_eq!(Route::classify("/healthz/"), Route::Generic);
        assert_eq!(Route::classify("/v2/specialize/extra"), Route::Generic);
        assert_eq!(Route::classify("/"), Route::Generic);
    }
}
