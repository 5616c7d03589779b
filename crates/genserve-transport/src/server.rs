use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use genserve_core::{CodeLoader, ServerConfig, Specializer};
use genserve_loader::NativeLoader;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::error::TransportError;
use crate::routes::Router;

pub struct GenericServer<L> {
    config: Arc<ServerConfig>,
    specializer: Arc<Specializer<L>>,
}

impl GenericServer<NativeLoader> {
    pub fn listen(config: ServerConfig) -> Self {
        Self::with_loader(config, NativeLoader)
    }
}

impl<L: CodeLoader + 'static> GenericServer<L> {
    pub fn with_loader(config: ServerConfig, loader: L) -> Self {
        let specializer = Arc::new(Specializer::from_config(loader, &config));
        Self {
            config: Arc::new(config),
            specializer,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn specializer(&self) -> Arc<Specializer<L>> {
        self.specializer.clone()
    }

    pub fn router(&self) -> Router<L> {
        Router::new(self.specializer.clone(), self.config.clone())
    }

    /// Binds the configured address. Must be called inside a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, TransportError> {
        let addr = self.config.bind_addr()?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;
        Ok(TcpListener::from_std(std::net::TcpListener::from(socket))?)
    }

    pub async fn serve(self) -> Result<(), TransportError> {
        let listener = self.bind()?;
        self.serve_until(listener, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// accepted run to completion on their own tasks.
    pub async fn serve_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("listening on {} ...", listener.local_addr()?);
        let router = self.router();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("accept failed: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            continue;
                        }
                    };
                    let router = router.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let router = router.clone();
                            async move { Ok::<_, Infallible>(router.handle(req).await) }
                        });
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            tracing::debug!("connection from {} ended: {}", peer, e);
                        }
                    });
                }
            }
        }
    }
}
