use genserve_core::ServerConfig;
use genserve_transport::GenericServer;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        "generic container: code path {}, entry point {}, bad-shape policy {:?}",
        config.code_path.display(),
        config.entry_point,
        config.bad_shape_policy
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads.max(1))
        .thread_name("genserve-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = GenericServer::listen(config);
        let listener = server.bind()?;
        server
            .serve_until(listener, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await
    })?;

    Ok(())
}
