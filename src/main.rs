use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cache_proxy::config::Config;
use cache_proxy::error::ProxyError;
use cache_proxy::server::ProxySystemBuilder;

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        origin = %config.origin_url,
        redis = %config.redis_url,
        bind = %config.bind_addr,
        "starting cache-proxy"
    );

    let bind_addr = config.bind_addr.clone();
    let (_state, router) = ProxySystemBuilder::new(config)
        .build()
        .await
        .map_err(|err| ProxyError::Bind(std::io::Error::other(err)))?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(ProxyError::Bind)?;

    tracing::info!(address = %bind_addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ProxyError::Bind)?;

    tracing::info!("shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
