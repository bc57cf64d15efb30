#![forbid(unsafe_code)]

use motorpool_adapter::config::AdapterConfig;
use motorpool_adapter::http::build_router;
use motorpool_adapter::AdapterRuntime;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AdapterConfig::from_env()?;
    init_tracing(config.log_json);

    let runtime = AdapterRuntime::from_config(&config)?;
    let app = build_router(runtime.clone());

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        persistence = runtime.persistence_mode(),
        "motorpool_adapter_http listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;
    info!("motorpool_adapter_http stopped");
    Ok(())
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c; shutting down");
    }
}
