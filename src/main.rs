mod config;
mod presence;
mod relay;
mod routes;
mod state;
mod uplink;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // A missing .env is fine; flags and the process environment still apply.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_args(config::Args::parse());
    let port = config.port;
    let mode = config.mode;
    let uplink = config.uplink.clone();

    let state = state::AppState::new(config);

    // Gateway ingestion is optional: without credentials the relay still serves viewers.
    let _uplink = match uplink {
        Ok(uplink_config) => Some(uplink::spawn(uplink_config, state.relay.clone())),
        Err(e) => {
            tracing::warn!(error = %e, "uplink not configured; ingestion disabled");
            None
        }
    };

    let app = routes::app(state);
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %port, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%port, ?mode, "sensorstream listening on http://0.0.0.0:{port}/");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
