//! Binary entrypoint for the qlscout HTTP server.
//!
//! Configuration comes from `QLSCOUT_*` environment variables (see
//! [`Settings::from_env`]); log filtering from `RUST_LOG` (default `info`).

use qlscout_server::router::build_router;
use qlscout_server::settings::Settings;
use qlscout_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let addr = settings.bind_addr();
    let runs_dir = settings.runs_dir.clone();

    let state = AppState::new(settings).expect("Failed to initialize application state");
    let app = build_router(state);

    tracing::info!("qlscout server starting on {} (runs in {})", addr, runs_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app).await.expect("Server error");
}
