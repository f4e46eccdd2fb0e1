use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use ragbot_backend::core::config::AppPaths;
use ragbot_backend::core::logging;
use ragbot_backend::server;
use ragbot_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let paths = AppPaths::new();
    logging::init(&paths);
    let state = AppState::initialize(paths).await?;

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.settings.server.port);
    let bind_addr = format!("{}:{}", state.settings.server.host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("RAGBOT_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
