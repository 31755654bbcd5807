mod auth;
mod config;
mod embedding;
mod errors;
mod llm;
mod logging;
mod pubmed;
mod rag;
mod ratelimit;
mod server;
mod state;
mod users;

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = state::AppState::initialize()
        .await
        .context("failed to initialize application state")?;
    logging::init(&state.paths);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(state.server.port);
    let addr = format!("{}:{}", state.server.host, port);

    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .await
        .context("server exited with an error")?;

    Ok(())
}
