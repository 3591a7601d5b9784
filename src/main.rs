use std::time::Duration;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod mail;
mod state;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "pharmatrack=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let db = db::connect(&config.database_url).await?;
    db::migrate(&db).await?;

    let app_state = AppState::init(config, db)?;
    let prune_every = Duration::from_secs(app_state.config.revocation.prune_interval_secs.max(1));
    auth::revocation::spawn_pruner(app_state.revocations.clone(), prune_every);

    app::serve(app::build_app(app_state)).await
}
