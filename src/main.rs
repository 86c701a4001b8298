use tokio_util::sync::CancellationToken;

mod app;
mod auth;
mod clock;
mod config;
mod contents;
mod maintenance;
mod state;
mod storage;
mod translate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "clipkeep=debug,axum=info,tower_http=info".to_string());
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

    let app_state = state::AppState::init().await?;

    let cancel = CancellationToken::new();
    let scheduler = app_state
        .maintenance
        .clone()
        .start_auto_maintenance(cancel.clone());

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
            cancel.cancel();
        }
    };

    let result = app::serve(app::build_app(app_state), shutdown).await;

    cancel.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "maintenance scheduler ended abnormally");
    }
    result
}
