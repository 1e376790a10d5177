mod api;
mod scheduler;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let level = std::env::var("NICHEPROBE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level)
    })?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Arc::new(nicheprobe_core::load_app_config()?);
    let pool = nicheprobe_db::connect_pool(
        &config.database_url,
        nicheprobe_db::PoolConfig::from_app_config(&config),
    )
    .await?;
    nicheprobe_db::run_migrations(&pool).await?;

    // Keep the scheduler handle alive for the lifetime of the process —
    // dropping it shuts down all jobs.
    let _scheduler = scheduler::build_scheduler(pool.clone(), Arc::clone(&config)).await?;

    let state = api::AppState {
        pool,
        config: Arc::clone(&config),
    };
    let app = api::router(state).layer(TraceLayer::new_for_http());

    tracing::info!(addr = %config.bind_addr, "read API listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
