use std::sync::Arc;

use kvedge::{App, AppState, Config, Request, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        limit = config.rate_limit_requests,
        period_secs = config.rate_limit_period_secs,
        cache_ttl_secs = config.cache_ttl_secs,
        "configuration loaded"
    );

    let app = Arc::new(App::new(AppState::in_memory(&config)));
    let server = Server::bind(config.bind_addr()).await?;

    let handler_app = Arc::clone(&app);
    server
        .run_until(
            move |req: Request| {
                let app = Arc::clone(&handler_app);
                async move { app.handle(req).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    tracing::info!(
        pending = app.state().background.pending(),
        "waiting for background cache writes"
    );
    app.settle().await;
    Ok(())
}
