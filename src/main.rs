use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use hub_database::{api::create_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hub_database=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize application state: {}", e))?;

    let app = create_router(app_state).layer(CorsLayer::permissive());

    let addr = config.server_address();
    tracing::info!("hub_database server starting on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
