use anyhow::Result;
use axum::http::header;
use storefront::{Settings, Storefront};
use storefront_gateway::{create_router, AppState};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,storefront_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting storefront gateway...");

    let settings = Settings::new()?;
    tracing::info!("Configuration loaded ({:?} store)", settings.store.backend);

    let shop = Storefront::from_settings(&settings);
    match shop.ping().await {
        Ok(()) => tracing::info!("✅ Table store reachable"),
        Err(e) => tracing::warn!("⚠️ Table store not reachable yet: {}", e),
    }

    let app = create_router(AppState::new(shop)).layer(
        ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .expose_headers([header::CONTENT_TYPE]),
        ),
    );

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_address).await?;

    tracing::info!("🚀 Gateway started on {}", settings.server.bind_address);
    tracing::info!("🔍 Health Check: http://{}/health", settings.server.bind_address);
    tracing::info!("📊 GraphiQL: http://{}/graphql", settings.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
