use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use irrigation_advisor_api::config::Config;
use irrigation_advisor_api::enrichment::FieldDataAggregator;
use irrigation_advisor_api::handlers::{self, AppState};
use irrigation_advisor_api::log_storage::PredictionLog;
use irrigation_advisor_api::predictor::ModelRegistry;
use irrigation_advisor_api::services::WeatherService;
use irrigation_advisor_api::soil_store::SoilTableStore;

/// Starts the irrigation advisor server.
///
/// Startup order: tracing, configuration, crop models (fatal on a bad
/// artifact), soil table warm-up (non-fatal), weather client, prediction
/// log, then the router with its middleware.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing, filtered by RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "irrigation_advisor_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Models are resolved once; a bad artifact stops startup
    let models = ModelRegistry::load_dir(&config.model_dir)?;
    tracing::info!("Model registry ready: {:?}", models.crops());

    let soil = SoilTableStore::new(&config.soil_table_path);
    match soil.current().await {
        Ok(table) => tracing::info!(
            "✓ Soil table {} loaded ({} ranges)",
            soil.path().display(),
            table.len()
        ),
        // Not fatal: the file is reread per request
        Err(e) => tracing::error!("Soil table not readable at startup: {}", e),
    }

    let weather = WeatherService::new(&config);
    tracing::info!("✓ Weather client initialized: {}", config.weather_base_url);

    let log = PredictionLog::new(&config.prediction_log_path);

    let app_state = Arc::new(AppState {
        aggregator: FieldDataAggregator::new(soil, weather),
        models,
        log,
    });

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    // API routes get the body limit and per-IP rate limit
    let protected_routes = handlers::api_routes()
        .layer(
            ServiceBuilder::new()
                // Request size limit: 64KB (prediction requests are small)
                .layer(RequestBodyLimitLayer::new(64 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
