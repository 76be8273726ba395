//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{BridgeClientFactory, FsCredentialStore},
    config::Config,
    error::ApiError,
    session::{ConnectionManager, SessionPolicy, SessionResetCoordinator},
    web::{router, rest::ApiDoc, state::AppState},
};
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use axum::Router;
use chat_export_core::CredentialStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let credentials = Arc::new(FsCredentialStore::new(config.auth_data_path.clone()));
    let factory = Arc::new(BridgeClientFactory::new(config.bridge_url.clone())?);
    info!("Messaging bridge at {}", config.bridge_url);
    match credentials.exists().await {
        Ok(true) => info!(
            "Stored credentials found at {}; the client will try to restore the session.",
            credentials.path().display()
        ),
        Ok(false) => info!(
            "No stored credentials at {}; a QR scan will be needed.",
            credentials.path().display()
        ),
        Err(e) => warn!("Could not check the credential store: {}", e),
    }

    // --- 3. Build the Session Layer ---
    let sessions = ConnectionManager::new(
        factory,
        credentials.clone(),
        SessionPolicy::from_config(&config),
    );
    let reset = SessionResetCoordinator::new(sessions.clone(), credentials, config.reset_delay);

    let app_state = Arc::new(AppState {
        config: config.clone(),
        sessions: sessions.clone(),
        reset,
    });

    // The server comes up even if the first start fails; an operator reset retries it.
    tokio::spawn(async move {
        if let Err(e) = sessions.start().await {
            error!("Initial messaging client start failed: {}", e);
        }
    });

    // --- 4. Create the Web Router ---
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
