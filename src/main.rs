//! Face Insight Service
//!
//! Face detection with gender and age classification over HTTP, backed by
//! OpenVINO.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use faceinsight::api::rest::{create_rest_router, AppState};
use faceinsight::config::Config;
use faceinsight::engine::ModelPool;
use faceinsight::service::FaceService;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default_path().to_string());

    // Config is read before logging starts so the level can come from it
    let (config, config_note) = match Config::load(&config_path) {
        Ok(config) => (config, format!("Loaded config from {}", config_path)),
        Err(e) => (Config::default(), format!("Using default config ({:#})", e)),
    };

    let level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    info!("Starting Face Insight Service v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", config_note);

    info!("Configuration loaded:");
    info!("  Listen: {}", config.listen_addr());
    info!("  Device: {}", config.inference.device);
    info!("  Detector: {}", config.models.detector.display());
    info!("  Gender model: {}", config.models.gender.display());
    info!("  Age model: {}", config.models.age.display());
    info!(
        "  Detector defaults: size={} conf={} iou={} augment={}",
        config.detector.image_size,
        config.detector.confidence_threshold,
        config.detector.iou_threshold,
        config.detector.augment
    );

    // Models are loaded once; failure here is fatal
    let pool = Arc::new(ModelPool::load(&config.inference, &config.models)?);
    info!("Models ready on {}", pool.device());

    let service = Arc::new(FaceService::new(pool, &config.detector));

    let app_state = Arc::new(AppState {
        service,
        max_upload_bytes: config.server.max_upload_mb * 1024 * 1024,
    });
    let router = create_rest_router(app_state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);
    info!("Docs: http://{}/docs", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, cleaning up...");
}
