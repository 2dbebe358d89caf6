//! Label Studio ML backend service.
//!
//! Forwards task images to a remote detector and answers with
//! `rectanglelabels` predictions.

use ml_backend::config::Config;
use ml_backend::error::AppError;
use ml_backend::handlers::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ml_backend=info,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Requests spend their time waiting on Label Studio and the detector,
    // so one worker per core is plenty.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build runtime: {e}")))?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    info!("Starting ml-backend");
    info!("Label Studio host: {}", config.label_studio_host);
    info!("Detector URL: {} ({:?} request)", config.detector_url, config.detector_request);
    info!(
        "Box field: {}, box mode: {:?}, score scale: {:?}",
        config.box_field, config.box_mode, config.score_scale
    );
    if config.label_studio_api_key.is_none() {
        info!("LABEL_STUDIO_API_KEY not set, image downloads are unauthenticated");
    }

    let port = config.port;
    let state = Arc::new(AppState::new(config)?);
    let app = ml_backend::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    info!("Server stopped");
    Ok(())
}
