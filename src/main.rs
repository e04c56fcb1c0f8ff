mod batch;
mod config;
mod deberta_engine;
mod device;
mod engine;
mod error;
mod preprocess;
mod server;
mod service;
mod truncate;
mod types;

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use deberta_engine::ModelConfig;
use server::AppState;
use service::ClassificationService;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,email_classifier=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down email classifier");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);
    tracing::info!(
        model_path = %config.model_path.display(),
        preprocess = ?config.preprocess,
        auth = config.api_token().is_some(),
        "Starting email classifier"
    );

    let model_config = ModelConfig::from(&config);
    tracing::info!("Loading model...");
    let model = tokio::task::spawn_blocking(move || deberta_engine::load(&model_config)).await??;

    let service = ClassificationService::new(config.preprocess.build()).with_model(model);
    let state = AppState::new(Arc::new(service), config.api_token());

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let api = server::routes(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer)
        .layer(TraceLayer::new_for_http());
    let app = server::mount(api, config.route_prefix().as_deref());

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
