//! Backend for a roadside PUC (Pollution Under Control) checking service.
//!
//! A camera photo of a vehicle goes in; every number plate found in it is checked against the RTO
//! registry, cached, counted towards the region it was taken in and pushed to live dashboards.
//!
//!
//!
//! # Request Flow
//! - `POST /api/puc` with a multipart photo, optionally tagged with a `regionName`
//! - The segmentation model crops out every plate-like region and returns them zipped
//! - Each crop goes through OCR independently; a crop that cannot be read is skipped
//! - OCR text is cleaned up into plate candidates (see [`normalize`])
//! - Each candidate is validated, from Redis when seen before, otherwise through the RTO lookup
//! - Successful results update the region counters and are broadcast on `GET /api/events`
//! - `GET /api/vehicle-classes` tallies every stored vehicle by its registered class
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! Vehicle records and region counters live in Redis. Inserting a vehicle and counting a number
//! in a region are Lua scripts, so racing requests can neither duplicate a vehicle nor lose an
//! increment. `STORE_BACKEND=memory` swaps in an in-process store with the same guarantees for
//! local runs without Redis.
//!
//! ## External Services
//! Segmentation, OCR and RTO lookup are plain HTTP services, each with its own timeout. API keys
//! come from the environment or from `/run/secrets/<NAME>`.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against a local Redis.
//! ```sh
//! RUST_LOG=info REDIS_URL=redis://127.0.0.1:6379 cargo run -p puc
//! ```
//!
//! Run without Redis.
//! ```sh
//! RUST_LOG=info STORE_BACKEND=memory cargo run -p puc
//! ```
//!
//! Push local photos through the same pipeline.
//! ```sh
//! cargo run -p process -- photos/*.jpg --region pune-east
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod broadcast;
pub mod config;
pub mod database;
pub mod error;
#[cfg(test)]
mod fakes;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod region;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

use broadcast::events_handler;
use routes::{
    create_region_handler, plate_handler, puc_handler, region_stats_handler,
    region_vehicles_handler, regions_handler, vehicle_classes_handler,
};
use state::State;
use utils::MULTIPART_OVERHEAD;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = match State::new().await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize state: {err}");
            std::process::exit(1);
        }
    };

    info!("Starting server...");

    let app = build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .expect("Failed to bind listener");
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shutting down...");
}

pub fn build_router(state: Arc<State>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!(
            "Invalid CORS_ORIGIN {}, cross-origin requests disabled",
            state.config.cors_origin
        ),
    }

    Router::new()
        .route("/api/puc", post(puc_handler))
        .route("/api/image", post(plate_handler))
        .route("/api/regions", get(regions_handler).post(create_region_handler))
        .route("/api/regions/{region_name}", get(region_stats_handler))
        .route(
            "/api/regions/{region_name}/vehicles",
            get(region_vehicles_handler),
        )
        .route("/api/vehicle-classes", get(vehicle_classes_handler))
        .route("/api/events", get(events_handler))
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD,
        ))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
