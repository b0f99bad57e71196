#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web query surface for stored dispatches.
//!
//! Every route under `/geojson` answers with a `GeoJSON` feature collection,
//! including failures: an unusable interval is a 400 collection carrying a
//! message, a store failure is an empty 500 collection.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{App, HttpServer, middleware, web};
use serde::Serialize;
use wake_dispatch_store::Store;

/// Shared application state.
pub struct AppState {
    /// Where dispatches are read from.
    pub store: Arc<dyn Store>,
    /// Prefix of every collection title.
    pub title_prefix: String,
}

/// Listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// `GET /api/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Backing store in use.
    pub store: String,
}

/// Registers all routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/geojson")
            .route("", web::get().to(handlers::all))
            .route("/", web::get().to(handlers::all))
            .route("/all", web::get().to(handlers::all))
            .route("/last24", web::get().to(handlers::last24))
            .route("/latest", web::get().to(handlers::latest))
            .route(
                "/latest/{unit}/{amount}",
                web::get().to(handlers::latest_window),
            ),
    )
    .service(web::scope("/api").route("/health", web::get().to(handlers::health)));
}

/// Binds the HTTP server without starting it.
///
/// The returned [`Server`] stops gracefully on SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the address cannot be bound.
pub fn build_server(state: AppState, config: &ServerConfig) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    log::info!(
        "Starting server on {}:{} (store: {})",
        config.host,
        config.port,
        state.store.name()
    );

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    Ok(server)
}

/// Runs the HTTP server until it is shut down.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a fatal I/O error.
pub async fn run_server(state: AppState, config: &ServerConfig) -> std::io::Result<()> {
    build_server(state, config)?.await?;
    log::info!("Server stopped");
    Ok(())
}
