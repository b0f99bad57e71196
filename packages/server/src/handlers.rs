//! HTTP handler functions for the dispatch API.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use wake_dispatch_geojson::TimeWindow;
use wake_dispatch_models::FeatureCollection;

use crate::{ApiHealth, AppState};

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.store.name().to_string(),
    })
}

/// `GET /geojson`, `GET /geojson/all`
pub async fn all(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    collection(&req, &state, TimeWindow::All).await
}

/// `GET /geojson/last24`
pub async fn last24(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    collection(&req, &state, TimeWindow::Last24Hours).await
}

/// `GET /geojson/latest`
pub async fn latest(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    collection(&req, &state, TimeWindow::Latest).await
}

/// `GET /geojson/latest/{unit}/{amount}`
///
/// Dispatches from the past `amount` `unit`s, e.g. `/latest/hours/6`.
pub async fn latest_window(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (unit, amount) = path.into_inner();

    match TimeWindow::last(&unit, &amount) {
        Ok(requested) => collection(&req, &state, requested).await,
        Err(e) => {
            let title = format!("{}, Past {amount} {unit}", state.title_prefix);
            let (status, body) = wake_dispatch_geojson::invalid_request(full_url(&req), title, &e);
            respond(status, &body)
        }
    }
}

async fn collection(req: &HttpRequest, state: &AppState, window: TimeWindow) -> HttpResponse {
    let (status, body) = wake_dispatch_geojson::query(
        state.store.as_ref(),
        &window,
        chrono::Utc::now(),
        full_url(req),
        &state.title_prefix,
    )
    .await;
    respond(status, &body)
}

fn respond(status: u16, body: &FeatureCollection) -> HttpResponse {
    HttpResponse::build(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .json(body)
}

/// Reconstructs the URL the client requested.
fn full_url(req: &HttpRequest) -> String {
    let info = req.connection_info();
    format!("{}://{}{}", info.scheme(), info.host(), req.uri())
}
