use axum::middleware;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{claude, csv, health, integrated, rate_limit, salesforce};

/// Assemble the full route tree. Everything under `/api` is rate
/// limited; `/health` is exempt so probes cannot exhaust a caller's
/// window.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(salesforce::router())
        .merge(claude::router())
        .merge(integrated::router())
        .merge(csv::router())
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce));

    Router::new()
        .merge(health::router())
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
