//! HTTP query service surface (C10, §4.10). A thin axum router: every
//! route is a read-only GET guarded by the `x-api-key` auth middleware,
//! delegating straight to the `domain::repositories` trait objects held
//! in `AppState`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the full router. `/healthz` is intentionally outside the
/// api-key gate so orchestrators can probe liveness without a credential.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/candles", get(handlers::candles::candles))
        .route("/latest", get(handlers::candles::latest))
        .route("/top-movers", get(handlers::candles::top_movers))
        .route("/news/latest", get(handlers::news::news_latest))
        .route("/news/by-ticker", get(handlers::news::news_by_ticker))
        .route("/fundamentals/latest", get(handlers::fundamentals::fundamentals_latest))
        .route("/screener", get(handlers::fundamentals::screener))
        .route("/corporate-actions/latest", get(handlers::corporate_actions::latest))
        .route("/corporate-actions/by-ticker", get(handlers::corporate_actions::by_ticker))
        .route("/v1/overall/health", get(handlers::v1::overall_health))
        .route("/v1/analytics/overview", get(handlers::v1::analytics_overview))
        .route("/v1/context/:ticker", get(handlers::v1::context))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
