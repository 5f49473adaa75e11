//! Defines the HTTP surface of the rating service.
//!
//! ## Structure
//! - **API endpoints**
//!   - `GET  /api/image` — one random unrated image with the unrated count
//!   - `POST /api/rate`  — append a rating for an image
//!
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! Every route is wrapped in a CORS layer so browser front-ends on other
//! origins can call the API.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::get_image,
        rating_handlers::rate_image,
    },
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

/// Build and return the router for all routes, carrying `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/image", get(get_image))
        .route("/api/rate", post(rate_image))
}

/// The complete application: routes, state and CORS.
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    routes().with_state(state).layer(cors_layer(cors_origins))
}

/// Any origin when `origins` is empty, otherwise exactly the listed ones.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(origin, error = %err, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}
