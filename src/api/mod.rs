pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{control::ControlService, measurement_cache::MeasurementCache, store::ReadingLog};
use handlers::ApiDoc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub readings: Arc<dyn ReadingLog>,
    pub control: ControlService,
    pub measurements: MeasurementCache,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/environments/{environment_id}/readings",
            get(handlers::get_readings),
        )
        .route(
            "/environments/{environment_id}/readings/latest",
            get(handlers::get_latest_reading),
        )
        .route(
            "/environments/{environment_id}/measurements",
            post(handlers::post_measurement),
        )
        .route(
            "/environments/{environment_id}/evaluate",
            post(handlers::evaluate),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
