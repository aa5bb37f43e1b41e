use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{
        CommandFailureDto, CycleOutcomeKind, CycleReportDto, EvaluateRequest, MeasurementRequest,
        ReadingDto, ReadingRangeParams, TransitionDto,
    },
    errors::{AppError, InvalidInput},
    AppState,
};
use crate::{
    control::Transition, db::models::DeviceSlot, error::ControlError, hardware::Measurement,
};

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Readings of one environment in chronological order.
#[utoipa::path(
    get,
    path = "/environments/{environment_id}/readings",
    params(
        ("environment_id" = Uuid, Path, description = "Environment ID"),
        ReadingRangeParams,
    ),
    responses(
        (status = 200, description = "Readings ordered by time", body = Vec<ReadingDto>),
        (status = 400, description = "Range bounds are reversed"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    Path(environment_id): Path<Uuid>,
    Query(range): Query<ReadingRangeParams>,
) -> Result<Json<Vec<ReadingDto>>, AppError> {
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(InvalidInput(format!("from ({from}) is after to ({to})")).into());
        }
    }
    let rows = state
        .readings
        .readings(environment_id, range.from, range.to)
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// The most recent reading of one environment, or `null` if none exists.
#[utoipa::path(
    get,
    path = "/environments/{environment_id}/readings/latest",
    params(
        ("environment_id" = Uuid, Path, description = "Environment ID"),
    ),
    responses(
        (status = 200, description = "Latest reading", body = Option<ReadingDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
    Path(environment_id): Path<Uuid>,
) -> Result<Json<Option<ReadingDto>>, AppError> {
    let row = state.readings.latest_reading(environment_id).await?;
    Ok(Json(row.map(Into::into)))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Push a measurement for an environment whose sensor is fed manually.
#[utoipa::path(
    post,
    path = "/environments/{environment_id}/measurements",
    params(
        ("environment_id" = Uuid, Path, description = "Environment ID"),
    ),
    request_body = MeasurementRequest,
    responses(
        (status = 204, description = "Measurement stored"),
        (status = 400, description = "Values out of range"),
        (status = 404, description = "Environment has no hardware configured"),
    ),
    tag = "control"
)]
pub async fn post_measurement(
    State(state): State<AppState>,
    Path(environment_id): Path<Uuid>,
    Json(body): Json<MeasurementRequest>,
) -> Result<StatusCode, AppError> {
    if !state.control.manages(environment_id) {
        return Err(ControlError::NoHardware(environment_id).into());
    }
    if !body.temp.is_finite() {
        return Err(InvalidInput("temp must be a finite number".to_owned()).into());
    }
    if !(0.0..=1.0).contains(&body.humidity) {
        return Err(InvalidInput("humidity must be between 0.0 and 1.0".to_owned()).into());
    }

    state
        .measurements
        .update(
            environment_id,
            Measurement {
                temp: body.temp,
                humidity: body.humidity,
            },
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Run one control cycle immediately and report what happened.
#[utoipa::path(
    post,
    path = "/environments/{environment_id}/evaluate",
    params(
        ("environment_id" = Uuid, Path, description = "Environment ID"),
    ),
    request_body(content = EvaluateRequest, description = "Optional; omit the body to evaluate now"),
    responses(
        (status = 200, description = "Cycle finished", body = CycleReportDto),
        (status = 404, description = "Unknown environment or no hardware configured"),
        (status = 409, description = "Stale device reference or overlapping schedules"),
        (status = 503, description = "Sensor unavailable"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "control"
)]
pub async fn evaluate(
    State(state): State<AppState>,
    Path(environment_id): Path<Uuid>,
    body: Option<Json<EvaluateRequest>>,
) -> Result<Json<CycleReportDto>, AppError> {
    let at = body.and_then(|Json(body)| body.at);
    let outcome = state.control.evaluate(environment_id, at).await?;
    Ok(Json(outcome.into()))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_readings, get_latest_reading, post_measurement, evaluate, health),
    components(schemas(
        ReadingDto,
        MeasurementRequest,
        EvaluateRequest,
        CycleReportDto,
        CycleOutcomeKind,
        TransitionDto,
        CommandFailureDto,
        DeviceSlot,
        Transition,
    )),
    tags(
        (name = "readings", description = "Recorded environment snapshots"),
        (name = "control",  description = "Control cycle endpoints"),
        (name = "system",   description = "System endpoints"),
    ),
    info(
        title = "Habitat Control API",
        version = "0.1.0",
        description = "REST API for environment control cycles and readings"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
