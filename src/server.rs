//! HTTP API server: axum router and request handlers.
//!
//! The server runs on a tokio runtime on its own thread. Read endpoints
//! take snapshots of the shared state directly. Anything that changes the
//! simulation is queued as a [`Command`] on the same channel the console
//! reader uses, so the dispatcher stays the only writer.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Path`, `Json`
//! - `Arc` for sharing state across async tasks
//! - `tower-http` middleware for CORS and request tracing

use crate::calendar::Phase;
use crate::clock::{ClockPhase, ClockStatus};
use crate::command::Command;
use crate::feeder::FeederState;
use crate::model::{AltitudeSample, altitude_samples};
use crate::report::ALTITUDE_SAMPLE_MINUTES;
use crate::schedule::ScheduleEntry;
use crate::state::{ParamUpdate, SharedState, SimSettings};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State`
/// extractor.
///
/// Rust concept: CLONE for Arc
/// axum clones the state for each request, so everything inside must be
/// cheap to clone. `Sender`, `SharedState` and `Arc` all are.
#[derive(Clone)]
pub struct AppState {
    /// Channel into the dispatcher
    pub command_tx: Sender<Command>,
    /// Current settings and schedule
    pub shared: SharedState,
    /// Clock progress (clock thread writes, handlers read)
    pub status: Arc<Mutex<ClockStatus>>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_schedule,
        get_altitude,
        post_start,
        post_quit,
        post_params,
    ),
    components(schemas(
        StatusResponse,
        SimSettings,
        ClockStatus,
        ClockPhase,
        FeederState,
        ScheduleEntry,
        Phase,
        AltitudeSample,
        ParamUpdate,
    )),
    tags(
        (name = "simulation", description = "Simulation control endpoints"),
        (name = "schedule", description = "Lunar schedule endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Gibbous API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for the lunar cycle simulator"
    )
)]
pub struct ApiDoc;

// ── Response types ───────────────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    /// Current operator settings
    pub settings: SimSettings,
    /// Day 0 of the current cycle
    #[schema(value_type = String, example = "2025-06-01T21:14:00")]
    pub cycle_start: NaiveDateTime,
    /// Schedule rebuilds since startup
    pub generation: u64,
    /// What the clock did last
    pub clock: ClockStatus,
    /// Server version
    pub version: String,
}

type ApiError = (StatusCode, String);

fn dispatcher_gone() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Dispatcher gone".to_string(),
    )
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/schedule", get(get_schedule))
        .route("/api/v1/schedule/{day}/altitude", get(get_altitude))
        .route("/api/v1/start", post(post_start))
        .route("/api/v1/quit", post(post_quit))
        .route("/api/v1/params", post(post_params))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status: settings and clock progress
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current simulation status", body = StatusResponse)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.shared.snapshot();
    let clock = state
        .status
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    Json(StatusResponse {
        settings: snapshot.settings.clone(),
        cycle_start: snapshot.cycle_start,
        generation: snapshot.generation,
        clock,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/v1/schedule: the full day-by-day schedule
#[utoipa::path(
    get,
    path = "/api/v1/schedule",
    tag = "schedule",
    responses(
        (status = 200, description = "One entry per simulated day", body = Vec<ScheduleEntry>)
    )
)]
async fn get_schedule(State(state): State<AppState>) -> Json<Vec<ScheduleEntry>> {
    Json(state.shared.snapshot().schedule().to_vec())
}

/// GET /api/v1/schedule/{day}/altitude: altitude curve of one day
#[utoipa::path(
    get,
    path = "/api/v1/schedule/{day}/altitude",
    tag = "schedule",
    params(("day" = usize, Path, description = "Day index within the cycle")),
    responses(
        (status = 200, description = "Samples every 30 minutes, empty on a new moon", body = Vec<AltitudeSample>),
        (status = 404, description = "Day is outside the cycle")
    )
)]
async fn get_altitude(
    State(state): State<AppState>,
    Path(day): Path<usize>,
) -> Result<Json<Vec<AltitudeSample>>, ApiError> {
    let snapshot = state.shared.snapshot();
    let entry = snapshot.schedule().get(day).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!(
                "Day {day} is outside the cycle [0, {}]",
                snapshot.schedule().len().saturating_sub(1)
            ),
        )
    })?;

    Ok(Json(altitude_samples(
        entry,
        snapshot.cycle_start,
        TimeDelta::minutes(ALTITUDE_SAMPLE_MINUTES),
    )))
}

/// POST /api/v1/start: start the simulation
#[utoipa::path(
    post,
    path = "/api/v1/start",
    tag = "simulation",
    responses(
        (status = 202, description = "Start queued"),
    )
)]
async fn post_start(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state
        .command_tx
        .send(Command::Start)
        .map_err(|_| dispatcher_gone())?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/quit: stop the simulation and exit
#[utoipa::path(
    post,
    path = "/api/v1/quit",
    tag = "simulation",
    responses(
        (status = 202, description = "Quit queued"),
    )
)]
async fn post_quit(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state
        .command_tx
        .send(Command::Quit)
        .map_err(|_| dispatcher_gone())?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/params: change settings, rebuilding the schedule
///
/// Omitted fields keep their current value. Times are `HH:MM`, colors
/// up to 6 hex digits.
#[utoipa::path(
    post,
    path = "/api/v1/params",
    tag = "simulation",
    request_body = ParamUpdate,
    responses(
        (status = 202, description = "Change queued"),
        (status = 400, description = "Invalid parameter")
    )
)]
async fn post_params(
    State(state): State<AppState>,
    Json(update): Json<ParamUpdate>,
) -> Result<StatusCode, ApiError> {
    update
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    state
        .command_tx
        .send(Command::ChangeParams(update))
        .map_err(|_| dispatcher_gone())?;
    Ok(StatusCode::ACCEPTED)
}
