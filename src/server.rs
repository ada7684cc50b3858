//! HTTP API served by `lifeplanned`.
//!
//! **Plans:**
//! - `GET  /plans/today`: today's committed plan
//! - `GET  /plans/{date}`: committed plan for a date
//! - `POST /plans/regenerate[?date=YYYY-MM-DD]`: rebuild and return the plan
//!
//! **Suggestions:**
//! - `GET  /ai-los/suggestions`: active suggestions
//! - `POST /ai-los/suggestions/{id}/dismiss`: dismiss (204)
//!
//! **Tasks:**
//! - `GET    /tasks[?status=&is_approved=&page=&page_size=]`
//! - `GET    /tasks/{id}`, `POST /tasks`, `PUT /tasks/{id}`, `DELETE /tasks/{id}`
//! - `POST   /tasks/{id}/approve`, `POST /tasks/{id}/complete`
//!
//! **Settings:** `GET /settings`, `PUT /settings`
//!
//! **Health:** `GET /health`, `GET /info`
//!
//! Every route except `/health` needs the `X-User-Id` header.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{PlanError, PlannerError, StoreError, TaskError};
use crate::plan::{self, DailyPlan};
use crate::planner::{Planner, PlannerInfo};
use crate::session::{Session, SessionError, USER_HEADER};
use crate::settings::{SettingsPatch, UserSettings};
use crate::suggest::Suggestion;
use crate::task::{NewTask, Task, TaskFilter, TaskPage, TaskPatch};

// ── Server state ──────────────────────────────────────────────────────────

pub struct ServerState {
    planner: Arc<Planner>,
    started: Instant,
}

impl ServerState {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self {
            planner,
            started: Instant::now(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────

/// JSON error body: `{"error": code, "message": ..., "retryable": bool}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    retryable: bool,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        let retryable = err.is_retryable();
        let (status, code) = match &err {
            PlannerError::Plan(PlanError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "plan_not_found")
            }
            PlannerError::Plan(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            PlannerError::Task(TaskError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "task_not_found")
            }
            PlannerError::Task(TaskError::Validation { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
            }
            PlannerError::Task(TaskError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            PlannerError::Upstream(_) => (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable"),
            PlannerError::Store(StoreError::Unavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            PlannerError::Store(_) | PlannerError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, code, "request failed");
        }
        Self {
            status,
            code,
            message: err.to_string(),
            retryable,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::Missing => StatusCode::UNAUTHORIZED,
            SessionError::Invalid { .. } => StatusCode::BAD_REQUEST,
        };
        Self::new(status, "unauthorized", err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: &self.message,
            retryable: self.retryable,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Session extraction ────────────────────────────────────────────────────

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or(SessionError::Missing)?
            .to_str()
            .map_err(|_| SessionError::Invalid {
                id: "<non-ascii>".into(),
            })?;
        Ok(Session::new(raw)?)
    }
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RegenerateQuery {
    date: Option<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

async fn info(State(state): State<Arc<ServerState>>, _session: Session) -> ApiResult<Json<PlannerInfo>> {
    Ok(Json(state.planner.info()?))
}

async fn plan_today(
    State(state): State<Arc<ServerState>>,
    session: Session,
) -> ApiResult<Json<DailyPlan>> {
    let plan = state.planner.today(&session)?;
    Ok(Json(DailyPlan::clone(&plan)))
}

async fn plan_for_date(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(date): Path<String>,
) -> ApiResult<Json<DailyPlan>> {
    let date = plan::parse_date(&date).map_err(PlannerError::from)?;
    let plan = state.planner.plan_for(&session, date)?;
    Ok(Json(DailyPlan::clone(&plan)))
}

async fn regenerate(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Query(query): Query<RegenerateQuery>,
) -> ApiResult<Json<DailyPlan>> {
    let date = query
        .date
        .as_deref()
        .map(plan::parse_date)
        .transpose()
        .map_err(PlannerError::from)?;

    let planner = Arc::clone(&state.planner);
    let plan = tokio::task::spawn_blocking(move || planner.regenerate(&session, date))
        .await
        .map_err(|e| ApiError::internal(format!("plan build task failed: {e}")))??;
    Ok(Json(DailyPlan::clone(&plan)))
}

async fn list_suggestions(
    State(state): State<Arc<ServerState>>,
    session: Session,
) -> ApiResult<Json<Vec<Suggestion>>> {
    Ok(Json(state.planner.suggestions(&session)?))
}

async fn dismiss_suggestion(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.planner.dismiss_suggestion(&session, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tasks(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<TaskPage>> {
    Ok(Json(state.planner.list_tasks(&session, &filter)?))
}

async fn get_task(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.planner.get_task(&session, &id)?))
}

async fn create_task(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Json(new): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.planner.create_task(&session, new)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.planner.update_task(&session, &id, patch)?))
}

async fn approve_task(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.planner.approve_task(&session, &id)?))
}

async fn complete_task(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.planner.complete_task(&session, &id)?))
}

async fn delete_task(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.planner.delete_task(&session, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_settings(
    State(state): State<Arc<ServerState>>,
    session: Session,
) -> ApiResult<Json<UserSettings>> {
    Ok(Json(state.planner.settings(&session)?))
}

async fn put_settings(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Json(patch): Json<SettingsPatch>,
) -> ApiResult<Json<UserSettings>> {
    Ok(Json(state.planner.update_settings(&session, patch)?))
}

// ── Router ────────────────────────────────────────────────────────────────

/// Build the application router over a shared planner.
pub fn router(planner: Arc<Planner>) -> Router {
    let state = Arc::new(ServerState::new(planner));
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        // Plans.
        .route("/plans/today", get(plan_today))
        .route("/plans/regenerate", post(regenerate))
        .route("/plans/{date}", get(plan_for_date))
        // Suggestions.
        .route("/ai-los/suggestions", get(list_suggestions))
        .route("/ai-los/suggestions/{id}/dismiss", post(dismiss_suggestion))
        // Tasks.
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/approve", post(approve_task))
        .route("/tasks/{id}/complete", post(complete_task))
        // Settings.
        .route("/settings", get(get_settings).put(put_settings))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    planner: Arc<Planner>,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("lifeplanned listening on {addr}");
    axum::serve(listener, router(planner))
        .with_graceful_shutdown(shutdown)
        .await
}
