//! HTTP API
//!
//! Thin warp layer over the orchestrator: submissions return `202` as soon
//! as the job is queued, and clients poll the task resource for progress.

pub mod models;

pub use models::{
    ErrorResponse, GenericTaskRequest, NicheAnalysisRequest, TaskAcceptedResponse,
    TaskStatusResponse,
};

use crate::error::OrchestratorError;
use crate::health::HealthCheckManager;
use crate::observability::metrics::metrics;
use crate::orchestrator::TaskOrchestrator;
use crate::task::{Submission, TaskType};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Requester recorded when the client does not identify itself
pub const ANONYMOUS_REQUESTER: &str = "anonymous";

/// Shared state handed to every handler
pub struct ApiState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub health: Arc<HealthCheckManager>,
    pub service_name: String,
}

/// All routes with CORS and request logging applied
pub fn routes(
    state: Arc<ApiState>,
    cors_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = root(state.clone())
        .or(health(state.clone()))
        .or(metrics_route())
        .or(submit_niche_analysis(state.clone()))
        .or(submit_task(state.clone()))
        .or(get_task(state));

    // Rejections are turned into replies inside the CORS wrapper so error
    // bodies carry the allow-origin header; the outer recover only sees
    // CorsForbidden.
    api.recover(handle_rejection)
        .with(cors(cors_origins))
        .recover(handle_rejection)
        .with(warp::log::custom(|info| {
            info!(
                method = %info.method(),
                path = info.path(),
                status = info.status().as_u16(),
                elapsed_ms = info.elapsed().as_millis() as u64,
                "HTTP request"
            );
        }))
}

fn with_state(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (Arc<ApiState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn cors(origins: &[String]) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"])
        .allow_credentials(true);

    let valid: Vec<&str> = origins
        .iter()
        .map(String::as_str)
        .filter(|origin| {
            let ok = origin.starts_with("http://") || origin.starts_with("https://");
            if !ok {
                warn!(origin, "Ignoring malformed CORS origin");
            }
            ok
        })
        .collect();

    if valid.is_empty() {
        warn!("No CORS origins configured, allowing any origin");
        builder.allow_any_origin()
    } else {
        builder.allow_origins(valid)
    }
}

fn json_with_status<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(status: StatusCode, error: &str, detail: impl Into<String>) -> Response {
    json_with_status(
        &ErrorResponse {
            error: error.to_string(),
            detail: detail.into(),
        },
        status,
    )
}

/// Map an orchestrator failure onto an HTTP response
pub fn orchestrator_error_reply(err: &OrchestratorError) -> Response {
    match err {
        OrchestratorError::Validation { message } => {
            error_reply(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message.clone())
        }
        OrchestratorError::NotFound(id) => {
            error_reply(StatusCode::NOT_FOUND, "not_found", format!("task {id} not found"))
        }
        OrchestratorError::StoreUnavailable { .. } => error_reply(
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            "task store is unavailable, try again later",
        ),
        OrchestratorError::DispatchUnavailable { .. } => error_reply(
            StatusCode::SERVICE_UNAVAILABLE,
            "dispatch_unavailable",
            "task queue is not accepting work",
        ),
        OrchestratorError::Internal { .. } => error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "unexpected error",
        ),
    }
}

// GET /
fn root(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and(with_state(state))
        .map(|state: Arc<ApiState>| {
            let body = serde_json::json!({
                "message": format!("{} API is running!", state.service_name)
            });
            warp::reply::json(&body).into_response()
        })
}

// GET /health
fn health(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .then(|state: Arc<ApiState>| async move {
            let report = state.health.report().await;
            let status = if report.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json_with_status(&report, status)
        })
}

// GET /metrics
fn metrics_route() -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()).into_response())
}

// POST /api/v1/tasks/analyze-niche
fn submit_niche_analysis(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "tasks" / "analyze-niche")
        .and(warp::post())
        .and(json_body::<NicheAnalysisRequest>())
        .and(with_state(state))
        .then(|request: NicheAnalysisRequest, state: Arc<ApiState>| async move {
            let submission = Submission {
                task_type: TaskType::AnalyzeNiche,
                project_id: request.project_id,
                requester_id: requester_or_anonymous(request.requester_id),
                payload: request.user_input,
            };
            accept(&state, submission, "Niche analysis task accepted and started in background.")
                .await
        })
}

// POST /api/v1/tasks
fn submit_task(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "tasks")
        .and(warp::post())
        .and(json_body::<GenericTaskRequest>())
        .and(with_state(state))
        .then(|request: GenericTaskRequest, state: Arc<ApiState>| async move {
            let submission = Submission {
                task_type: request.task_type,
                project_id: request.project_id,
                requester_id: requester_or_anonymous(request.requester_id),
                payload: request.payload,
            };
            accept(&state, submission, "Task accepted and started in background.").await
        })
}

// GET /api/v1/tasks/{task_id}
fn get_task(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "tasks" / String)
        .and(warp::get())
        .and(with_state(state))
        .then(|raw_id: String, state: Arc<ApiState>| async move {
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                return error_reply(
                    StatusCode::BAD_REQUEST,
                    "invalid_task_id",
                    format!("'{raw_id}' is not a valid task id"),
                );
            };

            match state.orchestrator.get_status(id).await {
                Ok(record) => json_with_status(&TaskStatusResponse::from(record), StatusCode::OK),
                Err(e) => {
                    debug!(task_id = %id, "Task lookup failed: {}", e);
                    orchestrator_error_reply(&e)
                }
            }
        })
}

fn requester_or_anonymous(requester: Option<String>) -> String {
    requester
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_REQUESTER.to_string())
}

async fn accept(state: &ApiState, submission: Submission, message: &str) -> Response {
    match state.orchestrator.submit(submission).await {
        Ok(record) => json_with_status(
            &TaskAcceptedResponse {
                task_id: record.id,
                status: record.status,
                message: message.to_string(),
            },
            StatusCode::ACCEPTED,
        ),
        Err(e) => orchestrator_error_reply(&e),
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let reply = if err.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "not_found", "no such route")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_reply(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", "request body too large")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        error_reply(
            StatusCode::LENGTH_REQUIRED,
            "length_required",
            "request body must declare a content length",
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_media_type",
            "expected application/json",
        )
    } else if err.find::<warp::cors::CorsForbidden>().is_some() {
        error_reply(StatusCode::FORBIDDEN, "cors_forbidden", "origin not allowed")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "method not allowed")
    } else {
        warn!("Unhandled rejection: {:?}", err);
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "unexpected error")
    };
    Ok(reply)
}
