use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use super::domain::{AlertId, LeadId};
use super::pass::{AutomationError, PassKind};
use super::repository::{MessageSender, RecordStore, SnapshotFilter, StoreError, TextGenerator};
use super::service::AutomationService;

/// Router exposing "run now" passes, alert resolution, and lead scores.
pub fn automation_router<S, M, G>(service: Arc<AutomationService<S, M, G>>) -> Router
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    Router::new()
        .route(
            "/api/v1/automation/passes/:kind",
            post(run_pass_handler::<S, M, G>),
        )
        .route(
            "/api/v1/automation/alerts/:alert_id/resolve",
            post(resolve_alert_handler::<S, M, G>),
        )
        .route(
            "/api/v1/automation/leads/:lead_id/score",
            get(score_handler::<S, M, G>),
        )
        .with_state(service)
}

pub(crate) async fn run_pass_handler<S, M, G>(
    State(service): State<Arc<AutomationService<S, M, G>>>,
    Path(kind): Path<String>,
    filter: Option<axum::Json<SnapshotFilter>>,
) -> Response
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    let Some(kind) = PassKind::parse(&kind) else {
        let payload = json!({
            "error": format!("unknown pass kind '{kind}'"),
        });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    };
    let filter = filter.map(|axum::Json(filter)| filter).unwrap_or_default();

    match service.run_pass(kind, &filter, Utc::now()).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resolve_alert_handler<S, M, G>(
    State(service): State<Arc<AutomationService<S, M, G>>>,
    Path(alert_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    match service.resolve_alert(&AlertId(alert_id), Utc::now()).await {
        Ok(alert) => (StatusCode::OK, axum::Json(alert)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn score_handler<S, M, G>(
    State(service): State<Arc<AutomationService<S, M, G>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    let id = LeadId(lead_id);
    match service.score_lead(&id).await {
        Ok(score) => {
            let payload = json!({
                "lead_id": id,
                "score": score.score,
                "tier": score.tier.label(),
                "components": score.components,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: AutomationError) -> Response {
    let status = match &error {
        AutomationError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        AutomationError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AutomationError::Store(StoreError::Unavailable(_)) | AutomationError::Timeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
