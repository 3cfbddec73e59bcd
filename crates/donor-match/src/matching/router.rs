use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::allocator::{AllocationOutcome, CandidateView};
use super::domain::RecipientId;
use super::repository::{AuditGateway, NotificationGateway, ProfileStore};
use super::service::{MatchingService, MatchingServiceError, OperatorCredential};

pub const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";
pub const OPERATOR_ID_HEADER: &str = "x-operator-id";

/// Router builder exposing preview, on-demand allocation and the batch command.
pub fn matching_router<S, N, A>(service: Arc<MatchingService<S, N, A>>) -> Router
where
    S: ProfileStore + 'static,
    N: NotificationGateway + 'static,
    A: AuditGateway + 'static,
{
    Router::new()
        .route(
            "/api/v1/matching/recipients/:recipient_id/candidates",
            get(candidates_handler::<S, N, A>),
        )
        .route(
            "/api/v1/matching/recipients/:recipient_id/allocate",
            post(allocate_handler::<S, N, A>),
        )
        .route("/api/v1/matching/batch", post(batch_handler::<S, N, A>))
        .with_state(service)
}

pub(crate) async fn candidates_handler<S, N, A>(
    State(service): State<Arc<MatchingService<S, N, A>>>,
    Path(recipient_id): Path<String>,
) -> Response
where
    S: ProfileStore + 'static,
    N: NotificationGateway + 'static,
    A: AuditGateway + 'static,
{
    let id = RecipientId(recipient_id);
    match service.find_candidates(&id) {
        Ok(ranked) => {
            let candidates: Vec<CandidateView> =
                ranked.iter().map(|candidate| candidate.view()).collect();
            let payload = json!({
                "recipient_id": id,
                "candidates": candidates,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn allocate_handler<S, N, A>(
    State(service): State<Arc<MatchingService<S, N, A>>>,
    Path(recipient_id): Path<String>,
) -> Response
where
    S: ProfileStore + 'static,
    N: NotificationGateway + 'static,
    A: AuditGateway + 'static,
{
    let id = RecipientId(recipient_id);
    match service.allocate(&id) {
        Ok(outcome) => {
            let status = match outcome {
                AllocationOutcome::Matched { .. } => StatusCode::CREATED,
                AllocationOutcome::NoCandidate | AllocationOutcome::Conflict { .. } => {
                    StatusCode::OK
                }
            };
            (status, axum::Json(outcome)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn batch_handler<S, N, A>(
    State(service): State<Arc<MatchingService<S, N, A>>>,
    headers: HeaderMap,
) -> Response
where
    S: ProfileStore + 'static,
    N: NotificationGateway + 'static,
    A: AuditGateway + 'static,
{
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let credential = OperatorCredential {
        operator: header(OPERATOR_ID_HEADER).unwrap_or_else(|| "operator".to_string()),
        token: header(OPERATOR_TOKEN_HEADER).unwrap_or_default(),
    };

    match service.run_batch_allocation(&credential) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: MatchingServiceError) -> Response {
    let status = match &error {
        MatchingServiceError::RecipientNotFound(_) => StatusCode::NOT_FOUND,
        MatchingServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MatchingServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        MatchingServiceError::Allocation(_) | MatchingServiceError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
