use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use accord_types::api::{Claims, CreateRequestRequest, RejectRequestRequest, SendDocumentRequest};
use accord_types::models::{ClientRequest, NewRequest};

use crate::error::ApiError;
use crate::verify::AppState;

pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .create(NewRequest {
            phone: claims.sub,
            iin: req.iin,
            organization: req.organization,
            reason_type: req.reason_type,
            reason_text: req.reason_text,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state.lifecycle.list_for_phone(&claims.sub).await?;
    Ok(Json(requests))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let request = owned_request(&state, id, &claims).await?;
    Ok(Json(request))
}

pub async fn take_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    state.lifecycle.start_processing(id).await?;
    Ok(Json(state.lifecycle.get(id).await?))
}

pub async fn send_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    state.lifecycle.send_document(id, &req.document_type).await?;
    Ok(Json(state.lifecycle.get(id).await?))
}

pub async fn mark_viewed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    state.lifecycle.mark_viewed(id).await?;
    Ok(Json(state.lifecycle.get(id).await?))
}

pub async fn mark_signed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    state.lifecycle.mark_signed(id).await?;
    Ok(Json(state.lifecycle.get(id).await?))
}

pub async fn resolve_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    state.lifecycle.resolve(id).await?;
    Ok(Json(state.lifecycle.get(id).await?))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RejectRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    state.lifecycle.reject(id, &req.reason).await?;
    Ok(Json(state.lifecycle.get(id).await?))
}

/// Requests are exclusively owned by the submitting phone number. A foreign
/// id reads as not-found rather than forbidden, so ids cannot be probed.
pub(crate) async fn owned_request(
    state: &AppState,
    id: Uuid,
    claims: &Claims,
) -> Result<ClientRequest, ApiError> {
    let request = state.lifecycle.get(id).await?;
    if request.phone != claims.sub {
        return Err(ApiError::not_found());
    }
    Ok(request)
}
