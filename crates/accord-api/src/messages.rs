use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use accord_types::api::{AppendMessageRequest, Claims};

use crate::error::ApiError;
use crate::requests::owned_request;
use crate::verify::AppState;

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    let messages = state.chat.list(id).await?;
    Ok(Json(messages))
}

pub async fn append_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_request(&state, id, &claims).await?;
    let message = state.chat.append(id, req.sender, req.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
