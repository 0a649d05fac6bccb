use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use accord_chat::ChatLog;
use accord_lifecycle::LifecycleEngine;
use accord_types::api::{
    Claims, IssueCodeRequest, IssueCodeResponse, VerifyCodeRequest, VerifyCodeResponse,
};
use accord_verify::{IssueReceipt, VerificationService, normalize_phone};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub verify: VerificationService,
    pub lifecycle: LifecycleEngine,
    pub chat: ChatLog,
    pub jwt_secret: String,
}

pub async fn issue_code(
    State(state): State<AppState>,
    Json(req): Json<IssueCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.verify.issue(&req.phone).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt_response(receipt))))
}

pub async fn resend_code(
    State(state): State<AppState>,
    Json(req): Json<IssueCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.verify.resend(&req.phone).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt_response(receipt))))
}

/// A matching code flips the record to verified and mints the session token
/// the protected routes require. A mismatch is a 200 with verified=false —
/// it is an expected outcome, not a transport error.
pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let verified = state.verify.verify(&req.phone, &req.code).await?;

    let token = if verified {
        let phone = normalize_phone(&req.phone)?;
        Some(create_token(&state.jwt_secret, &phone)?)
    } else {
        None
    };

    Ok(Json(VerifyCodeResponse { verified, token }))
}

fn receipt_response(receipt: IssueReceipt) -> IssueCodeResponse {
    IssueCodeResponse {
        correlation_id: receipt.correlation_id,
        expires_at: receipt.expires_at,
        next_resend_at: receipt.next_resend_at,
    }
}

fn create_token(secret: &str, phone: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: phone.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
