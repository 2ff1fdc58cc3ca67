use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

/// POST /auth/phone — drives `wait_phone_number -> wait_code`.
pub async fn set_phone(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PhoneRequest>,
) -> Result<Json<receipt_chat::auth::AuthStatus>, ApiError> {
    state.chat.set_phone_number(req.phone).await?;
    Ok(Json(state.chat.get_auth_state().await))
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

/// POST /auth/code — drives `wait_code -> ready` (or `wait_password` if
/// two-factor auth is enabled on the account).
pub async fn check_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<receipt_chat::auth::AuthStatus>, ApiError> {
    state.chat.check_code(req.code).await?;
    Ok(Json(state.chat.get_auth_state().await))
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

/// POST /auth/password — drives `wait_password -> ready`.
pub async fn check_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordRequest>,
) -> Result<Json<receipt_chat::auth::AuthStatus>, ApiError> {
    state.chat.check_password(req.password).await?;
    Ok(Json(state.chat.get_auth_state().await))
}

/// POST /auth/resend — re-sends the login code to the phone on file.
pub async fn resend_code(
    State(state): State<Arc<AppState>>,
) -> Result<Json<receipt_chat::auth::AuthStatus>, ApiError> {
    state.chat.resend_code().await?;
    Ok(Json(state.chat.get_auth_state().await))
}
