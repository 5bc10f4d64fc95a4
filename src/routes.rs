use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::NewUserFields,
    complaints::NewComplaint,
    error::AppError,
    models::{ComplaintStatus, UserProfile},
    state::AppState,
    tracking::tracking_view,
    utils::normalize_complaint_id,
};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, UserProfile), AppError> {
    let token = bearer_token(headers).ok_or(AppError::InvalidCredentials)?;
    let profile = state
        .sessions
        .current(token)
        .await
        .ok_or(AppError::InvalidCredentials)?;

    Ok((token.to_string(), profile))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub fields: NewUserFields,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .register(&payload.email, &payload.password, payload.fields)
        .await?;

    let token = state.sessions.open(user.clone(), Vec::new()).await;

    Ok(Json(AuthResponse { token, user }))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.login(&payload.email, &payload.password).await?;
    let complaints = state.complaints.list_by_owner(&user.uid).await?;
    let token = state.sessions.open(user.clone(), complaints).await;

    Ok(Json(AuthResponse { token, user }))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.close(token).await;
    }

    StatusCode::NO_CONTENT
}

/// Current identity, or null when the token has no live session. Resolves
/// the profile through the gateway so an unreadable profile store degrades
/// to a synthesized profile instead of a forced sign-out.
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let Some(token) = bearer_token(&headers) else {
        return Ok(Json(None::<UserProfile>));
    };
    let Some(session_profile) = state.sessions.current(token).await else {
        return Ok(Json(None::<UserProfile>));
    };

    let user = state.auth.current_user(&session_profile.uid).await?;
    Ok(Json(user))
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewComplaint>,
) -> Result<impl IntoResponse, AppError> {
    let (token, user) = require_session(&state, &headers).await?;

    let complaint = state.complaints.submit(&user.uid, payload).await?;
    state.sessions.prepend(&token, complaint.clone()).await;

    Ok(Json(complaint))
}

/// Serves the session's cached complaint set, not a fresh store read.
pub async fn my_complaints_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (token, _) = require_session(&state, &headers).await?;

    let complaints = state.sessions.complaints(&token).await.unwrap_or_default();
    Ok(Json(complaints))
}

/// Explicit reload: replaces the session cache with a fresh owner query.
pub async fn reload_complaints_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (token, user) = require_session(&state, &headers).await?;

    let complaints = state.complaints.list_by_owner(&user.uid).await?;
    state.sessions.replace(&token, complaints.clone()).await;

    Ok(Json(complaints))
}

pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (token, _) = require_session(&state, &headers).await?;

    let stats = state.sessions.stats(&token).await.unwrap_or_default();
    Ok(Json(stats))
}

/// Tracking lookup. The session's cached complaints act as the local
/// overlay, so a just-submitted complaint is trackable immediately.
pub async fn track_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let overlay = match bearer_token(&headers) {
        Some(token) => state.sessions.complaints(token).await.unwrap_or_default(),
        None => Vec::new(),
    };

    match state.tracker.resolve(&id, &overlay).await? {
        Some(complaint) => Ok(Json(tracking_view(complaint))),
        None => Err(AppError::NotFound),
    }
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ComplaintStatus,
    #[serde(default)]
    pub description: String,
}

pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = normalize_complaint_id(&id);
    state
        .complaints
        .append_status(&id, payload.status, &payload.description)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Unscoped administrative read; authorization, if any, sits in front of
/// this service.
pub async fn all_complaints_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let complaints = state.complaints.list_all().await?;
    Ok(Json(complaints))
}
