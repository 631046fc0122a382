//! Realtime collaboration auth (JWT + room key).
//!
//! Awareness transport is an external substrate; this service only mints
//! short-lived, board-scoped tokens and publishes the verification keys.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    backend_jwt,
    ensure_permission,
    error::ApiError,
    middleware::jwt::AppUser,
    permission::RolePermissions,
    state::AppState,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RealtimeParams {
    /// Connection endpoint for the room.
    pub url: String,
    /// JWT authorizing the user for this `(app_id, board_id)` room.
    pub token: String,
    /// Room identifier, `"{app_id}:{board_id}"`.
    pub room: String,
    /// Base64 256-bit room key (rotated daily).
    pub encryption_key: String,
    /// Key identifier (ISO date, e.g. "2025-10-23").
    pub key_id: String,
}

// ============================================================================
// JWKS (token verification keys for peers)
// ============================================================================
#[tracing::instrument(
    name = "GET /apps/{app_id}/board/{board_id}/realtime",
    skip(state, user)
)]
pub async fn jwks(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((_app_id, _board_id)): Path<(String, String)>,
) -> Result<Json<backend_jwt::Jwks>, ApiError> {
    user.sub()?;

    let jwt = state
        .realtime
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Realtime not configured"))?;

    Ok(Json(jwt.jwks()))
}

// ============================================================================
// Access token + room key
// ============================================================================
#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/realtime",
    skip(state, user)
)]
pub async fn access(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
) -> Result<Json<RealtimeParams>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    let sub = permission.sub()?;

    let jwt = state
        .realtime
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Realtime not configured"))?;

    let mut permissions = vec!["read".to_string()];
    if permission.has_permission(&app_id, RolePermissions::WriteBoards) {
        permissions.push("write".to_string());
    }

    let token = jwt.sign_realtime(&sub, permission.name(), &app_id, &board_id, permissions)?;

    let room = flowboard::flow::realtime::room_id(&app_id, &board_id);
    let key = state.room_key(&app_id, &board_id);

    // Make sure the room exists so awareness subscribers find it.
    state.awareness.get_or_create(&room);

    Ok(Json(RealtimeParams {
        url: std::env::var("FLOWBOARD_REALTIME_URL")
            .unwrap_or_else(|_| "wss://realtime.flowboard.local".to_string()),
        token,
        room,
        encryption_key: key.encryption_key,
        key_id: key.key_id,
    }))
}
