use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[tracing::instrument(name = "POST /apps/{app_id}/event/{event_id}/validate", skip(state, user))]
pub async fn validate_event(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadEvents);
    permission.sub()?;

    state.app(&app_id).validate_event(&event_id).await?;
    Ok(Json(json!({ "valid": true })))
}

#[tracing::instrument(name = "GET /apps/{app_id}/event/{event_id}/sink", skip(state, user))]
pub async fn is_event_sink_active(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadEvents);
    permission.sub()?;

    let active = state.app(&app_id).is_event_sink_active(&event_id).await?;
    Ok(Json(json!({ "active": active })))
}
