use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::board::VersionType;
use flowboard::flow::event::Event;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpsertEventBody {
    pub event: Event,
    pub version_type: Option<VersionType>,
}

#[tracing::instrument(name = "PUT /apps/{app_id}/event", skip(state, user, body))]
pub async fn upsert_event(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(app_id): Path<String>,
    Json(body): Json<UpsertEventBody>,
) -> Result<Json<Event>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteEvents);
    permission.sub()?;

    let event = state
        .app(&app_id)
        .upsert_event(body.event, body.version_type)
        .await?;
    Ok(Json(event))
}

#[tracing::instrument(name = "DELETE /apps/{app_id}/event/{event_id}", skip(state, user))]
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteEvents);
    permission.sub()?;

    state.app(&app_id).delete_event(&event_id).await?;
    Ok(Json(json!({ "deleted": event_id })))
}
