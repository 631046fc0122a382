use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use flowboard::flow::event::Event;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, routes::app::board::prerun_board::parse_version,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct GetEventQuery {
    pub version: Option<String>,
}

#[tracing::instrument(name = "GET /apps/{app_id}/event", skip(state, user))]
pub async fn get_events(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadEvents);
    permission.sub()?;

    let events = state.app(&app_id).get_events().await?;
    Ok(Json(events))
}

#[tracing::instrument(name = "GET /apps/{app_id}/event/{event_id}", skip(state, user))]
pub async fn get_event(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
    Query(query): Query<GetEventQuery>,
) -> Result<Json<Event>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadEvents);
    permission.sub()?;

    let version = query.version.as_ref().and_then(|v| parse_version(v));
    let event = state.app(&app_id).get_event(&event_id, version).await?;
    Ok(Json(event))
}

#[tracing::instrument(name = "GET /apps/{app_id}/event/{event_id}/versions", skip(state, user))]
pub async fn get_versions(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
) -> Result<Json<Vec<(u32, u32, u32)>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadEvents);
    permission.sub()?;

    let versions = state.app(&app_id).get_event_versions(&event_id).await?;
    Ok(Json(versions))
}
