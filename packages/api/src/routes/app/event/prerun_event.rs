use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::prerun::PrerunReport;
use serde::Serialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Serialize)]
pub struct PrerunEventResponse {
    pub board_id: String,
    #[serde(flatten)]
    pub report: PrerunReport,
}

/// Pre-run analysis against the board version the event pins.
#[tracing::instrument(name = "GET /apps/{app_id}/event/{event_id}/prerun", skip(state, user))]
pub async fn prerun_event(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
) -> Result<Json<PrerunEventResponse>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ExecuteEvents);
    permission.sub()?;

    let can_execute_locally = permission.has_permission(&app_id, RolePermissions::ReadBoards);

    let (board_id, report) = state
        .app(&app_id)
        .prerun_event(&event_id, can_execute_locally)
        .await?;

    Ok(Json(PrerunEventResponse { board_id, report }))
}
