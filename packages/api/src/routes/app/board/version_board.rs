use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::board::VersionType;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateVersionBody {
    pub version_type: VersionType,
}

#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/version",
    skip(state, user, body)
)]
pub async fn create_version(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Json(body): Json<CreateVersionBody>,
) -> Result<Json<(u32, u32, u32)>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteBoards);
    permission.sub()?;

    let version = state
        .app(&app_id)
        .create_board_version(&board_id, body.version_type)
        .await?;
    Ok(Json(version))
}

#[tracing::instrument(name = "GET /apps/{app_id}/board/{board_id}/version", skip(state, user))]
pub async fn get_versions(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
) -> Result<Json<Vec<(u32, u32, u32)>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    let versions = state.app(&app_id).get_board_versions(&board_id).await?;
    Ok(Json(versions))
}
