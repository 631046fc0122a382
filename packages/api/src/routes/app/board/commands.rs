use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::board::commands::GenericCommand;
use serde_json::{Value, json};

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

/// Apply a command batch as one transaction. The response carries the
/// inverse commands in application order; clients push them on their undo
/// stack verbatim.
#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/commands",
    skip(state, user, commands)
)]
pub async fn execute_commands(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Json(commands): Json<Vec<GenericCommand>>,
) -> Result<Json<Vec<GenericCommand>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteBoards);
    permission.sub()?;

    let inverted = state
        .app(&app_id)
        .execute_commands(&board_id, commands)
        .await?;
    Ok(Json(inverted))
}

#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/undo",
    skip(state, user, commands)
)]
pub async fn undo(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Json(commands): Json<Vec<GenericCommand>>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteBoards);
    permission.sub()?;

    state.app(&app_id).undo_commands(&board_id, commands).await?;
    Ok(Json(json!({ "ok": true })))
}

#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/redo",
    skip(state, user, commands)
)]
pub async fn redo(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Json(commands): Json<Vec<GenericCommand>>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteBoards);
    permission.sub()?;

    state.app(&app_id).redo_commands(&board_id, commands).await?;
    Ok(Json(json!({ "ok": true })))
}
