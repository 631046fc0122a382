use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::board::{ExecutionMode, ExecutionStage};
use flowboard::flow::execution::LogLevel;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Serialize)]
pub struct BoardSettings {
    pub execution_mode: ExecutionMode,
    pub stage: ExecutionStage,
    pub log_level: LogLevel,
    pub version: (u32, u32, u32),
}

#[tracing::instrument(name = "GET /apps/{app_id}/board/{board_id}/settings", skip(state, user))]
pub async fn get_board_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
) -> Result<Json<BoardSettings>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    let board = state
        .app(&app_id)
        .open_board(board_id, Some(false), None)
        .await?;
    let guard = board.lock().await;

    Ok(Json(BoardSettings {
        execution_mode: guard.execution_mode.clone(),
        stage: guard.stage.clone(),
        log_level: guard.log_level,
        version: guard.version,
    }))
}

#[tracing::instrument(name = "GET /apps/{app_id}/board/open", skip(state, user))]
pub async fn get_open_boards(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    Ok(Json(state.app(&app_id).get_open_boards()?))
}

#[tracing::instrument(name = "POST /apps/{app_id}/board/{board_id}/close", skip(state, user))]
pub async fn close_board(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    state.app(&app_id).close_board(&board_id)?;
    Ok(Json(json!({ "closed": board_id })))
}
