use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::board::Board;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[tracing::instrument(name = "GET /apps/{app_id}/board", skip(state, user))]
pub async fn get_boards(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<Board>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    let boards = state.app(&app_id).get_boards().await?;
    Ok(Json(boards))
}

#[tracing::instrument(name = "GET /apps/{app_id}/board/{board_id}", skip(state, user))]
pub async fn get_board(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
) -> Result<Json<Board>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    let board = state
        .app(&app_id)
        .open_board(board_id, Some(false), None)
        .await?;
    let board = board.lock().await.clone();
    Ok(Json(board))
}
