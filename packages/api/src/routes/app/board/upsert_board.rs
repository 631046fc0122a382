use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::board::Board;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpsertBoardBody {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[tracing::instrument(name = "PUT /apps/{app_id}/board/{board_id}", skip(state, user, body))]
pub async fn upsert_board(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Json(body): Json<UpsertBoardBody>,
) -> Result<Json<Board>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteBoards);
    permission.sub()?;

    let board = state
        .app(&app_id)
        .upsert_board(&board_id, body.name, body.description)
        .await?;
    let board = board.lock().await.clone();
    Ok(Json(board))
}
