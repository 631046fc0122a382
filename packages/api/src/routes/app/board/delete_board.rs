use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[tracing::instrument(name = "DELETE /apps/{app_id}/board/{board_id}", skip(state, user))]
pub async fn delete_board(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::WriteBoards);
    permission.sub()?;

    state.app(&app_id).delete_board(&board_id).await?;
    Ok(Json(json!({ "deleted": board_id })))
}
