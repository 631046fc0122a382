use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::execution::{LogMeta, RunPayload};
use flowboard_types::intercom::noop_callback;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ExecuteBoardBody {
    pub payload: RunPayload,
    #[serde(default)]
    pub stream_state: bool,
    #[serde(default)]
    pub skip_consent_check: bool,
}

/// Execute a board on the executor this façade fronts. The call returns
/// once the run finalizes; the streamed intercom events land in the run's
/// `events.log` and are queryable afterwards.
#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/execute",
    skip(state, user, body)
)]
pub async fn execute_board(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Json(body): Json<ExecuteBoardBody>,
) -> Result<Json<LogMeta>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ExecuteBoards);
    let sub = permission.sub()?;

    let meta = state
        .app(&app_id)
        .execute_board(
            &board_id,
            body.payload,
            body.stream_state,
            None,
            noop_callback(),
            Some(sub),
            state.executor,
            body.skip_consent_check,
        )
        .await?;

    Ok(Json(meta))
}
