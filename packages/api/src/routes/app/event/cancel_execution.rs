use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

/// Move a run to `Cancelling`. The call returns immediately; the run
/// reports `run.finished{Cancelled}` once it yields or the grace period
/// elapses.
#[tracing::instrument(
    name = "POST /apps/{app_id}/event/runs/{run_id}/cancel",
    skip(state, user)
)]
pub async fn cancel_execution(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, run_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ExecuteEvents);
    permission.sub()?;

    state.app(&app_id).cancel_execution(&run_id).await?;
    Ok(Json(json!({ "cancelling": run_id })))
}
