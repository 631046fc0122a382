use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::execution::log::LogMessage;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct QueryLogsBody {
    #[serde(default)]
    pub query: String,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[tracing::instrument(
    name = "POST /apps/{app_id}/board/{board_id}/runs/{run_id}/query",
    skip(state, user, body)
)]
pub async fn query_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id, run_id)): Path<(String, String, String)>,
    Json(body): Json<QueryLogsBody>,
) -> Result<Json<Vec<LogMessage>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadRuns);
    permission.sub()?;

    let app = state.app(&app_id);
    let runs = app
        .list_runs(
            &board_id,
            flowboard::flow::execution::RunFilter::default(),
        )
        .await?;
    let meta = runs
        .into_iter()
        .find(|meta| meta.run_id == run_id)
        .ok_or_else(|| ApiError::not_found(format!("Run {} not found", run_id)))?;

    let logs = app
        .query_run(&meta, &body.query, body.offset, body.limit)
        .await?;
    Ok(Json(logs))
}
