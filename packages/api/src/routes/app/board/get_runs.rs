use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use flowboard::flow::execution::{LogMeta, RunFilter, RunStatus};
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub node_id: Option<String>,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub status: Option<RunStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[tracing::instrument(name = "GET /apps/{app_id}/board/{board_id}/runs", skip(state, user))]
pub async fn get_runs(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<LogMeta>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadRuns);
    permission.sub()?;

    let filter = RunFilter {
        node_id: query.node_id,
        from: query.from,
        to: query.to,
        status: query.status,
        offset: query.offset,
        limit: query.limit,
    };

    let runs = state.app(&app_id).list_runs(&board_id, filter).await?;

    tracing::info!("Returning {} runs for board {}", runs.len(), board_id);
    Ok(Json(runs))
}
