//! Pre-run analysis endpoint for boards
//!
//! Returns information needed before executing a board:
//! - Runtime-configured variables that need values
//! - Required OAuth providers and scopes
//! - Execution-mode routing facts

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use flowboard::flow::prerun::PrerunReport;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

/// Query parameters for pre-run analysis
#[derive(Debug, Deserialize)]
pub struct PrerunBoardQuery {
    /// Board version as "major.minor.patch" - defaults to latest
    pub version: Option<String>,
}

pub fn parse_version(version_str: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = version_str.split(['.', '_']).collect();
    if parts.len() == 3 {
        let major = parts[0].parse().ok()?;
        let minor = parts[1].parse().ok()?;
        let patch = parts[2].parse().ok()?;
        Some((major, minor, patch))
    } else {
        None
    }
}

/// Analyze a board to determine what's needed before execution.
#[tracing::instrument(name = "GET /apps/{app_id}/board/{board_id}/prerun", skip(state, user))]
pub async fn prerun_board(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, board_id)): Path<(String, String)>,
    Query(query): Query<PrerunBoardQuery>,
) -> Result<Json<PrerunReport>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ExecuteBoards);
    permission.sub()?;

    // Local hosting needs board read access on top of execute rights.
    let can_execute_locally = permission.has_permission(&app_id, RolePermissions::ReadBoards);

    let version = query.version.as_ref().and_then(|v| parse_version(v));

    let report = state
        .app(&app_id)
        .prerun_board(&board_id, version, can_execute_locally)
        .await?;

    Ok(Json(report))
}
