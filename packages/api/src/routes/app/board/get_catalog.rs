use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::node::Node;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

/// The declared schemas of every registered node. The implementations
/// themselves stay opaque to clients.
#[tracing::instrument(name = "GET /apps/{app_id}/board/catalog", skip(state, user))]
pub async fn get_catalog(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadBoards);
    permission.sub()?;

    let registry = state.engine.node_registry.read().await.clone();
    let catalog = registry.catalog(&state.engine).await;
    Ok(Json(catalog))
}
