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
pub struct ExecuteEventBody {
    #[serde(default)]
    pub payload: RunPayload,
    #[serde(default)]
    pub stream_state: bool,
    #[serde(default)]
    pub skip_consent_check: bool,
}

/// Resolve the event record and execute the board version it pins. Secrets
/// are always stripped before the run when this façade fronts a remote
/// executor.
#[tracing::instrument(
    name = "POST /apps/{app_id}/event/{event_id}/execute",
    skip(state, user, body)
)]
pub async fn execute_event(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
    Json(body): Json<ExecuteEventBody>,
) -> Result<Json<LogMeta>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ExecuteEvents);
    let sub = permission.sub()?;

    let meta = state
        .app(&app_id)
        .execute_event(
            &event_id,
            body.payload,
            body.stream_state,
            noop_callback(),
            Some(sub),
            state.executor,
            body.skip_consent_check,
        )
        .await?;

    Ok(Json(meta))
}
