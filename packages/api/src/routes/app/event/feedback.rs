use axum::{
    Extension, Json,
    extract::{Path, State},
};
use flowboard::flow::event::EventFeedback;
use serde::Deserialize;

use crate::{
    ensure_permission, error::ApiError, middleware::jwt::AppUser,
    permission::RolePermissions, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub run_id: Option<String>,
    pub rating: i32,
    pub comment: Option<String>,
    pub context: Option<serde_json::Value>,
}

#[tracing::instrument(
    name = "PUT /apps/{app_id}/event/{event_id}/feedback",
    skip(state, user, body)
)]
pub async fn upsert_event_feedback(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((app_id, event_id)): Path<(String, String)>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<EventFeedback>, ApiError> {
    let permission = ensure_permission!(user, &app_id, &state, RolePermissions::ReadEvents);
    permission.sub()?;

    let feedback = EventFeedback {
        id: flowboard_types::create_id(),
        event_id: event_id.clone(),
        run_id: body.run_id,
        rating: body.rating,
        comment: body.comment,
        context: body.context,
        created_at: std::time::SystemTime::now(),
    };

    let saved = state
        .app(&app_id)
        .upsert_event_feedback(&event_id, feedback)
        .await?;
    Ok(Json(saved))
}
