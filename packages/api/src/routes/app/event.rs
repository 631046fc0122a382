use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

pub mod cancel_execution;
pub mod execute_event;
pub mod feedback;
pub mod get_event;
pub mod prerun_event;
pub mod upsert_event;
pub mod validate_event;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_event::get_events).put(upsert_event::upsert_event))
        .route(
            "/{event_id}",
            get(get_event::get_event).delete(upsert_event::delete_event),
        )
        .route("/{event_id}/versions", get(get_event::get_versions))
        .route("/{event_id}/validate", post(validate_event::validate_event))
        .route("/{event_id}/sink", get(validate_event::is_event_sink_active))
        .route("/{event_id}/prerun", get(prerun_event::prerun_event))
        .route("/{event_id}/execute", post(execute_event::execute_event))
        .route("/{event_id}/feedback", put(feedback::upsert_event_feedback))
        .route(
            "/runs/{run_id}/cancel",
            post(cancel_execution::cancel_execution),
        )
}
