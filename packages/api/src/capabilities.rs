use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Which sub-states this façade instance actually serves. Clients check
/// this before calling into a group of routes; a capability that is not
/// live answers 503 from its own routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub board_state: bool,
    pub event_state: bool,
    pub realtime: bool,
    pub remote_execution: bool,
    // Served by sibling services, never by this façade.
    pub user_state: bool,
    pub team_state: bool,
    pub role_state: bool,
    pub template_state: bool,
    pub storage_state: bool,
}

impl Capabilities {
    pub fn of(state: &AppState) -> Self {
        Capabilities {
            board_state: true,
            event_state: true,
            realtime: state.realtime.is_some(),
            remote_execution: state.executor
                == flowboard::flow::prerun::ExecutionLocation::Remote,
            user_state: false,
            team_state: false,
            role_state: false,
            template_state: false,
            storage_state: false,
        }
    }
}

#[tracing::instrument(name = "GET /capabilities", skip(state))]
pub async fn get_capabilities(State(state): State<AppState>) -> Json<Capabilities> {
    Json(Capabilities::of(&state))
}
