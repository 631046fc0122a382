use axum::{Router, routing::get};

use crate::state::AppState;

pub mod app;
pub mod health;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/capabilities", get(crate::capabilities::get_capabilities))
        .nest("/apps/{app_id}", app::router())
}
