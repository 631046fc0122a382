use axum::Router;

use crate::state::AppState;

pub mod board;
pub mod event;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/board", board::router())
        .nest("/event", event::router())
}
