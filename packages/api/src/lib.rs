pub mod backend_jwt;
pub mod capabilities;
pub mod error;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod state;

use axum::middleware::from_fn_with_state;
use state::AppState;

/// Build the full router for one façade instance. What is mounted depends
/// on the live capabilities; absent capabilities answer 503 from their own
/// routes instead of pretending to exist.
pub fn create_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .merge(routes::router())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::jwt::auth_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
