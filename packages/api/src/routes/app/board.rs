use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod commands;
pub mod delete_board;
pub mod execute_board;
pub mod get_boards;
pub mod get_catalog;
pub mod get_runs;
pub mod prerun_board;
pub mod query_logs;
pub mod realtime;
pub mod settings;
pub mod upsert_board;
pub mod version_board;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_boards::get_boards))
        .route("/catalog", get(get_catalog::get_catalog))
        .route("/open", get(settings::get_open_boards))
        .route(
            "/{board_id}",
            get(get_boards::get_board)
                .put(upsert_board::upsert_board)
                .delete(delete_board::delete_board),
        )
        .route("/{board_id}/close", post(settings::close_board))
        .route("/{board_id}/settings", get(settings::get_board_settings))
        .route("/{board_id}/commands", post(commands::execute_commands))
        .route("/{board_id}/undo", post(commands::undo))
        .route("/{board_id}/redo", post(commands::redo))
        .route(
            "/{board_id}/version",
            get(version_board::get_versions).post(version_board::create_version),
        )
        .route("/{board_id}/prerun", get(prerun_board::prerun_board))
        .route("/{board_id}/execute", post(execute_board::execute_board))
        .route("/{board_id}/runs", get(get_runs::get_runs))
        .route("/{board_id}/runs/{run_id}/query", post(query_logs::query_logs))
        .route(
            "/{board_id}/realtime",
            get(realtime::jwks).post(realtime::access),
        )
}
