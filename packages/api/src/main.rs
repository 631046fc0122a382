use flowboard::flow::prerun::ExecutionLocation;
use flowboard::state::{FlowboardConfig, FlowboardState};
use flowboard_api::backend_jwt::BackendJwt;
use flowboard_api::state::AppState;
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> flowboard_types::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = std::env::var("FLOWBOARD_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    std::fs::create_dir_all(&data_dir)?;

    let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new_with_prefix(&data_dir)?);
    let mut config = FlowboardConfig::new();
    config.register_app_meta_store(store.clone());
    config.register_log_store(store);

    let engine = Arc::new(FlowboardState::new(config));
    let realtime = BackendJwt::from_env().map(Arc::new);
    if realtime.is_none() {
        tracing::warn!("Realtime key material not configured; realtime capability disabled");
    }

    let executor = match std::env::var("FLOWBOARD_EXECUTOR").as_deref() {
        Ok("remote") => ExecutionLocation::Remote,
        _ => ExecutionLocation::Local,
    };

    let state = AppState::new(engine, realtime, executor);
    let router = flowboard_api::create_router(state);

    let addr = std::env::var("FLOWBOARD_BIND").unwrap_or_else(|_| "127.0.0.1:8717".to_string());
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
