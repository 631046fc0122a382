use chrono::Utc;
use dashmap::DashMap;
use flowboard::app::App;
use flowboard::flow::prerun::ExecutionLocation;
use flowboard::flow::realtime::AwarenessHub;
use flowboard::state::FlowboardState;
use std::sync::Arc;

use crate::backend_jwt::BackendJwt;

/// Per-board symmetric room key, rotated daily.
#[derive(Clone)]
pub struct RoomKey {
    pub encryption_key: String,
    pub key_id: String,
}

/// Shared façade state. Absent capabilities are plain `None`s - callers
/// feature-detect through `/capabilities` instead of hitting a proxy that
/// throws.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FlowboardState>,
    pub awareness: Arc<AwarenessHub>,
    /// Realtime token signing; `None` when no key material is configured.
    pub realtime: Option<Arc<BackendJwt>>,
    /// Which executor this façade fronts.
    pub executor: ExecutionLocation,
    room_keys: Arc<DashMap<String, RoomKey>>,
}

impl AppState {
    pub fn new(
        engine: Arc<FlowboardState>,
        realtime: Option<Arc<BackendJwt>>,
        executor: ExecutionLocation,
    ) -> Self {
        AppState {
            engine,
            awareness: Arc::new(AwarenessHub::new()),
            realtime,
            executor,
            room_keys: Arc::new(DashMap::new()),
        }
    }

    pub fn app(&self, app_id: &str) -> App {
        App::new(app_id, self.engine.clone())
    }

    /// Get or rotate the per-board room key. Keys roll over daily; the
    /// key id is the ISO date so clients can tell which one they hold.
    pub fn room_key(&self, app_id: &str, board_id: &str) -> RoomKey {
        let room = flowboard::flow::realtime::room_id(app_id, board_id);
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();

        let mut entry = self.room_keys.entry(room).or_insert_with(|| RoomKey {
            encryption_key: generate_encryption_key(),
            key_id: today.clone(),
        });

        if entry.key_id != today {
            entry.encryption_key = generate_encryption_key();
            entry.key_id = today;
        }

        entry.value().clone()
    }
}

fn generate_encryption_key() -> String {
    use base64::Engine;
    use flowboard_types::rand::RngCore;
    let mut key = [0u8; 32];
    flowboard_types::rand::rng().fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}
