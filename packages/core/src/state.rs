use flowboard_types::sync::{CancellationToken, DashMap, Mutex, RwLock};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use std::sync::Arc;
use std::time::Duration;

use crate::flow::board::Board;
use crate::flow::execution::RunStatus;
use crate::flow::node::NodeRegistry;

/// Storage endpoints the engine persists into. The backend is pluggable;
/// anything implementing `ObjectStore` works (local fs, S3, in-memory).
#[derive(Clone, Default)]
pub struct FlowboardStores {
    pub app_meta_store: Option<Arc<dyn ObjectStore>>,
    pub log_store: Option<Arc<dyn ObjectStore>>,
}

#[derive(Clone)]
pub struct FlowboardConfig {
    pub stores: FlowboardStores,
    /// How long a cancelled run may keep finalizing before it is forcibly
    /// marked `Cancelled`.
    pub cancellation_grace: Duration,
}

impl FlowboardConfig {
    pub fn new() -> Self {
        FlowboardConfig {
            stores: FlowboardStores::default(),
            cancellation_grace: Duration::from_secs(5),
        }
    }

    pub fn register_app_meta_store(&mut self, store: Arc<dyn ObjectStore>) {
        self.stores.app_meta_store = Some(store);
    }

    pub fn register_log_store(&mut self, store: Arc<dyn ObjectStore>) {
        self.stores.log_store = Some(store);
    }
}

impl Default for FlowboardConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an in-flight run, kept only until finalization.
#[derive(Clone)]
pub struct RunHandle {
    pub run_id: String,
    pub app_id: String,
    pub board_id: String,
    pub cancellation: CancellationToken,
    pub status: Arc<Mutex<RunStatus>>,
}

/// Long-lived service state shared by the façade, the command layer and the
/// execution subsystem.
pub struct FlowboardState {
    pub config: RwLock<FlowboardConfig>,
    pub node_registry: RwLock<NodeRegistry>,
    /// Open board documents, keyed by board id. All mutation goes through
    /// the per-board mutex, which is what serializes concurrent clients.
    pub open_boards: DashMap<String, Arc<Mutex<Board>>>,
    /// In-flight runs, keyed by run id.
    pub runs: DashMap<String, RunHandle>,
    /// Recorded execution consents, keyed by `"{app_id}:{event_id}"`.
    pub consents: DashMap<String, ()>,
}

impl FlowboardState {
    pub fn new(config: FlowboardConfig) -> Self {
        let mut registry = NodeRegistry::new();
        crate::flow::catalog::register_built_ins(&mut registry);

        FlowboardState {
            config: RwLock::new(config),
            node_registry: RwLock::new(registry),
            open_boards: DashMap::new(),
            runs: DashMap::new(),
            consents: DashMap::new(),
        }
    }

    /// An engine backed entirely by memory. Used in tests and for ephemeral
    /// local sessions.
    pub fn in_memory() -> Arc<Self> {
        let mut config = FlowboardConfig::new();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        config.register_app_meta_store(store.clone());
        config.register_log_store(store);
        Arc::new(Self::new(config))
    }

    pub async fn app_meta_store(
        state: &Arc<FlowboardState>,
    ) -> flowboard_types::Result<Arc<dyn ObjectStore>> {
        state
            .config
            .read()
            .await
            .stores
            .app_meta_store
            .clone()
            .ok_or_else(|| flowboard_types::anyhow!("Project store not found"))
    }

    pub async fn log_store(
        state: &Arc<FlowboardState>,
    ) -> flowboard_types::Result<Arc<dyn ObjectStore>> {
        let guard = state.config.read().await;
        guard
            .stores
            .log_store
            .clone()
            .or_else(|| guard.stores.app_meta_store.clone())
            .ok_or_else(|| flowboard_types::anyhow!("Log store not found"))
    }

    pub fn register_run(&self, handle: RunHandle) {
        self.runs.insert(handle.run_id.clone(), handle);
    }

    pub fn run_handle(&self, run_id: &str) -> Option<RunHandle> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    pub fn remove_run(&self, run_id: &str) {
        self.runs.remove(run_id);
    }

    pub fn record_consent(&self, app_id: &str, event_id: &str) {
        self.consents.insert(format!("{}:{}", app_id, event_id), ());
    }

    pub fn has_consent(&self, app_id: &str, event_id: &str) -> bool {
        self.consents.contains_key(&format!("{}:{}", app_id, event_id))
    }
}
