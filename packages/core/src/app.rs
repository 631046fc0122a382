use flowboard_types::intercom::InterComCallback;
use flowboard_types::sync::Mutex;
use flowboard_types::{EngineError, json};
use futures::StreamExt;
use object_store::path::Path;
use std::sync::Arc;

use crate::flow::board::{Board, VersionType, commands::GenericCommand};
use crate::flow::event::{Event, EventFeedback};
use crate::flow::execution::{
    InternalRun, LogMeta, RunFilter, RunPayload, RunStatus, RunStore,
    log::LogMessage,
};
use crate::flow::prerun::{self, ExecutionLocation, PrerunReport};
use crate::state::{FlowboardState, RunHandle};

/// One application: a set of boards, their events and run records. The api
/// façade and the desktop runtime both talk to the engine through this
/// aggregate.
#[derive(Clone)]
pub struct App {
    pub id: String,
    pub app_state: Option<Arc<FlowboardState>>,
}

impl App {
    pub fn new(id: &str, app_state: Arc<FlowboardState>) -> Self {
        App {
            id: id.to_string(),
            app_state: Some(app_state),
        }
    }

    fn state(&self) -> flowboard_types::Result<Arc<FlowboardState>> {
        self.app_state
            .clone()
            .ok_or_else(|| flowboard_types::anyhow!("App state not found"))
    }

    fn board_dir(&self, board_id: &str) -> Path {
        Path::from("apps")
            .child(self.id.clone())
            .child("boards")
            .child(board_id)
    }

    // === Boards ===

    pub async fn create_board(
        &self,
        id: Option<String>,
    ) -> flowboard_types::Result<Arc<Mutex<Board>>> {
        let state = self.state()?;
        let id = id.unwrap_or_else(flowboard_types::create_id);
        let board = Board::new(Some(id.clone()), self.board_dir(&id), state.clone());
        board.save(None).await?;

        let board = Arc::new(Mutex::new(board));
        state.open_boards.insert(id, board.clone());
        Ok(board)
    }

    /// Open a board, optionally registering it in the open-board registry so
    /// later calls share the same document (and its mutex, which is what
    /// serializes concurrent mutation).
    pub async fn open_board(
        &self,
        board_id: String,
        register: Option<bool>,
        version: Option<(u32, u32, u32)>,
    ) -> flowboard_types::Result<Arc<Mutex<Board>>> {
        let state = self.state()?;

        if version.is_none() {
            if let Some(board) = state.open_boards.get(&board_id) {
                return Ok(board.value().clone());
            }
        }

        let board = Board::load(self.board_dir(&board_id), &board_id, state.clone(), version)
            .await?;
        let board = Arc::new(Mutex::new(board));

        if register.unwrap_or(false) && version.is_none() {
            state.open_boards.insert(board_id, board.clone());
        }

        Ok(board)
    }

    pub async fn upsert_board(
        &self,
        board_id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> flowboard_types::Result<Arc<Mutex<Board>>> {
        let board = match self.open_board(board_id.to_string(), Some(true), None).await {
            Ok(board) => board,
            Err(_) => self.create_board(Some(board_id.to_string())).await?,
        };

        {
            let mut guard = board.lock().await;
            if let Some(name) = name {
                guard.name = name;
            }
            if let Some(description) = description {
                guard.description = description;
            }
            guard.updated_at = std::time::SystemTime::now();
            guard.save(None).await?;
        }

        Ok(board)
    }

    pub async fn delete_board(&self, board_id: &str) -> flowboard_types::Result<()> {
        let state = self.state()?;
        let board = self.open_board(board_id.to_string(), Some(false), None).await?;
        board.lock().await.delete(None).await?;
        state.open_boards.remove(board_id);
        Ok(())
    }

    pub async fn get_boards(&self) -> flowboard_types::Result<Vec<Board>> {
        let state = self.state()?;
        let store = FlowboardState::app_meta_store(&state).await?;

        let prefix = Path::from("apps").child(self.id.clone()).child("boards");
        let mut listing = store.list(Some(&prefix));
        let mut boards = Vec::new();

        while let Some(Ok(meta)) = listing.next().await {
            if meta.location.filename() != Some("current.json") {
                continue;
            }
            if let Ok(result) = store.get(&meta.location).await {
                if let Ok(bytes) = result.bytes().await {
                    if let Ok(board) = json::from_slice::<Board>(&bytes) {
                        boards.push(board);
                    }
                }
            }
        }

        boards.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(boards)
    }

    pub fn close_board(&self, board_id: &str) -> flowboard_types::Result<()> {
        let state = self.state()?;
        state.open_boards.remove(board_id);
        Ok(())
    }

    pub fn get_open_boards(&self) -> flowboard_types::Result<Vec<String>> {
        let state = self.state()?;
        Ok(state
            .open_boards
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    // === Commands ===

    pub async fn execute_commands(
        &self,
        board_id: &str,
        commands: Vec<GenericCommand>,
    ) -> flowboard_types::Result<Vec<GenericCommand>> {
        let state = self.state()?;
        let board = self.open_board(board_id.to_string(), Some(true), None).await?;
        let mut guard = board.lock().await;
        let inverted = guard.execute_commands(commands, state).await?;
        guard.save(None).await?;
        Ok(inverted)
    }

    pub async fn undo_commands(
        &self,
        board_id: &str,
        commands: Vec<GenericCommand>,
    ) -> flowboard_types::Result<()> {
        let state = self.state()?;
        let board = self.open_board(board_id.to_string(), Some(true), None).await?;
        let mut guard = board.lock().await;
        guard.undo(commands, state).await?;
        guard.save(None).await?;
        Ok(())
    }

    pub async fn redo_commands(
        &self,
        board_id: &str,
        commands: Vec<GenericCommand>,
    ) -> flowboard_types::Result<()> {
        let state = self.state()?;
        let board = self.open_board(board_id.to_string(), Some(true), None).await?;
        let mut guard = board.lock().await;
        guard.redo(commands, state).await?;
        guard.save(None).await?;
        Ok(())
    }

    pub async fn create_board_version(
        &self,
        board_id: &str,
        version_type: VersionType,
    ) -> flowboard_types::Result<(u32, u32, u32)> {
        let board = self.open_board(board_id.to_string(), Some(true), None).await?;
        let mut guard = board.lock().await;
        guard.create_version(version_type, None).await
    }

    pub async fn get_board_versions(
        &self,
        board_id: &str,
    ) -> flowboard_types::Result<Vec<(u32, u32, u32)>> {
        let board = self.open_board(board_id.to_string(), Some(false), None).await?;
        let guard = board.lock().await;
        guard.get_versions(None).await
    }

    // === Pre-run ===

    pub async fn prerun_board(
        &self,
        board_id: &str,
        version: Option<(u32, u32, u32)>,
        can_execute_locally: bool,
    ) -> flowboard_types::Result<PrerunReport> {
        let board = self.open_board(board_id.to_string(), Some(false), version).await?;
        let guard = board.lock().await;
        Ok(prerun::analyze_board(&guard, can_execute_locally))
    }

    pub async fn prerun_event(
        &self,
        event_id: &str,
        can_execute_locally: bool,
    ) -> flowboard_types::Result<(String, PrerunReport)> {
        let event = Event::load(event_id, self, None).await?;
        let report = self
            .prerun_board(&event.board_id, event.board_version, can_execute_locally)
            .await?;
        Ok((event.board_id, report))
    }

    // === Execution ===

    /// Execute a board on this host. `host` states which executor this
    /// process is; mode routing rejects runs that belong on the other side.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_board(
        &self,
        board_id: &str,
        payload: RunPayload,
        stream_state: bool,
        event: Option<Event>,
        callback: InterComCallback,
        sub: Option<String>,
        host: ExecutionLocation,
        skip_consent_check: bool,
    ) -> flowboard_types::Result<LogMeta> {
        let state = self.state()?;

        let version = event.as_ref().and_then(|e| e.board_version);
        let board = self
            .open_board(board_id.to_string(), Some(false), version)
            .await?;
        let board = Arc::new(board.lock().await.clone());

        let report = prerun::analyze_board(&board, host == ExecutionLocation::Local);
        prerun::ensure_payload(&report, &payload)?;
        prerun::route_execution(
            &report,
            host == ExecutionLocation::Local,
            host == ExecutionLocation::Remote,
        )?;

        // Consent gates boards that call back out through events.
        let consent_key = event
            .as_ref()
            .map(|e| e.id.clone())
            .unwrap_or_else(|| board_id.to_string());
        let needs_consent = board.nodes.values().any(|node| node.event_callback);
        if needs_consent && !skip_consent_check && !state.has_consent(&self.id, &consent_key) {
            return Err(EngineError::permission_denied(format!(
                "Execution of '{}' requires recorded consent",
                consent_key
            )));
        }

        let payload = if host == ExecutionLocation::Remote {
            prerun::strip_secrets_for_remote(&payload)
        } else {
            payload
        };

        let mut run = InternalRun::new(
            &self.id,
            board,
            event,
            &state,
            &payload,
            stream_state,
            callback,
            sub,
            None,
        )
        .await?;

        let handle = RunHandle {
            run_id: run.meta.run_id.clone(),
            app_id: self.id.clone(),
            board_id: board_id.to_string(),
            cancellation: run.cancellation.clone(),
            status: Arc::new(Mutex::new(RunStatus::Pending)),
        };
        state.register_run(handle.clone());

        let status = run.execute(state.clone()).await;
        *handle.status.lock().await = status;

        let meta = run.finalize(&state).await;
        state.remove_run(&handle.run_id);
        meta
    }

    /// Resolve an event and execute the board it points at.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_event(
        &self,
        event_id: &str,
        mut payload: RunPayload,
        stream_state: bool,
        callback: InterComCallback,
        sub: Option<String>,
        host: ExecutionLocation,
        skip_consent_check: bool,
    ) -> flowboard_types::Result<LogMeta> {
        let event = Event::load(event_id, self, None).await?;

        if !event.active {
            return Err(EngineError::validation(format!(
                "Event {} is not active",
                event_id
            )));
        }

        // The event pins the start node; callers only supply values.
        payload.id = event.node_id.clone();
        let board_id = event.board_id.clone();

        self.execute_board(
            &board_id,
            payload,
            stream_state,
            Some(event),
            callback,
            sub,
            host,
            skip_consent_check,
        )
        .await
    }

    /// Move an in-flight run to `Cancelling`; the cooperative token does the
    /// rest within the configured grace period.
    pub async fn cancel_execution(&self, run_id: &str) -> flowboard_types::Result<()> {
        let state = self.state()?;
        let handle = state
            .run_handle(run_id)
            .ok_or_else(|| EngineError::not_found(format!("Run {} not found", run_id)))?;

        *handle.status.lock().await = RunStatus::Cancelling;
        handle.cancellation.cancel();
        Ok(())
    }

    // === Run records ===

    async fn run_store(&self) -> flowboard_types::Result<RunStore> {
        let state = self.state()?;
        let store = FlowboardState::log_store(&state).await?;
        Ok(RunStore::new(store))
    }

    pub async fn list_runs(
        &self,
        board_id: &str,
        filter: RunFilter,
    ) -> flowboard_types::Result<Vec<LogMeta>> {
        self.run_store()
            .await?
            .list_runs(&self.id, board_id, &filter)
            .await
    }

    pub async fn query_run(
        &self,
        meta: &LogMeta,
        query: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> flowboard_types::Result<Vec<LogMessage>> {
        self.run_store().await?.query_run(meta, query, offset, limit).await
    }

    // === Events ===

    pub async fn get_event(
        &self,
        event_id: &str,
        version: Option<(u32, u32, u32)>,
    ) -> flowboard_types::Result<Event> {
        Event::load(event_id, self, version).await
    }

    pub async fn get_events(&self) -> flowboard_types::Result<Vec<Event>> {
        Event::load_all(self).await
    }

    pub async fn upsert_event(
        &self,
        mut event: Event,
        version_type: Option<VersionType>,
    ) -> flowboard_types::Result<Event> {
        event.upsert(self, version_type, false).await
    }

    pub async fn delete_event(&self, event_id: &str) -> flowboard_types::Result<()> {
        let event = Event::load(event_id, self, None).await?;
        event.delete(self).await
    }

    pub async fn validate_event(&self, event_id: &str) -> flowboard_types::Result<()> {
        let event = Event::load(event_id, self, None).await?;
        event.validate_event_references(self).await
    }

    pub async fn get_event_versions(
        &self,
        event_id: &str,
    ) -> flowboard_types::Result<Vec<(u32, u32, u32)>> {
        let event = Event::load(event_id, self, None).await?;
        event.get_versions(self).await
    }

    pub async fn is_event_sink_active(&self, event_id: &str) -> flowboard_types::Result<bool> {
        let event = Event::load(event_id, self, None).await?;
        Ok(event.is_sink_active())
    }

    pub async fn upsert_event_feedback(
        &self,
        event_id: &str,
        feedback: EventFeedback,
    ) -> flowboard_types::Result<EventFeedback> {
        let event = Event::load(event_id, self, None).await?;
        event.save_feedback(self, feedback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::board::commands::GenericCommand;
    use crate::flow::board::commands::nodes::upsert_node::UpsertNodeCommand;
    use crate::flow::node::Node;
    use crate::flow::variable::VariableType;
    use flowboard_types::intercom::noop_callback;

    async fn test_app() -> App {
        let state = FlowboardState::in_memory();
        App::new("app-test", state)
    }

    #[tokio::test]
    async fn board_crud_roundtrip() {
        let app = test_app().await;

        let board = app.create_board(Some("b1".to_string())).await.unwrap();
        assert_eq!(board.lock().await.id, "b1");

        app.upsert_board("b1", Some("Named".to_string()), None)
            .await
            .unwrap();

        let boards = app.get_boards().await.unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].name, "Named");

        assert_eq!(app.get_open_boards().unwrap(), vec!["b1".to_string()]);
        app.close_board("b1").unwrap();
        assert!(app.get_open_boards().unwrap().is_empty());

        app.delete_board("b1").await.unwrap();
        assert!(app.get_boards().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commands_apply_through_the_app() {
        let app = test_app().await;
        app.create_board(Some("b1".to_string())).await.unwrap();

        let mut node = Node::new("log_info", "Print Info", "", "Logging");
        node.add_input_pin("exec_in", "In", "", VariableType::Execution);
        let command = GenericCommand::UpsertNode(UpsertNodeCommand::new(node.clone()));

        let inverted = app.execute_commands("b1", vec![command]).await.unwrap();
        assert_eq!(inverted.len(), 1);

        let board = app
            .open_board("b1".to_string(), Some(false), None)
            .await
            .unwrap();
        assert!(board.lock().await.nodes.contains_key(&node.id));

        app.undo_commands("b1", inverted).await.unwrap();
        let board = app
            .open_board("b1".to_string(), Some(false), None)
            .await
            .unwrap();
        assert!(board.lock().await.nodes.is_empty());
    }

    #[tokio::test]
    async fn execute_board_requires_runtime_variables() {
        use crate::flow::pin::ValueType;
        use crate::flow::variable::Variable;

        let app = test_app().await;
        let board = app.create_board(Some("b1".to_string())).await.unwrap();

        let start_id = {
            let mut guard = board.lock().await;
            let mut start = Node::new("events_simple", "Simple Event", "", "Events");
            start.set_start(true);
            start.add_output_pin("exec_out", "Out", "", VariableType::Execution);
            let start_id = start.id.clone();
            guard.nodes.insert(start.id.clone(), start);

            let mut var = Variable::new("required", VariableType::String, ValueType::Normal);
            var.set_runtime_configured(true);
            guard.variables.insert(var.id.clone(), var);
            guard.save(None).await.unwrap();
            start_id
        };

        let payload = RunPayload {
            id: start_id,
            ..Default::default()
        };

        let err = app
            .execute_board(
                "b1",
                payload,
                false,
                None,
                noop_callback(),
                None,
                ExecutionLocation::Local,
                true,
            )
            .await
            .unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::MissingRuntimeVariable
        );

        // Gating failed before anything started, so no run was recorded.
        let runs = app.list_runs("b1", RunFilter::default()).await.unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn events_resolve_their_board_and_respect_consent() {
        let app = test_app().await;
        let state = app.app_state.clone().unwrap();
        let board = app.create_board(Some("b-events".to_string())).await.unwrap();

        let start_id = {
            let mut guard = board.lock().await;
            let registry = state.node_registry.read().await.clone();
            let mut start = registry
                .get_blueprint("events_simple", &state)
                .await
                .unwrap();
            start.set_event_callback(true);
            let start_id = start.id.clone();
            guard.nodes.insert(start.id.clone(), start);
            guard.save(None).await.unwrap();
            start_id
        };

        let event = crate::flow::event::Event::new("on_demand", "b-events", &start_id, "manual");
        let event = app.upsert_event(event, None).await.unwrap();

        // Without recorded consent the run is refused.
        let err = app
            .execute_event(
                &event.id,
                RunPayload::default(),
                false,
                noop_callback(),
                None,
                ExecutionLocation::Local,
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::PermissionDenied
        );

        // With consent the event resolves its board and runs through.
        state.record_consent(&app.id, &event.id);
        let meta = app
            .execute_event(
                &event.id,
                RunPayload::default(),
                false,
                noop_callback(),
                None,
                ExecutionLocation::Local,
                false,
            )
            .await
            .unwrap();
        assert_eq!(meta.board_id, "b-events");
        assert_eq!(meta.event_id, event.id);
        assert_eq!(meta.status, crate::flow::execution::RunStatus::Success);

        // Deactivated events refuse to run at all.
        let mut deactivated = app.get_event(&event.id, None).await.unwrap();
        deactivated.active = false;
        let deactivated = app.upsert_event(deactivated, None).await.unwrap();
        let err = app
            .execute_event(
                &deactivated.id,
                RunPayload::default(),
                false,
                noop_callback(),
                None,
                ExecutionLocation::Local,
                true,
            )
            .await
            .unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn event_crud_and_versioning() {
        let app = test_app().await;
        let state = app.app_state.clone().unwrap();
        let board = app.create_board(Some("b-ev2".to_string())).await.unwrap();

        let node_id = {
            let mut guard = board.lock().await;
            let registry = state.node_registry.read().await.clone();
            let start = registry
                .get_blueprint("events_simple", &state)
                .await
                .unwrap();
            let node_id = start.id.clone();
            guard.nodes.insert(start.id.clone(), start);
            guard.save(None).await.unwrap();
            node_id
        };

        let event = crate::flow::event::Event::new("webhook", "b-ev2", &node_id, "webhook");
        let event = app.upsert_event(event, None).await.unwrap();
        assert_eq!(event.event_version, (0, 0, 0));

        assert!(app.is_event_sink_active(&event.id).await.unwrap());
        app.validate_event(&event.id).await.unwrap();

        // Re-pointing the event snapshots the previous version first.
        let mut updated = event.clone();
        updated.name = "webhook-v2".to_string();
        let updated = app
            .upsert_event(updated, Some(crate::flow::board::VersionType::Minor))
            .await
            .unwrap();
        assert_eq!(updated.event_version, (0, 1, 0));

        let versions = app.get_event_versions(&event.id).await.unwrap();
        assert_eq!(versions, vec![(0, 0, 0)]);

        let events = app.get_events().await.unwrap();
        assert_eq!(events.len(), 1);

        app.delete_event(&event.id).await.unwrap();
        assert!(app.get_event(&event.id, None).await.is_err());
    }
}
