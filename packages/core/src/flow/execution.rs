use super::board::{Board, ExecutionStage};
use super::event::Event;
use super::oauth::OAuthToken;
use super::variable::Variable;
use crate::state::FlowboardState;
use ahash::{AHashMap, AHashSet, AHasher};
use context::ExecutionContext;
use flowboard_types::intercom::{InterComCallback, InterComEmitter, InterComEvent, kinds};
use flowboard_types::json::to_vec;
use flowboard_types::sync::{CancellationToken, Mutex, RwLock};
use flowboard_types::utils::ptr_key;
use flowboard_types::{Cacheable, Value, create_id};
use futures::StreamExt;
use internal_node::{ExecutionTarget, InternalNode};
use internal_pin::InternalPin;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};
use trace::Trace;

pub mod context;
pub mod internal_node;
pub mod internal_pin;
pub mod log;
pub mod run_store;
pub mod trace;

pub use run_store::{LogMeta, RunFilter, RunStore};

#[derive(
    Serialize, Deserialize, JsonSchema, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl LogLevel {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            4 => LogLevel::Fatal,
            _ => LogLevel::Debug,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warn => 2,
            LogLevel::Error => 3,
            LogLevel::Fatal => 4,
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Cancelling,
    Success,
    Failed,
    Cancelled,
}

/// Replaces secret literals in anything that leaves the engine. Built once
/// per run from `secret` variables and `sensitive` pin defaults.
#[derive(Default)]
pub struct Scrubber {
    literals: Vec<String>,
}

pub const SCRUB_PLACEHOLDER: &str = "***";

impl Scrubber {
    pub fn new(literals: Vec<String>) -> Self {
        // Longer literals first so substrings of each other scrub cleanly.
        let mut literals: Vec<String> = literals
            .into_iter()
            .filter(|l| !l.is_empty())
            .collect();
        literals.sort_by_key(|l| std::cmp::Reverse(l.len()));
        Scrubber { literals }
    }

    pub fn from_board(board: &Board, variables: &AHashMap<String, Variable>) -> Self {
        let mut literals = Vec::new();

        for variable in variables.values() {
            if !variable.secret {
                continue;
            }
            if let Some(bytes) = &variable.default_value {
                if let Ok(value) = flowboard_types::json::from_slice::<Value>(bytes) {
                    Self::collect_literals(&value, &mut literals);
                }
            }
        }

        for node in board.nodes.values() {
            for pin in node.pins.values() {
                if !pin.is_sensitive() {
                    continue;
                }
                if let Some(bytes) = &pin.default_value {
                    if let Ok(value) = flowboard_types::json::from_slice::<Value>(bytes) {
                        Self::collect_literals(&value, &mut literals);
                    }
                }
            }
        }

        Self::new(literals)
    }

    fn collect_literals(value: &Value, literals: &mut Vec<String>) {
        match value {
            Value::String(s) => literals.push(s.clone()),
            Value::Array(items) => {
                for item in items {
                    Self::collect_literals(item, literals);
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    Self::collect_literals(item, literals);
                }
            }
            Value::Null => {}
            other => literals.push(other.to_string()),
        }
    }

    pub fn scrub_str(&self, input: &str) -> String {
        let mut output = input.to_string();
        for literal in &self.literals {
            if output.contains(literal.as_str()) {
                output = output.replace(literal.as_str(), SCRUB_PLACEHOLDER);
            }
        }
        output
    }

    pub fn scrub_value(&self, value: Value) -> Value {
        if self.literals.is_empty() {
            return value;
        }
        match value {
            Value::String(s) => Value::String(self.scrub_str(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.scrub_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.scrub_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Cached immutable fields from Run to avoid locking during the hot path.
#[derive(Clone)]
pub struct RunMeta {
    pub run_id: String,
    pub app_id: String,
    pub board_id: String,
    pub sub: String,
    pub stream_state: bool,
    pub nodes_executed: Arc<AtomicU64>,
}

impl RunMeta {
    pub fn increment_nodes_executed(&self) {
        self.nodes_executed
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn get_nodes_executed(&self) -> u64 {
        self.nodes_executed
            .load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct Run {
    pub id: String,
    pub app_id: String,
    pub traces: Vec<Trace>,
    pub status: RunStatus,
    pub start: SystemTime,
    pub end: SystemTime,
    pub board: Arc<Board>,
    pub log_level: LogLevel,
    pub payload: Arc<RunPayload>,
    pub sub: String,
    pub highest_log_level: LogLevel,
    pub logs: u64,
    pub stream_state: bool,

    pub event_id: Option<String>,
    pub event_version: Option<String>,

    pub visited_nodes: AHashMap<String, LogLevel>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct RunPayload {
    /// Node the run starts from.
    pub id: String,
    pub payload: Option<Value>,
    /// Runtime-configured variables and secrets (for local execution).
    /// These override board variable defaults when present.
    #[serde(default)]
    pub runtime_variables: Option<std::collections::HashMap<String, Variable>>,
    /// OAuth tokens keyed by provider id; held for this run only.
    #[serde(default)]
    pub oauth_tokens: Option<std::collections::HashMap<String, OAuthToken>>,
    /// When true (default), secret variables from runtime_variables are
    /// ignored unless they are also marked as runtime_configured. Set to
    /// false only for trusted local (desktop) execution.
    #[serde(default)]
    pub filter_secrets: Option<bool>,
}

#[derive(Clone)]
struct RunStack {
    stack: Vec<ExecutionTarget>,
    deduplication: AHashSet<usize>,
    hash: u64,
}

impl RunStack {
    fn with_capacity(capacity: usize) -> Self {
        RunStack {
            stack: Vec::with_capacity(capacity),
            deduplication: AHashSet::with_capacity(capacity.saturating_mul(2)),
            hash: 0u64,
        }
    }

    fn push(&mut self, target: ExecutionTarget) {
        let nkey = ptr_key(&target.node);

        if !self.deduplication.insert(nkey) {
            return;
        }

        let mut h = AHasher::default();
        h.write_usize(nkey);
        self.hash ^= h.finish();

        self.stack.push(target);
    }

    #[inline]
    fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    fn len(&self) -> usize {
        self.stack.len()
    }
}

struct StepOutcome {
    successors: Vec<ExecutionTarget>,
    traces: Vec<Trace>,
    error: Option<flowboard_types::Error>,
}

#[derive(Clone)]
pub struct InternalRun {
    pub run: Arc<Mutex<Run>>,
    pub nodes: Arc<AHashMap<String, Arc<InternalNode>>>,
    pub pins: AHashMap<String, Arc<InternalPin>>,
    pub variables: Arc<Mutex<AHashMap<String, Variable>>>,
    pub cache: Arc<RwLock<AHashMap<String, Arc<dyn Cacheable>>>>,
    pub emitter: Arc<InterComEmitter>,
    pub recorded_events: Arc<Mutex<Vec<InterComEvent>>>,
    pub oauth_tokens: Arc<AHashMap<String, OAuthToken>>,
    pub scrubber: Arc<Scrubber>,
    pub cancellation: CancellationToken,

    stack: Arc<RunStack>,
    cpus: usize,
    log_level: LogLevel,

    pub meta: RunMeta,
    pub board: Arc<Board>,
}

impl InternalRun {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        app_id: &str,
        board: Arc<Board>,
        event: Option<Event>,
        handler: &Arc<FlowboardState>,
        payload: &RunPayload,
        stream_state: bool,
        callback: InterComCallback,
        sub: Option<String>,
        run_id: Option<String>,
    ) -> flowboard_types::Result<Self> {
        let before = Instant::now();
        let run_id = run_id.unwrap_or_else(create_id);
        let sub_value = sub.unwrap_or_else(|| "local".to_string());

        let oauth_tokens: AHashMap<String, OAuthToken> = payload
            .oauth_tokens
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let event_variables = event
            .as_ref()
            .map(|e| e.variables.clone())
            .unwrap_or_default();

        let runtime_variables = payload.runtime_variables.clone().unwrap_or_default();
        let filter_secrets = payload.filter_secrets.unwrap_or(true);

        let resolved_variables = {
            let mut map = AHashMap::with_capacity(board.variables.len());
            for (variable_id, board_variable) in &board.variables {
                // Priority: runtime_configured/secret vars > event vars (for
                // exposed) > board vars. When filter_secrets is true only
                // runtime_configured vars may be overridden; secrets from
                // untrusted callers are ignored to prevent injection.
                let allow_runtime_override = board_variable.runtime_configured
                    || (board_variable.secret && !filter_secrets);
                let variable = if allow_runtime_override {
                    runtime_variables.get(variable_id).unwrap_or(board_variable)
                } else if board_variable.exposed {
                    event_variables.get(variable_id).unwrap_or(board_variable)
                } else {
                    board_variable
                };

                let value = match &variable.default_value {
                    Some(bytes) => {
                        flowboard_types::json::from_slice::<Value>(bytes).unwrap_or(Value::Null)
                    }
                    None => Value::Null,
                };

                let mut var = variable.clone();
                var.value = Arc::new(Mutex::new(value));
                map.insert(variable_id.clone(), var);
            }
            map
        };

        let scrubber = Arc::new(Scrubber::from_board(&board, &resolved_variables));
        let variables = Arc::new(Mutex::new(resolved_variables));

        // Events go to the caller and into the run's own record.
        let recorded_events = Arc::new(Mutex::new(Vec::<InterComEvent>::new()));
        let record_sink = recorded_events.clone();
        let forward = callback.clone();
        let recording_callback: InterComCallback = Arc::new(move |events: Vec<InterComEvent>| {
            let record_sink = record_sink.clone();
            let forward = forward.clone();
            Box::pin(async move {
                record_sink.lock().await.extend(events.clone());
                (forward)(events).await
            })
        });
        let emitter = InterComEmitter::spawn(&run_id, recording_callback);

        let run = Run {
            id: run_id.clone(),
            app_id: app_id.to_string(),
            traces: vec![],
            status: RunStatus::Pending,
            start: SystemTime::now(),
            end: SystemTime::now(),
            log_level: board.log_level,
            board: board.clone(),
            payload: Arc::new(payload.clone()),
            sub: sub_value.clone(),
            highest_log_level: LogLevel::Debug,
            logs: 0,
            stream_state,

            event_id: event.as_ref().map(|e| e.id.clone()),
            event_version: event.as_ref().map(|e| {
                let (major, minor, patch) = e.event_version;
                format!("{}.{}.{}", major, minor, patch)
            }),

            visited_nodes: AHashMap::with_capacity(board.nodes.len()),
        };

        let run = Arc::new(Mutex::new(run));

        // Phase 1: create all pins without connections
        let mut pins: AHashMap<String, Arc<InternalPin>> =
            AHashMap::with_capacity(board.nodes.len() * 3);

        for node in board.nodes.values() {
            for pin in node.pins.values() {
                pins.insert(pin.id.clone(), Arc::new(InternalPin::new(pin, false)));
            }
        }

        for layer in board.layers.values() {
            for (pin_id, pin) in &layer.pins {
                if pins.contains_key(pin_id) {
                    continue;
                }
                pins.insert(pin.id.clone(), Arc::new(InternalPin::new(pin, true)));
            }
        }

        // Phase 2: wire up connections using the OnceLock init methods
        for node in board.nodes.values() {
            for pin in node.pins.values() {
                if let Some(internal_pin) = pins.get(&pin.id) {
                    let connected: Vec<Weak<InternalPin>> = pin
                        .connected_to
                        .iter()
                        .filter_map(|id| pins.get(id).map(Arc::downgrade))
                        .collect();
                    internal_pin.init_connected_to(connected);

                    let depends: Vec<Weak<InternalPin>> = pin
                        .depends_on
                        .iter()
                        .filter_map(|id| pins.get(id).map(Arc::downgrade))
                        .collect();
                    internal_pin.init_depends_on(depends);
                }
            }
        }

        for layer in board.layers.values() {
            for pin in layer.pins.values() {
                if let Some(internal_pin) = pins.get(&pin.id) {
                    let connected: Vec<Weak<InternalPin>> = pin
                        .connected_to
                        .iter()
                        .filter_map(|id| pins.get(id).map(Arc::downgrade))
                        .collect();
                    internal_pin.init_connected_to(connected);

                    let depends: Vec<Weak<InternalPin>> = pin
                        .depends_on
                        .iter()
                        .filter_map(|id| pins.get(id).map(Arc::downgrade))
                        .collect();
                    internal_pin.init_depends_on(depends);
                }
            }
        }

        let mut nodes = AHashMap::with_capacity(board.nodes.len());
        let mut stack = RunStack::with_capacity(1);

        let registry = handler.node_registry.read().await.clone();
        for (node_id, node) in &board.nodes {
            let logic = registry.instantiate(node)?;
            let mut node_pins = AHashMap::new();
            let mut pin_cache: AHashMap<String, Vec<Arc<InternalPin>>> = AHashMap::new();

            for pin in node.pins.values() {
                if let Some(internal_pin) = pins.get(&pin.id) {
                    node_pins.insert(pin.id.clone(), internal_pin.clone());
                    let cached_array = pin_cache.entry(pin.name.clone()).or_default();
                    cached_array.push(internal_pin.clone());
                }
            }

            let internal_node = Arc::new(InternalNode::new(
                node.clone(),
                node_pins.clone(),
                logic,
                pin_cache,
            ));

            for internal_pin in node_pins.values() {
                internal_pin.init_node(Arc::downgrade(&internal_node));
            }

            if payload.id == node.id {
                stack.push(ExecutionTarget {
                    node: internal_node.clone(),
                    through_pins: vec![],
                });
            }

            nodes.insert(node_id.clone(), internal_node);
        }

        if stack.len() == 0 {
            return Err(flowboard_types::EngineError::not_found(format!(
                "Start node {} not found in board {}",
                payload.id, board.id
            )));
        }

        tracing::debug!(
            "InternalRun::new took {:?} on {} nodes and {} pins",
            before.elapsed(),
            nodes.len(),
            pins.len()
        );

        Ok(InternalRun {
            run,
            nodes: Arc::new(nodes),
            pins,
            variables,
            cache: Arc::new(RwLock::new(AHashMap::new())),
            emitter,
            recorded_events,
            oauth_tokens: Arc::new(oauth_tokens),
            scrubber,
            cancellation: CancellationToken::new(),
            stack: Arc::new(stack),
            cpus: num_cpus::get(),
            log_level: board.log_level,
            meta: RunMeta {
                run_id,
                app_id: app_id.to_string(),
                board_id: board.id.clone(),
                sub: sub_value,
                stream_state,
                nodes_executed: Arc::new(AtomicU64::new(0)),
            },
            board,
        })
    }

    fn build_context(&self, target: &ExecutionTarget, stage: ExecutionStage) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            self.meta.clone(),
            target.node.clone(),
            self.variables.clone(),
            self.cache.clone(),
            self.oauth_tokens.clone(),
            self.emitter.clone(),
            self.scrubber.clone(),
            self.cancellation.clone(),
            self.log_level,
            stage,
        );
        ctx.started_by = if target.through_pins.is_empty() {
            None
        } else {
            Some(target.through_pins.clone())
        };
        ctx
    }

    async fn step_core(&self, target: ExecutionTarget, stage: ExecutionStage) -> StepOutcome {
        let node = target.node.clone();
        let mut ctx = self.build_context(&target, stage);

        let _ = self
            .emitter
            .emit(
                kinds::NODE_ENTER,
                flowboard_types::json::json!({ "node_id": node.node_id() }),
            )
            .await;

        let result = internal_node::trigger(&mut ctx, &node).await;
        self.meta.increment_nodes_executed();

        ctx.end_trace();
        let traces = ctx.take_traces();

        let highest = traces
            .iter()
            .flat_map(|trace| trace.logs.iter())
            .map(|log| log.log_level)
            .max()
            .unwrap_or(LogLevel::Debug);

        // Stream the captured logs in trace order, then the exit marker.
        if self.meta.stream_state {
            for trace in &traces {
                for log_line in &trace.logs {
                    if log_line.log_level >= self.log_level {
                        let _ = self
                            .emitter
                            .emit(
                                kinds::NODE_LOG,
                                flowboard_types::json::json!({
                                    "node_id": trace.node_id,
                                    "level": log_line.log_level.to_u8(),
                                    "message": log_line.message,
                                }),
                            )
                            .await;
                    }
                }
            }
        }

        let _ = self
            .emitter
            .emit(
                kinds::NODE_EXIT,
                flowboard_types::json::json!({
                    "node_id": node.node_id(),
                    "level": highest.to_u8(),
                }),
            )
            .await;

        match result {
            Ok(successors) => StepOutcome {
                successors,
                traces,
                error: None,
            },
            Err(err) => StepOutcome {
                successors: vec![],
                traces,
                error: Some(err),
            },
        }
    }

    async fn step(
        &mut self,
        stage: ExecutionStage,
    ) -> flowboard_types::Result<()> {
        let stack = self.stack.clone();

        let outcomes: Vec<StepOutcome> = futures::stream::iter(stack.stack.clone())
            .map(|target| {
                let this = self.clone();
                let stage = stage.clone();
                async move { this.step_core(target, stage).await }
            })
            .buffer_unordered(self.cpus)
            .collect()
            .await;

        let mut new_stack = RunStack::with_capacity(stack.len());
        let mut first_error = None;

        {
            let mut run = self.run.lock().await;
            for mut outcome in outcomes {
                for trace in &outcome.traces {
                    {
                        let node_level = run
                            .visited_nodes
                            .entry(trace.node_id.clone())
                            .or_insert(LogLevel::Debug);
                        for log_line in &trace.logs {
                            if log_line.log_level > *node_level {
                                *node_level = log_line.log_level;
                            }
                        }
                    }
                    for log_line in &trace.logs {
                        if log_line.log_level > run.highest_log_level {
                            run.highest_log_level = log_line.log_level;
                        }
                    }
                    run.logs = run.logs.saturating_add(trace.logs.len() as u64);
                }
                run.traces.append(&mut outcome.traces);

                if let Some(err) = outcome.error {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    continue;
                }

                for successor in outcome.successors {
                    new_stack.push(successor);
                }
            }
        }

        self.stack = Arc::new(new_stack);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn drive(&mut self) -> flowboard_types::Result<()> {
        let stage = self.board.stage.clone();
        let mut stack_hash = self.stack.hash();

        while self.stack.len() > 0 {
            if self.cancellation.is_cancelled() {
                return Err(flowboard_types::EngineError::cancelled(
                    "Run was cancelled",
                ));
            }

            self.step(stage.clone()).await?;

            let new_stack_hash = self.stack.hash();
            if new_stack_hash == stack_hash {
                tracing::warn!("Execution stalled: stack did not change");
                return Err(flowboard_types::anyhow!("Execution stalled"));
            }
            stack_hash = new_stack_hash;
        }

        Ok(())
    }

    /// Run to completion. Returns the final status; intercom consumers see
    /// `run.started` first and `run.finished{status}` last, FIFO.
    pub async fn execute(&mut self, handler: Arc<FlowboardState>) -> RunStatus {
        {
            let mut run = self.run.lock().await;
            run.start = SystemTime::now();
            run.status = RunStatus::Running;
        }

        let _ = self
            .emitter
            .emit(
                kinds::RUN_STARTED,
                flowboard_types::json::json!({
                    "board_id": self.meta.board_id,
                    "app_id": self.meta.app_id,
                }),
            )
            .await;

        let grace = handler.config.read().await.cancellation_grace;
        let cancellation = self.cancellation.clone();

        let outcome = {
            let drive = self.drive();
            tokio::pin!(drive);

            tokio::select! {
                result = &mut drive => result,
                _ = async {
                    cancellation.cancelled().await;
                    // Cooperative grace period: in-flight nodes keep
                    // polling the token and should yield before this fires.
                    tokio::time::sleep(grace).await;
                } => Err(flowboard_types::EngineError::cancelled(
                    "Grace period elapsed after cancellation",
                )),
            }
        };

        let status = match outcome {
            Ok(()) => RunStatus::Success,
            Err(err) => {
                let kind = flowboard_types::EngineError::kind_of(&err);
                if kind == flowboard_types::ErrorKind::Cancelled
                    || self.cancellation.is_cancelled()
                {
                    RunStatus::Cancelled
                } else {
                    tracing::warn!("Run {} failed: {:?}", self.meta.run_id, err);
                    RunStatus::Failed
                }
            }
        };

        {
            let mut run = self.run.lock().await;
            run.end = SystemTime::now();
            run.status = status;
        }

        let _ = self
            .emitter
            .emit(
                kinds::RUN_FINISHED,
                flowboard_types::json::json!({ "status": status }),
            )
            .await;

        status
    }

    /// Persist the finished run: meta.json plus the append-only event log.
    pub async fn finalize(
        &self,
        handler: &Arc<FlowboardState>,
    ) -> flowboard_types::Result<LogMeta> {
        // The drain task delivers events asynchronously; wait for the tail
        // before sealing the record.
        let expected = self.emitter.emitted();
        for _ in 0..400 {
            if self.recorded_events.lock().await.len() as u64 >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let store = FlowboardState::log_store(handler).await?;
        let run_store = RunStore::new(store);

        let meta = {
            let run = self.run.lock().await;
            let start = run
                .start
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_micros() as u64)
                .unwrap_or(0);
            let end = run
                .end
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_micros() as u64)
                .unwrap_or(start);
            let version = {
                let (major, minor, patch) = self.board.version;
                format!("v{}.{}.{}", major, minor, patch)
            };
            let payload_value = run.payload.payload.clone().unwrap_or(Value::Null);
            let payload = to_vec(&self.scrubber.scrub_value(payload_value)).unwrap_or_default();
            let visited_nodes = run
                .visited_nodes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_u8()))
                .collect::<Vec<(String, u8)>>();

            LogMeta {
                app_id: self.meta.app_id.clone(),
                run_id: self.meta.run_id.clone(),
                board_id: self.meta.board_id.clone(),
                start,
                end,
                status: run.status,
                log_level: run.highest_log_level.to_u8(),
                version,
                nodes: Some(visited_nodes),
                logs: Some(run.logs),
                node_id: run.payload.id.clone(),
                event_id: run.event_id.clone().unwrap_or_default(),
                event_version: run.event_version.clone(),
                payload,
                is_remote: false,
            }
        };

        run_store.write_meta(&meta).await?;

        let events = self.recorded_events.lock().await.clone();
        run_store
            .append_events(&meta.app_id, &meta.run_id, &events)
            .await?;

        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::flow::board::commands::pins::connect_pins::connect_pins;
    use crate::flow::pin::{ValueType, names};
    use crate::flow::prerun::ExecutionLocation;
    use crate::flow::variable::{Variable, VariableType};
    use flowboard_types::intercom::InterComCallback;
    use std::time::Duration;

    fn collecting_callback() -> (InterComCallback, Arc<Mutex<Vec<InterComEvent>>>) {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        let callback: InterComCallback = Arc::new(move |events| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().await.extend(events);
                flowboard_types::Result::Ok(())
            })
        });
        (callback, collected)
    }

    async fn wait_for_events(
        collected: &Arc<Mutex<Vec<InterComEvent>>>,
        kind: &str,
    ) -> Vec<InterComEvent> {
        for _ in 0..100 {
            {
                let events = collected.lock().await;
                if events.iter().any(|event| event.kind == kind) {
                    return events.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        collected.lock().await.clone()
    }

    struct TestFlow {
        app: App,
        board_id: String,
        start_id: String,
    }

    /// events_simple -> log_info(message <- var_get(secret)).
    async fn secret_flow(state: &Arc<FlowboardState>) -> (TestFlow, String) {
        let app = App::new("app-exec", state.clone());
        let board_ref = app.create_board(Some("b-exec".to_string())).await.unwrap();

        let mut variable = Variable::new("token", VariableType::String, ValueType::Normal);
        variable.set_secret(true);
        variable.set_runtime_configured(true);
        let variable_id = variable.id.clone();

        let (start_id, board_id) = {
            let mut board = board_ref.lock().await;
            board.variables.insert(variable.id.clone(), variable);

            let registry = state.node_registry.read().await.clone();
            let mut start = registry
                .get_blueprint("events_simple", state)
                .await
                .unwrap();
            start.id = "start-node".to_string();
            let start_id = start.id.clone();
            let start_out = start.get_pin_by_name("exec_out").unwrap().id.clone();
            board.nodes.insert(start.id.clone(), start);

            let mut getter = registry.get_blueprint("var_get", state).await.unwrap();
            getter.id = "getter-node".to_string();
            getter
                .pins
                .values_mut()
                .find(|pin| pin.name == names::VAR_REF)
                .unwrap()
                .set_default_value(Some(serde_json::json!(variable_id.clone())));
            let getter_value = getter.get_pin_by_name("value").unwrap().id.clone();
            let getter_id = getter.id.clone();
            board.nodes.insert(getter.id.clone(), getter);

            let mut log = registry.get_blueprint("log_info", state).await.unwrap();
            log.id = "log-node".to_string();
            let log_in = log.get_pin_by_name("exec_in").unwrap().id.clone();
            let log_message = log.get_pin_by_name("message").unwrap().id.clone();
            let log_id = log.id.clone();
            board.nodes.insert(log.id.clone(), log);

            connect_pins(&mut board, &start_id, &start_out, &log_id, &log_in).unwrap();
            connect_pins(&mut board, &getter_id, &getter_value, &log_id, &log_message).unwrap();

            board.save(None).await.unwrap();
            (start_id, board.id.clone())
        };

        (
            TestFlow {
                app,
                board_id,
                start_id,
            },
            variable_id,
        )
    }

    #[tokio::test]
    async fn missing_runtime_variable_blocks_before_run_started() {
        let state = FlowboardState::in_memory();
        let (flow, _variable_id) = secret_flow(&state).await;
        let (callback, collected) = collecting_callback();

        let payload = RunPayload {
            id: flow.start_id.clone(),
            ..Default::default()
        };

        let err = flow
            .app
            .execute_board(
                &flow.board_id,
                payload,
                true,
                None,
                callback,
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

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(collected.lock().await.is_empty());
    }

    #[tokio::test]
    async fn secrets_never_reach_the_event_stream() {
        let state = FlowboardState::in_memory();
        let (flow, variable_id) = secret_flow(&state).await;
        let (callback, collected) = collecting_callback();

        let mut supplied = Variable::new("token", VariableType::String, ValueType::Normal);
        supplied.id = variable_id.clone();
        supplied.set_secret(true);
        supplied.set_runtime_configured(true);
        supplied.set_default_value(serde_json::json!("hunter2-secret-value"));

        let payload = RunPayload {
            id: flow.start_id.clone(),
            runtime_variables: Some([(variable_id, supplied)].into_iter().collect()),
            ..Default::default()
        };

        let meta = flow
            .app
            .execute_board(
                &flow.board_id,
                payload,
                true,
                None,
                callback,
                None,
                ExecutionLocation::Local,
                true,
            )
            .await
            .unwrap();

        assert_eq!(meta.status, RunStatus::Success);

        let events = wait_for_events(&collected, kinds::RUN_FINISHED).await;
        assert!(events.iter().any(|e| e.kind == kinds::RUN_STARTED));
        assert!(events.iter().any(|e| e.kind == kinds::NODE_ENTER));
        assert!(events.iter().any(|e| e.kind == kinds::RUN_FINISHED));

        for event in &events {
            let raw = flowboard_types::json::to_string(&event.payload).unwrap();
            assert!(
                !raw.contains("hunter2-secret-value"),
                "secret leaked into {} event: {}",
                event.kind,
                raw
            );
        }

        // The log line went out scrubbed, not suppressed.
        let log_event = events
            .iter()
            .find(|e| e.kind == kinds::NODE_LOG)
            .expect("log event present");
        assert_eq!(
            log_event.payload.get("message").and_then(|m| m.as_str()),
            Some(SCRUB_PLACEHOLDER)
        );
    }

    #[tokio::test]
    async fn events_are_fifo_per_run() {
        let state = FlowboardState::in_memory();
        let (flow, variable_id) = secret_flow(&state).await;
        let (callback, collected) = collecting_callback();

        let mut supplied = Variable::new("token", VariableType::String, ValueType::Normal);
        supplied.id = variable_id.clone();
        supplied.set_runtime_configured(true);
        supplied.set_default_value(serde_json::json!("plain"));

        let payload = RunPayload {
            id: flow.start_id.clone(),
            runtime_variables: Some([(variable_id, supplied)].into_iter().collect()),
            ..Default::default()
        };

        flow.app
            .execute_board(
                &flow.board_id,
                payload,
                true,
                None,
                callback,
                None,
                ExecutionLocation::Local,
                true,
            )
            .await
            .unwrap();

        let events = wait_for_events(&collected, kinds::RUN_FINISHED).await;
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort();
        assert_eq!(seqs, sorted, "intercom events must arrive in seq order");
        assert_eq!(events.first().unwrap().kind, kinds::RUN_STARTED);
        assert_eq!(events.last().unwrap().kind, kinds::RUN_FINISHED);
    }

    #[tokio::test]
    async fn cancellation_finishes_within_the_grace_period() {
        let state = FlowboardState::in_memory();
        let app = App::new("app-cancel", state.clone());
        let board_ref = app.create_board(Some("b-cancel".to_string())).await.unwrap();

        let start_id = {
            let mut board = board_ref.lock().await;
            let registry = state.node_registry.read().await.clone();

            let mut start = registry
                .get_blueprint("events_simple", &state)
                .await
                .unwrap();
            start.id = "start-node".to_string();
            let start_id = start.id.clone();
            let start_out = start.get_pin_by_name("exec_out").unwrap().id.clone();
            board.nodes.insert(start.id.clone(), start);

            let mut delay = registry.get_blueprint("control_delay", &state).await.unwrap();
            delay.id = "delay-node".to_string();
            delay
                .pins
                .values_mut()
                .find(|pin| pin.name == "duration_ms")
                .unwrap()
                .set_default_value(Some(serde_json::json!(10_000)));
            let delay_in = delay.get_pin_by_name("exec_in").unwrap().id.clone();
            let delay_id = delay.id.clone();
            board.nodes.insert(delay.id.clone(), delay);

            connect_pins(&mut board, &start_id, &start_out, &delay_id, &delay_in).unwrap();
            board.save(None).await.unwrap();
            start_id
        };

        let (callback, collected) = collecting_callback();
        let payload = RunPayload {
            id: start_id,
            ..Default::default()
        };

        let run_task = {
            let app = app.clone();
            tokio::spawn(async move {
                app.execute_board(
                    "b-cancel",
                    payload,
                    true,
                    None,
                    callback,
                    None,
                    ExecutionLocation::Local,
                    true,
                )
                .await
            })
        };

        // Wait until the run registered, then cancel.
        let run_id = loop {
            if let Some(entry) = state.runs.iter().next() {
                break entry.key().clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        app.cancel_execution(&run_id).await.unwrap();

        let meta = run_task.await.unwrap().unwrap();
        let grace = Duration::from_secs(5);
        assert!(
            started.elapsed() < grace + Duration::from_secs(1),
            "cancellation exceeded the grace period"
        );
        assert_eq!(meta.status, RunStatus::Cancelled);

        let events = wait_for_events(&collected, kinds::RUN_FINISHED).await;
        let finished = events
            .iter()
            .find(|e| e.kind == kinds::RUN_FINISHED)
            .unwrap();
        assert_eq!(
            finished.payload.get("status").and_then(|s| s.as_str()),
            Some("Cancelled")
        );

        // And the persisted record agrees.
        let runs = app.list_runs("b-cancel", RunFilter::default()).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Cancelled);
    }
}
