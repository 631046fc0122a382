use ahash::AHashMap;
use flowboard_types::{
    Cacheable, EngineError, Value,
    intercom::{InterComEmitter, kinds},
    json::DeserializeOwned,
    sync::{CancellationToken, Mutex, RwLock},
};
use std::sync::Arc;
use std::time::Duration;

use crate::flow::{
    board::ExecutionStage,
    node::{Node, NodeState},
    oauth::OAuthToken,
    utils::evaluate_pin_value,
    variable::Variable,
};

use super::{
    LogLevel, RunMeta, Scrubber, internal_node::InternalNode, internal_pin::InternalPin,
    log::LogMessage, trace::Trace,
};

/// Everything a node sees while it runs. One context per node execution;
/// sub-contexts are created for pure dependencies and layer internals and
/// folded back into the parent's trace list.
pub struct ExecutionContext {
    pub meta: RunMeta,
    pub node: Arc<InternalNode>,
    pub variables: Arc<Mutex<AHashMap<String, Variable>>>,
    pub cache: Arc<RwLock<AHashMap<String, Arc<dyn Cacheable>>>>,
    pub oauth_tokens: Arc<AHashMap<String, OAuthToken>>,
    pub emitter: Arc<InterComEmitter>,
    pub scrubber: Arc<Scrubber>,
    pub cancellation: CancellationToken,
    pub log_level: LogLevel,
    pub stage: ExecutionStage,
    pub started_by: Option<Vec<Arc<InternalPin>>>,

    trace: Trace,
    sub_traces: Vec<Trace>,
    state: NodeState,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        meta: RunMeta,
        node: Arc<InternalNode>,
        variables: Arc<Mutex<AHashMap<String, Variable>>>,
        cache: Arc<RwLock<AHashMap<String, Arc<dyn Cacheable>>>>,
        oauth_tokens: Arc<AHashMap<String, OAuthToken>>,
        emitter: Arc<InterComEmitter>,
        scrubber: Arc<Scrubber>,
        cancellation: CancellationToken,
        log_level: LogLevel,
        stage: ExecutionStage,
    ) -> Self {
        let trace = Trace::new(node.node_id());
        ExecutionContext {
            meta,
            node,
            variables,
            cache,
            oauth_tokens,
            emitter,
            scrubber,
            cancellation,
            log_level,
            stage,
            started_by: None,
            trace,
            sub_traces: vec![],
            state: NodeState::Idle,
        }
    }

    pub async fn create_sub_context(&self, node: &Arc<InternalNode>) -> ExecutionContext {
        ExecutionContext::new(
            self.meta.clone(),
            node.clone(),
            self.variables.clone(),
            self.cache.clone(),
            self.oauth_tokens.clone(),
            self.emitter.clone(),
            self.scrubber.clone(),
            self.cancellation.clone(),
            self.log_level,
            self.stage.clone(),
        )
    }

    pub fn read_node(&self) -> Node {
        self.node.node().clone()
    }

    pub fn started_by_first(&self) -> Option<Arc<InternalPin>> {
        self.started_by.as_ref().and_then(|pins| pins.first().cloned())
    }

    // === Pins ===

    pub async fn get_pin_by_name(
        &self,
        name: &str,
    ) -> flowboard_types::Result<Arc<InternalPin>> {
        self.node.get_pin_by_name(name)
    }

    pub async fn get_pins_by_name(&self, name: &str) -> Vec<Arc<InternalPin>> {
        self.node.get_pins_by_name(name)
    }

    pub async fn get_pin_by_id(&self, id: &str) -> flowboard_types::Result<Arc<InternalPin>> {
        self.node
            .get_pin_by_id(id)
            .ok_or_else(|| flowboard_types::anyhow!("Pin '{}' not found", id))
    }

    pub async fn evaluate_pin<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> flowboard_types::Result<T> {
        let pin = self.node.get_pin_by_name(name)?;
        let value = evaluate_pin_value(pin).await?;
        flowboard_types::json::from_value(value).map_err(|e| {
            flowboard_types::anyhow!("Failed to deserialize pin '{}': {}", name, e)
        })
    }

    pub async fn evaluate_pin_ref<T: DeserializeOwned>(
        &self,
        pin: &Arc<InternalPin>,
    ) -> flowboard_types::Result<T> {
        let value = evaluate_pin_value(pin.clone()).await?;
        flowboard_types::json::from_value(value).map_err(|e| {
            flowboard_types::anyhow!("Failed to deserialize pin '{}': {}", pin.name, e)
        })
    }

    pub async fn set_pin_value(&mut self, pin: &str, value: Value) -> flowboard_types::Result<()> {
        let pin = self.node.get_pin_by_name(pin)?;
        pin.set_value(value).await;
        Ok(())
    }

    pub async fn activate_exec_pin(&self, pin: &str) -> flowboard_types::Result<()> {
        let pin = self.node.get_pin_by_name(pin)?;
        self.activate_exec_pin_ref(&pin).await
    }

    pub async fn activate_exec_pin_ref(
        &self,
        pin: &Arc<InternalPin>,
    ) -> flowboard_types::Result<()> {
        pin.set_value(Value::Bool(true)).await;
        Ok(())
    }

    pub async fn deactivate_exec_pin(&self, pin: &str) -> flowboard_types::Result<()> {
        let pin = self.node.get_pin_by_name(pin)?;
        self.deactivate_exec_pin_ref(&pin).await
    }

    pub async fn deactivate_exec_pin_ref(
        &self,
        pin: &Arc<InternalPin>,
    ) -> flowboard_types::Result<()> {
        pin.set_value(Value::Bool(false)).await;
        Ok(())
    }

    // === Variables ===

    pub async fn get_variable(&self, variable_id: &str) -> flowboard_types::Result<Variable> {
        self.variables
            .lock()
            .await
            .get(variable_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("Variable {} not found", variable_id)))
    }

    pub async fn set_variable_value(
        &self,
        variable_id: &str,
        value: Value,
    ) -> flowboard_types::Result<()> {
        let variables = self.variables.lock().await;
        let variable = variables
            .get(variable_id)
            .ok_or_else(|| EngineError::not_found(format!("Variable {} not found", variable_id)))?;
        *variable.value.lock().await = value;
        Ok(())
    }

    // === OAuth ===

    pub fn get_oauth_token(&self, provider_id: &str) -> Option<&OAuthToken> {
        self.oauth_tokens.get(provider_id)
    }

    pub fn get_oauth_access_token(&self, provider_id: &str) -> Option<&str> {
        self.oauth_tokens
            .get(provider_id)
            .map(|token| token.access_token.as_str())
    }

    pub fn has_oauth_token(&self, provider_id: &str) -> bool {
        self.oauth_tokens.contains_key(provider_id)
    }

    // === Cache ===

    pub async fn get_cache(&self, key: &str) -> Option<Arc<dyn Cacheable>> {
        self.cache.read().await.get(key).cloned()
    }

    pub async fn has_cache(&self, key: &str) -> bool {
        self.cache.read().await.contains_key(key)
    }

    pub async fn set_cache(&self, key: &str, value: Arc<dyn Cacheable>) {
        self.cache.write().await.insert(key.to_string(), value);
    }

    // === Cancellation ===

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Sleep that wakes up early on cancellation; long-running nodes use
    /// this at their suspension points.
    pub async fn sleep(&self, duration: Duration) -> flowboard_types::Result<()> {
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(EngineError::cancelled("Run was cancelled")),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    // === Logging & state ===

    pub fn log(&mut self, log: LogMessage) {
        let mut log = log;
        log.message = self.scrubber.scrub_str(&log.message);
        log.node_id = Some(self.node.node_id().to_string());
        self.trace.logs.push(log);
    }

    pub fn log_message(&mut self, message: &str, log_level: LogLevel) {
        let log = LogMessage::new(message, log_level, None);
        self.log(log);
    }

    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub fn get_state(&self) -> NodeState {
        self.state
    }

    /// Stream a free-form event to the caller. Payloads pass the scrubber
    /// so secret values never leave the engine.
    pub async fn stream(&self, kind: &str, payload: Value) -> flowboard_types::Result<()> {
        if !self.meta.stream_state {
            return Ok(());
        }
        let payload = self.scrubber.scrub_value(payload);
        self.emitter.emit(kind, payload).await?;
        Ok(())
    }

    pub async fn stream_log(&self, message: &str, level: LogLevel) -> flowboard_types::Result<()> {
        self.stream(
            kinds::NODE_LOG,
            flowboard_types::json::json!({
                "node_id": self.node.node_id(),
                "level": level.to_u8(),
                "message": message,
            }),
        )
        .await
    }

    // === Traces ===

    pub fn end_trace(&mut self) {
        self.trace.finish();
    }

    pub fn push_sub_context(&mut self, context: &mut ExecutionContext) {
        context.end_trace();
        self.sub_traces.push(context.trace.clone());
        self.sub_traces.append(&mut context.sub_traces);
    }

    pub fn take_traces(&mut self) -> Vec<Trace> {
        let mut traces = Vec::with_capacity(self.sub_traces.len() + 1);
        traces.push(self.trace.clone());
        traces.append(&mut self.sub_traces);
        traces
    }
}
