use flowboard_types::{async_trait, create_id};
use highway::HighwayHash;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::execution::context::ExecutionContext;
use super::pin::{Pin, PinOptions, PinType, ValueType};
use super::variable::VariableType;
use crate::state::FlowboardState;
use crate::utils::hash::digest_hasher;

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
pub struct NodeScores {
    pub privacy: u8,
    pub security: u8,
    pub performance: u8,
    pub governance: u8,
    pub reliability: u8,
    pub cost: u8,
}

/// Function-reference capabilities and links of a node. `fn_refs` holds node
/// ids inside the same board.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
pub struct FnRefs {
    pub can_reference_fns: bool,
    pub can_be_referenced_by_fns: bool,
    pub fn_refs: Vec<String>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Running,
    Success,
    Error,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct Node {
    pub id: String,
    /// Machine name resolving the logic implementation in the registry.
    pub name: String,
    pub friendly_name: String,
    pub description: String,
    pub category: String,
    pub coordinates: Option<(f32, f32, f32)>,
    pub pins: HashMap<String, Pin>,
    pub comment: Option<String>,
    pub docs: Option<String>,
    pub icon: Option<String>,
    /// Layer this node lives in; `None` means the board root.
    pub layer: Option<String>,
    pub start: Option<bool>,
    pub long_running: Option<bool>,
    /// Forces local execution; a `Remote` board containing such a node is a
    /// static pre-run error.
    pub only_offline: bool,
    /// Node completes through an out-of-band event rather than returning.
    #[serde(default)]
    pub event_callback: bool,
    pub error: Option<String>,
    pub scores: Option<NodeScores>,
    pub fn_refs: Option<FnRefs>,
    /// OAuth provider ids this node needs at runtime.
    pub oauth_providers: Option<Vec<String>>,
    /// Scopes per provider, aggregated by pre-run analysis.
    pub required_oauth_scopes: Option<HashMap<String, Vec<String>>>,
    pub hash: Option<u64>,
}

impl Node {
    pub fn new(name: &str, friendly_name: &str, description: &str, category: &str) -> Self {
        Node {
            id: create_id(),
            name: name.to_string(),
            friendly_name: friendly_name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            coordinates: None,
            pins: HashMap::new(),
            comment: None,
            docs: None,
            icon: None,
            layer: None,
            start: None,
            long_running: None,
            only_offline: false,
            event_callback: false,
            error: None,
            scores: None,
            fn_refs: None,
            oauth_providers: None,
            required_oauth_scopes: None,
            hash: None,
        }
    }

    pub fn add_icon(&mut self, icon: &str) -> &mut Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn set_start(&mut self, start: bool) -> &mut Self {
        self.start = Some(start);
        self
    }

    pub fn set_long_running(&mut self, long_running: bool) -> &mut Self {
        self.long_running = Some(long_running);
        self
    }

    pub fn set_only_offline(&mut self, only_offline: bool) -> &mut Self {
        self.only_offline = only_offline;
        self
    }

    pub fn set_event_callback(&mut self, event_callback: bool) -> &mut Self {
        self.event_callback = event_callback;
        self
    }

    pub fn set_scores(&mut self, scores: NodeScores) -> &mut Self {
        self.scores = Some(scores);
        self
    }

    pub fn set_error(&mut self, error: Option<String>) -> &mut Self {
        self.error = error;
        self
    }

    pub fn add_oauth_provider(&mut self, provider_id: &str) -> &mut Self {
        self.oauth_providers
            .get_or_insert_with(Vec::new)
            .push(provider_id.to_string());
        self
    }

    pub fn require_oauth_scopes(&mut self, provider_id: &str, scopes: &[&str]) -> &mut Self {
        self.required_oauth_scopes
            .get_or_insert_with(HashMap::new)
            .entry(provider_id.to_string())
            .or_default()
            .extend(scopes.iter().map(|s| s.to_string()));
        self
    }

    pub fn add_input_pin(
        &mut self,
        name: &str,
        friendly_name: &str,
        description: &str,
        data_type: VariableType,
    ) -> &mut Pin {
        let mut pin = Pin::new(name, friendly_name, description, PinType::Input, data_type);
        pin.index = self.next_index(&PinType::Input);
        let id = pin.id.clone();
        self.pins.insert(id.clone(), pin);
        self.pins.get_mut(&id).expect("pin just inserted")
    }

    pub fn add_output_pin(
        &mut self,
        name: &str,
        friendly_name: &str,
        description: &str,
        data_type: VariableType,
    ) -> &mut Pin {
        let mut pin = Pin::new(name, friendly_name, description, PinType::Output, data_type);
        pin.index = self.next_index(&PinType::Output);
        let id = pin.id.clone();
        self.pins.insert(id.clone(), pin);
        self.pins.get_mut(&id).expect("pin just inserted")
    }

    fn next_index(&self, pin_type: &PinType) -> u16 {
        self.pins
            .values()
            .filter(|pin| &pin.pin_type == pin_type)
            .map(|pin| pin.index)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn get_pin_by_name(&self, name: &str) -> Option<&Pin> {
        self.pins.values().find(|pin| pin.name == name)
    }

    pub fn get_pins_by_name(&self, name: &str) -> Vec<&Pin> {
        self.pins.values().filter(|pin| pin.name == name).collect()
    }

    /// A node without execution pins is pure; it runs on demand when a
    /// downstream node evaluates one of its outputs.
    pub fn is_pure(&self) -> bool {
        !self
            .pins
            .values()
            .any(|pin| pin.data_type == VariableType::Execution)
    }

    /// Output pin errors route to when present, instead of failing the run.
    pub fn error_handler_pin(&self) -> Option<&Pin> {
        self.pins.values().find(|pin| {
            pin.name == super::pin::names::AUTO_HANDLE_ERROR
                && pin.pin_type == PinType::Output
                && pin.data_type == VariableType::Execution
        })
    }

    pub fn hash(&mut self) {
        let mut hasher = digest_hasher();

        hasher.append(self.id.as_bytes());
        hasher.append(self.name.as_bytes());
        hasher.append(self.friendly_name.as_bytes());
        hasher.append(self.description.as_bytes());
        hasher.append(self.category.as_bytes());

        if let Some(coordinates) = &self.coordinates {
            hasher.append(&coordinates.0.to_le_bytes());
            hasher.append(&coordinates.1.to_le_bytes());
            hasher.append(&coordinates.2.to_le_bytes());
        }

        let mut sorted_pins: Vec<_> = self.pins.values().collect();
        sorted_pins.sort_by_key(|pin| &pin.id);
        for pin in sorted_pins {
            pin.hash(&mut hasher);
        }

        if let Some(comment) = &self.comment {
            hasher.append(comment.as_bytes());
        }

        if let Some(layer) = &self.layer {
            hasher.append(layer.as_bytes());
        }

        if let Some(error) = &self.error {
            hasher.append(error.as_bytes());
        }

        if let Some(fn_refs) = &self.fn_refs {
            hasher.append(&[fn_refs.can_reference_fns as u8]);
            hasher.append(&[fn_refs.can_be_referenced_by_fns as u8]);
            for fn_ref in &fn_refs.fn_refs {
                hasher.append(fn_ref.as_bytes());
            }
        }

        hasher.append(&[self.only_offline as u8]);
        hasher.append(&[self.event_callback as u8]);

        self.hash = Some(hasher.finalize64());
    }
}

/// The logic seam. Node implementations are opaque to the engine; it only
/// stores the declared schema (`get_node`) and drives `run` during
/// execution.
#[async_trait]
pub trait NodeLogic: Send + Sync {
    async fn get_node(&self, app_state: &FlowboardState) -> Node;

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()>;

    /// Called after every board mutation so dynamic nodes can adjust their
    /// pin sets against the current board.
    async fn on_update(&self, _node: &mut Node, _board: Arc<super::board::Board>) {}
}

/// Registry of node logic implementations keyed by machine name.
#[derive(Default, Clone)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn NodeLogic>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        NodeRegistry {
            nodes: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, logic: Arc<dyn NodeLogic>) {
        self.nodes.insert(name.to_string(), logic);
    }

    pub fn instantiate(&self, node: &Node) -> flowboard_types::Result<Arc<dyn NodeLogic>> {
        self.nodes
            .get(&node.name)
            .cloned()
            .ok_or_else(|| flowboard_types::anyhow!("Node logic '{}' not registered", node.name))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NodeLogic>> {
        self.nodes.get(name).cloned()
    }

    pub async fn get_blueprint(
        &self,
        name: &str,
        state: &FlowboardState,
    ) -> flowboard_types::Result<Node> {
        let logic = self
            .nodes
            .get(name)
            .ok_or_else(|| flowboard_types::anyhow!("Node logic '{}' not registered", name))?;
        Ok(logic.get_node(state).await)
    }

    pub async fn catalog(&self, state: &FlowboardState) -> Vec<Node> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for logic in self.nodes.values() {
            nodes.push(logic.get_node(state).await);
        }
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Convenience used by pin builders on nodes.
impl Node {
    pub fn add_input_pin_with_options(
        &mut self,
        name: &str,
        friendly_name: &str,
        description: &str,
        data_type: VariableType,
        value_type: ValueType,
        options: PinOptions,
    ) -> &mut Pin {
        let pin = self.add_input_pin(name, friendly_name, description, data_type);
        pin.set_value_type(value_type);
        pin.set_options(options);
        pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_indices_are_one_based_per_direction() {
        let mut node = Node::new("test", "Test", "", "Utils");
        node.add_input_pin("exec_in", "In", "", VariableType::Execution);
        node.add_input_pin("text", "Text", "", VariableType::String);
        node.add_output_pin("exec_out", "Out", "", VariableType::Execution);

        let mut input_indices: Vec<u16> = node
            .pins
            .values()
            .filter(|p| p.pin_type == PinType::Input)
            .map(|p| p.index)
            .collect();
        input_indices.sort();
        assert_eq!(input_indices, vec![1, 2]);

        let output = node.get_pin_by_name("exec_out").unwrap();
        assert_eq!(output.index, 1);
    }

    #[test]
    fn digest_changes_with_position() {
        let mut node = Node::new("test", "Test", "", "Utils");
        node.hash();
        let before = node.hash;

        node.coordinates = Some((10.0, 20.0, 0.0));
        node.hash();
        assert_ne!(before, node.hash);
    }

    #[test]
    fn pure_node_has_no_execution_pins() {
        let mut node = Node::new("math_add", "Add", "", "Math");
        node.add_input_pin("a", "A", "", VariableType::Float);
        node.add_input_pin("b", "B", "", VariableType::Float);
        node.add_output_pin("sum", "Sum", "", VariableType::Float);
        assert!(node.is_pure());

        node.add_input_pin("exec_in", "In", "", VariableType::Execution);
        assert!(!node.is_pure());
    }
}
