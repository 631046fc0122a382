use flowboard_types::{Value, sync::RwLock};
use std::sync::{OnceLock, Weak};

use crate::flow::pin::{Pin, PinType};
use crate::flow::variable::VariableType;

use super::internal_node::InternalNode;

/// InternalPin represents a pin during execution.
///
/// Design: The execution graph is **immutable after construction**. Only the
/// `value` changes during execution. This allows lock-free access to all
/// graph structure and metadata.
///
/// - All metadata (id, name, type, etc.) - immutable, accessed without locks
/// - Graph connections (connected_to, depends_on) - set once during
///   construction via OnceLock
/// - Only `value` uses RwLock as it changes during execution
pub struct InternalPin {
    /// Original pin ID
    pub id: String,
    /// Pin name for lookup
    pub name: String,
    /// Input or Output
    pub pin_type: PinType,
    /// Data type (Execution, String, Integer, etc.)
    pub data_type: VariableType,
    /// Cached default value (immutable)
    pub default_value: Option<Value>,
    /// Whether this is a layer boundary pin
    pub layer_pin: bool,
    /// Pin ordering index
    pub index: u16,
    /// Reference to parent node (set once after construction)
    node: OnceLock<Weak<InternalNode>>,

    /// Pins this output connects to
    connected_to: OnceLock<Vec<Weak<InternalPin>>>,
    /// Pins this input depends on
    depends_on: OnceLock<Vec<Weak<InternalPin>>>,

    /// Runtime value - the ONLY field that changes during execution
    pub value: RwLock<Option<Value>>,
}

impl InternalPin {
    /// Create a new InternalPin from a Pin definition. Graph connections
    /// must be set via the init_* methods.
    pub fn new(pin: &Pin, layer_pin: bool) -> Self {
        Self {
            id: pin.id.clone(),
            name: pin.name.clone(),
            pin_type: pin.pin_type.clone(),
            data_type: pin.data_type.clone(),
            default_value: pin
                .default_value
                .as_ref()
                .and_then(|v| flowboard_types::json::from_slice(v).ok()),
            layer_pin,
            index: pin.index,
            node: OnceLock::new(),
            connected_to: OnceLock::new(),
            depends_on: OnceLock::new(),
            value: RwLock::new(None),
        }
    }

    /// Set the parent node reference (can only be called once)
    pub fn init_node(&self, node: Weak<InternalNode>) {
        let _ = self.node.set(node);
    }

    /// Set the connected_to pins (can only be called once)
    pub fn init_connected_to(&self, pins: Vec<Weak<InternalPin>>) {
        let _ = self.connected_to.set(pins);
    }

    /// Set the depends_on pins (can only be called once)
    pub fn init_depends_on(&self, pins: Vec<Weak<InternalPin>>) {
        let _ = self.depends_on.set(pins);
    }

    #[inline]
    pub fn node(&self) -> Option<&Weak<InternalNode>> {
        self.node.get()
    }

    #[inline]
    pub fn connected_to(&self) -> &[Weak<InternalPin>] {
        self.connected_to.get().map(|v| v.as_slice()).unwrap_or(&[])
    }

    #[inline]
    pub fn depends_on(&self) -> &[Weak<InternalPin>] {
        self.depends_on.get().map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Reset value for re-execution
    pub async fn reset(&self) {
        *self.value.write().await = None;
    }

    pub async fn set_value(&self, value: Value) {
        *self.value.write().await = Some(value);
    }

    pub async fn get_value(&self) -> Option<Value> {
        self.value.read().await.clone()
    }

    /// Execution pins carry activation as a boolean value.
    pub async fn is_activated(&self) -> bool {
        matches!(
            self.value.read().await.as_ref(),
            Some(Value::Bool(true))
        )
    }
}
