use crate::flow::{board::Board, board::Layer, node::Node};

pub mod connect_pins;
pub mod disconnect_pins;
pub mod remove_pin;
pub mod upsert_pin;

/// Pins live either on a node or on a layer boundary; commands address the
/// owner by id without caring which it is.
#[derive(Clone)]
pub enum NodeOrLayer {
    Node(Node),
    Layer(Layer),
}

impl NodeOrLayer {
    pub fn is_layer(&self) -> bool {
        matches!(self, NodeOrLayer::Layer(_))
    }
}

pub fn find_node_or_layer(board: &Board, id: &str) -> flowboard_types::Result<NodeOrLayer> {
    if let Some(node) = board.nodes.get(id) {
        return Ok(NodeOrLayer::Node(node.clone()));
    }
    if let Some(layer) = board.layers.get(id) {
        return Ok(NodeOrLayer::Layer(layer.clone()));
    }
    Err(flowboard_types::EngineError::not_found(format!(
        "Entity ({}) not found",
        id
    )))
}

pub fn upsert_node_or_layer(board: &mut Board, entity: NodeOrLayer) {
    match entity {
        NodeOrLayer::Node(node) => {
            board.nodes.insert(node.id.clone(), node);
        }
        NodeOrLayer::Layer(layer) => {
            board.layers.insert(layer.id.clone(), layer);
        }
    }
}
