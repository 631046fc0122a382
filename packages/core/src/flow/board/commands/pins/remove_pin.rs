use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, commands::Command},
        node::Node,
        pin::Pin,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

/// Remove a single pin. Peers holding an edge to it are detached and
/// captured for undo.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemovePinCommand {
    pub node_id: String,
    pub pin_id: String,
    pub removed_pin: Option<Pin>,
    pub connected_nodes: Vec<Node>,
}

impl RemovePinCommand {
    pub fn new(node_id: String, pin_id: String) -> Self {
        RemovePinCommand {
            node_id,
            pin_id,
            removed_pin: None,
            connected_nodes: vec![],
        }
    }
}

#[async_trait]
impl Command for RemovePinCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let removed = {
            let node = board.nodes.get_mut(&self.node_id).ok_or_else(|| {
                EngineError::not_found(format!("Node {} not found", self.node_id))
            })?;

            node.pins
                .remove(&self.pin_id)
                .ok_or_else(|| EngineError::not_found(format!("Pin {} not found", self.pin_id)))?
        };
        self.removed_pin = Some(removed);

        let mut changed_nodes = vec![];
        for (node_id, other) in &board.nodes {
            if node_id == &self.node_id {
                continue;
            }

            let touches = other.pins.values().any(|pin| {
                pin.connected_to.contains(&self.pin_id) || pin.depends_on.contains(&self.pin_id)
            });

            if touches {
                self.connected_nodes.push(other.clone());
                let mut cloned = other.clone();
                for pin in cloned.pins.values_mut() {
                    pin.connected_to.remove(&self.pin_id);
                    pin.depends_on.remove(&self.pin_id);
                }
                changed_nodes.push(cloned);
            }
        }

        for node in changed_nodes {
            board.nodes.insert(node.id.clone(), node);
        }

        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let node = board
            .nodes
            .get_mut(&self.node_id)
            .ok_or_else(|| EngineError::not_found(format!("Node {} not found", self.node_id)))?;

        if let Some(pin) = self.removed_pin.take() {
            node.pins.insert(pin.id.clone(), pin);
        }

        for other in self.connected_nodes.drain(..) {
            board.nodes.insert(other.id.clone(), other);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::board::Board;
    use crate::flow::board::commands::GenericCommand;
    use crate::flow::pin::PinType;
    use crate::flow::variable::VariableType;
    use object_store::path::Path;

    /// Removing a pin re-numbers the survivors densely (1..N) and detaches
    /// peers that referenced it.
    #[tokio::test]
    async fn removal_reindexes_and_detaches() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = Board::new(None, Path::from("boards"), state.clone());

        let mut node = Node::new("multi", "Multi", "", "Utils");
        let first = node.add_input_pin("first", "First", "", VariableType::String).id.clone();
        let second = node.add_input_pin("second", "Second", "", VariableType::String).id.clone();
        let third = node.add_input_pin("third", "Third", "", VariableType::String).id.clone();
        let node_id = node.id.clone();

        let mut peer = Node::new("peer", "Peer", "", "Utils");
        let peer_out = peer.add_output_pin("out", "Out", "", VariableType::String);
        peer_out.connected_to.insert(second.clone());
        let peer_out_id = peer_out.id.clone();
        let peer_id = peer.id.clone();
        node.pins.get_mut(&second).unwrap().depends_on.insert(peer_out_id.clone());

        board.nodes.insert(node_id.clone(), node);
        board.nodes.insert(peer_id, peer);

        let command =
            GenericCommand::RemovePin(RemovePinCommand::new(node_id.clone(), second.clone()));
        let inverted = board.execute_command(command, state.clone()).await.unwrap();

        let node = board.nodes.get(&node_id).unwrap();
        let mut indices: Vec<u16> = node
            .pins
            .values()
            .filter(|pin| pin.pin_type == PinType::Input)
            .map(|pin| pin.index)
            .collect();
        indices.sort();
        assert_eq!(indices, vec![1, 2]);

        let peer_pin = board.get_pin_by_id(&peer_out_id).unwrap();
        assert!(!peer_pin.connected_to.contains(&second));

        board.undo(vec![inverted], state).await.unwrap();
        let node = board.nodes.get(&node_id).unwrap();
        assert!(node.pins.contains_key(&first));
        assert!(node.pins.contains_key(&second));
        assert!(node.pins.contains_key(&third));
        let peer_pin = board.get_pin_by_id(&peer_out_id).unwrap();
        assert!(peer_pin.connected_to.contains(&second));
    }
}
