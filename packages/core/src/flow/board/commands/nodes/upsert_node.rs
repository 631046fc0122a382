use flowboard_types::async_trait;
use schemars::JsonSchema;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, commands::Command},
        node::Node,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

/// Insert a node, or replace it wholesale when the id already exists. Pins
/// removed by the replacement get their edges detached from peers; every
/// touched peer is captured so undo restores it byte-for-byte.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertNodeCommand {
    pub node: Node,
    pub current_layer: Option<String>,
    pub old_node: Option<Node>,
    pub connected_nodes: Vec<Node>,
}

impl UpsertNodeCommand {
    pub fn new(node: Node) -> Self {
        UpsertNodeCommand {
            node,
            current_layer: None,
            old_node: None,
            connected_nodes: vec![],
        }
    }
}

#[async_trait]
impl Command for UpsertNodeCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        // Validate and deduplicate fn_refs - never trust the frontend!
        if let Some(fn_refs) = &mut self.node.fn_refs {
            super::validate_and_deduplicate_fn_refs(fn_refs, board);
        }

        self.old_node = board.nodes.get(&self.node.id).cloned();

        // Pins that existed before but are gone in the replacement leave
        // dangling references on their peers; collect and detach them.
        let removed_pins: HashSet<String> = self
            .old_node
            .as_ref()
            .map(|old| {
                old.pins
                    .keys()
                    .filter(|pin_id| !self.node.pins.contains_key(*pin_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !removed_pins.is_empty() {
            let mut changed_nodes = vec![];
            for (node_id, other) in &board.nodes {
                if node_id == &self.node.id {
                    continue;
                }

                let touches = other.pins.values().any(|pin| {
                    pin.connected_to.iter().any(|id| removed_pins.contains(id))
                        || pin.depends_on.iter().any(|id| removed_pins.contains(id))
                });

                if touches {
                    self.connected_nodes.push(other.clone());
                    let mut cloned = other.clone();
                    for pin in cloned.pins.values_mut() {
                        pin.connected_to.retain(|id| !removed_pins.contains(id));
                        pin.depends_on.retain(|id| !removed_pins.contains(id));
                    }
                    changed_nodes.push(cloned);
                }
            }

            for node in changed_nodes {
                board.nodes.insert(node.id.clone(), node);
            }
        }

        if self.old_node.is_none() {
            self.node.layer = self.current_layer.clone();
        }
        board.nodes.insert(self.node.id.clone(), self.node.clone());
        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        match self.old_node.take() {
            Some(old_node) => {
                board.nodes.insert(old_node.id.clone(), old_node);
            }
            None => {
                board.nodes.remove(&self.node.id);
            }
        }

        for node in self.connected_nodes.drain(..) {
            board.nodes.insert(node.id.clone(), node);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::board::Board;
    use crate::flow::board::commands::GenericCommand;
    use crate::flow::variable::VariableType;
    use object_store::path::Path;

    /// Replacing a node with a smaller pin set drops the dangling edges on
    /// peers; undo restores both sides exactly.
    #[tokio::test]
    async fn replacement_cleans_dangling_edges() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = Board::new(None, Path::from("boards"), state.clone());

        let mut target = Node::new("target", "Target", "", "Utils");
        let kept = target.add_input_pin("kept", "Kept", "", VariableType::String).id.clone();
        let dropped = target.add_input_pin("dropped", "Dropped", "", VariableType::String).id.clone();
        let target_id = target.id.clone();

        let mut peer = Node::new("peer", "Peer", "", "Utils");
        let peer_out = peer.add_output_pin("out", "Out", "", VariableType::String);
        peer_out.connected_to.insert(dropped.clone());
        let peer_out_id = peer_out.id.clone();
        let peer_id = peer.id.clone();
        target.pins.get_mut(&dropped).unwrap().depends_on.insert(peer_out_id.clone());

        board.nodes.insert(target_id.clone(), target.clone());
        board.nodes.insert(peer_id, peer);

        let mut replacement = target.clone();
        replacement.pins.remove(&dropped);

        let command = GenericCommand::UpsertNode(UpsertNodeCommand::new(replacement));
        let inverted = board.execute_command(command, state.clone()).await.unwrap();

        assert!(!board.nodes.get(&target_id).unwrap().pins.contains_key(&dropped));
        let peer_pin = board.get_pin_by_id(&peer_out_id).unwrap();
        assert!(!peer_pin.connected_to.contains(&dropped));

        board.undo(vec![inverted], state).await.unwrap();
        assert!(board.nodes.get(&target_id).unwrap().pins.contains_key(&kept));
        assert!(board.nodes.get(&target_id).unwrap().pins.contains_key(&dropped));
        let peer_pin = board.get_pin_by_id(&peer_out_id).unwrap();
        assert!(peer_pin.connected_to.contains(&dropped));
    }
}
