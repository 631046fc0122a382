use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, Layer, commands::Command},
        node::Node,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

/// Create or replace a layer. When `node_ids` is set the named nodes are
/// collapsed into the layer: they are re-parented under it and every edge
/// crossing the boundary is re-routed through synthetic boundary pins by the
/// bridge cleanup pass that follows command application.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertLayerCommand {
    pub layer: Layer,
    pub node_ids: Vec<String>,
    pub current_layer: Option<String>,
    pub old_layer: Option<Layer>,
    pub old_nodes: Vec<Node>,
    pub old_connected: Vec<Node>,
}

impl UpsertLayerCommand {
    pub fn new(layer: Layer, node_ids: Vec<String>) -> Self {
        UpsertLayerCommand {
            layer,
            node_ids,
            current_layer: None,
            old_layer: None,
            old_nodes: vec![],
            old_connected: vec![],
        }
    }
}

#[async_trait]
impl Command for UpsertLayerCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        if self.layer.parent_id.is_none() {
            self.layer.parent_id = self.current_layer.clone();
        }

        // A layer must never appear in its own parent chain.
        if let Some(parent_id) = &self.layer.parent_id {
            if parent_id == &self.layer.id || board.layer_chain_contains(parent_id, &self.layer.id)
            {
                return Err(EngineError::validation(
                    "Layer parent chain would form a cycle",
                ));
            }
        }

        self.old_layer = board
            .layers
            .insert(self.layer.id.clone(), self.layer.clone());

        if self.node_ids.is_empty() {
            return Ok(());
        }

        let collapsing: HashSet<&String> = self.node_ids.iter().collect();
        let mut collapsed_pins: HashSet<String> = HashSet::new();

        for node_id in &self.node_ids {
            let node = board
                .nodes
                .get(node_id)
                .ok_or_else(|| EngineError::not_found(format!("Node {} not found", node_id)))?;
            self.old_nodes.push(node.clone());
            collapsed_pins.extend(node.pins.keys().cloned());
        }

        // Outside peers with an edge into the collapsed set get rewired by
        // the bridge pass; snapshot them before that happens.
        for (node_id, other) in &board.nodes {
            if collapsing.contains(node_id) {
                continue;
            }
            let touches = other.pins.values().any(|pin| {
                pin.connected_to.iter().any(|id| collapsed_pins.contains(id))
                    || pin.depends_on.iter().any(|id| collapsed_pins.contains(id))
            });
            if touches {
                self.old_connected.push(other.clone());
            }
        }

        for node_id in &self.node_ids {
            if let Some(node) = board.nodes.get_mut(node_id) {
                node.layer = Some(self.layer.id.clone());
            }
        }

        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        match self.old_layer.take() {
            Some(old_layer) => {
                board.layers.insert(old_layer.id.clone(), old_layer);
            }
            None => {
                board.layers.remove(&self.layer.id);
            }
        }

        for node in self.old_nodes.drain(..) {
            board.nodes.insert(node.id.clone(), node);
        }

        for node in self.old_connected.drain(..) {
            board.nodes.insert(node.id.clone(), node);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::board::LayerType;
    use crate::flow::board::commands::GenericCommand;
    use crate::flow::board::commands::pins::connect_pins::connect_pins;
    use crate::flow::variable::VariableType;
    use flowboard_types::create_id;
    use object_store::path::Path;

    /// outside -> a -> b -> c -> outside, then {a, b, c} collapse into a
    /// layer and the crossing edges re-route through boundary pins.
    #[tokio::test]
    async fn collapse_reroutes_edges_and_undo_restores() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let mut chain = vec![];
        for name in ["outside_in", "a", "b", "c", "outside_out"] {
            let mut node = Node::new(name, name, "", "Utils");
            node.coordinates = Some((chain.len() as f32 * 100.0, 0.0, 0.0));
            let in_id = node
                .add_input_pin("exec_in", "In", "", VariableType::Execution)
                .id
                .clone();
            let out_id = node
                .add_output_pin("exec_out", "Out", "", VariableType::Execution)
                .id
                .clone();
            chain.push((node.id.clone(), in_id, out_id));
            board.nodes.insert(node.id.clone(), node);
        }

        for window in chain.windows(2) {
            let (from_node, _, from_out) = &window[0];
            let (to_node, to_in, _) = &window[1];
            connect_pins(&mut board, from_node, from_out, to_node, to_in).unwrap();
        }
        board.cleanup();

        let collapsed: Vec<String> = chain[1..4].iter().map(|(id, _, _)| id.clone()).collect();
        let original_nodes: Vec<Node> = collapsed
            .iter()
            .map(|id| board.nodes.get(id).unwrap().clone())
            .collect();

        let layer = Layer::new(create_id(), "Collapsed".to_string(), LayerType::Collapsed);
        let layer_id = layer.id.clone();
        let command =
            GenericCommand::UpsertLayer(UpsertLayerCommand::new(layer, collapsed.clone()));

        let inverted = board.execute_command(command, state.clone()).await.unwrap();

        // Nodes moved under the layer.
        for id in &collapsed {
            assert_eq!(
                board.nodes.get(id).unwrap().layer.as_deref(),
                Some(layer_id.as_str())
            );
        }

        // The crossing edges now run through synthetic boundary pins.
        let layer_pins = &board.layers.get(&layer_id).unwrap().pins;
        assert!(!layer_pins.is_empty());

        let outside_out_pin = board.get_pin_by_id(&chain[0].2).unwrap();
        let a_in = &chain[1].1;
        assert!(
            !outside_out_pin.connected_to.contains(a_in),
            "edge into the layer must be re-routed through a boundary pin"
        );

        // Undo puts everything back: same parents, same coordinates, same
        // edges, no layer.
        board.undo(vec![inverted], state).await.unwrap();

        assert!(!board.layers.contains_key(&layer_id));
        for (index, id) in collapsed.iter().enumerate() {
            let node = board.nodes.get(id).unwrap();
            assert_eq!(node.layer, None);
            assert_eq!(
                node.coordinates,
                Some(((index + 1) as f32 * 100.0, 0.0, 0.0))
            );
        }

        for (index, original) in original_nodes.iter().enumerate() {
            let restored = board.nodes.get(&collapsed[index]).unwrap();
            for (pin_id, pin) in &original.pins {
                let restored_pin = restored.pins.get(pin_id).unwrap();
                assert_eq!(pin.connected_to, restored_pin.connected_to);
                assert_eq!(pin.depends_on, restored_pin.depends_on);
            }
        }
    }

    #[tokio::test]
    async fn layer_cycles_are_rejected() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let mut parent = Layer::new(create_id(), "Parent".to_string(), LayerType::Collapsed);
        let mut child = Layer::new(create_id(), "Child".to_string(), LayerType::Collapsed);
        child.parent_id = Some(parent.id.clone());
        // The cycle: parent under child while child sits under parent.
        parent.parent_id = Some(child.id.clone());

        board.layers.insert(child.id.clone(), child);

        let command = GenericCommand::UpsertLayer(UpsertLayerCommand::new(parent, vec![]));
        let err = board.execute_command(command, state).await.unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn remove_layer_preserving_nodes_reparents() {
        use crate::flow::board::commands::layers::remove_layer::RemoveLayerCommand;

        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let layer = Layer::new(create_id(), "Group".to_string(), LayerType::Collapsed);
        let layer_id = layer.id.clone();
        board.layers.insert(layer_id.clone(), layer);

        let mut node = Node::new("inner", "Inner", "", "Utils");
        node.layer = Some(layer_id.clone());
        let node_id = node.id.clone();
        board.nodes.insert(node_id.clone(), node);

        let command =
            GenericCommand::RemoveLayer(RemoveLayerCommand::new(layer_id.clone(), true));
        let inverted = board.execute_command(command, state.clone()).await.unwrap();

        assert!(!board.layers.contains_key(&layer_id));
        assert_eq!(board.nodes.get(&node_id).unwrap().layer, None);

        board.undo(vec![inverted], state).await.unwrap();
        assert!(board.layers.contains_key(&layer_id));
        assert_eq!(
            board.nodes.get(&node_id).unwrap().layer.as_deref(),
            Some(layer_id.as_str())
        );
    }
}
