use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, commands::Command},
        node::Node,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

/// Structural update of an existing node (rename, move, pin set replace).
/// Unlike upsert this refuses to create the node.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateNodeCommand {
    pub node: Node,
    pub old_node: Option<Node>,
}

impl UpdateNodeCommand {
    pub fn new(node: Node) -> Self {
        UpdateNodeCommand {
            node,
            old_node: None,
        }
    }
}

#[async_trait]
impl Command for UpdateNodeCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        if let Some(fn_refs) = &mut self.node.fn_refs {
            super::validate_and_deduplicate_fn_refs(fn_refs, board);
        }

        let old_node = board
            .nodes
            .get(&self.node.id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("Node {} not found", self.node.id)))?;

        // Keep the layer assignment; moving between layers is a layer
        // command's job.
        self.node.layer = old_node.layer.clone();
        self.old_node = Some(old_node);

        board.nodes.insert(self.node.id.clone(), self.node.clone());
        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        if let Some(old_node) = self.old_node.take() {
            board.nodes.insert(old_node.id.clone(), old_node);
        }
        Ok(())
    }
}
