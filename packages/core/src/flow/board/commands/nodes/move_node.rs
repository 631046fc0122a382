use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::board::{Board, commands::Command},
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct MoveNodeCommand {
    pub node_id: String,
    pub from_coordinates: Option<(f32, f32, f32)>,
    pub to_coordinates: (f32, f32, f32),
}

impl MoveNodeCommand {
    pub fn new(node_id: String, to_coordinates: (f32, f32, f32)) -> Self {
        MoveNodeCommand {
            node_id,
            from_coordinates: None,
            to_coordinates,
        }
    }
}

#[async_trait]
impl Command for MoveNodeCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let node = match board.nodes.get_mut(&self.node_id) {
            Some(node) => node,
            None => {
                return Err(EngineError::not_found(format!(
                    "Node {} not found",
                    self.node_id
                )));
            }
        };

        self.from_coordinates = node.coordinates;
        node.coordinates = Some(self.to_coordinates);

        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let node = match board.nodes.get_mut(&self.node_id) {
            Some(node) => node,
            None => return Err(EngineError::not_found("Node not found")),
        };

        node.coordinates = self.from_coordinates;

        Ok(())
    }
}
