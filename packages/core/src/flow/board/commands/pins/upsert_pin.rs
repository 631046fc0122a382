use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, commands::Command},
        pin::Pin,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

/// Insert or replace a single pin on a node. Indices are re-numbered by the
/// cleanup pipeline after the batch.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertPinCommand {
    pub node_id: String,
    pub pin: Pin,
    pub old_pin: Option<Pin>,
}

impl UpsertPinCommand {
    pub fn new(node_id: String, pin: Pin) -> Self {
        UpsertPinCommand {
            node_id,
            pin,
            old_pin: None,
        }
    }
}

#[async_trait]
impl Command for UpsertPinCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let node = board
            .nodes
            .get_mut(&self.node_id)
            .ok_or_else(|| EngineError::not_found(format!("Node {} not found", self.node_id)))?;

        self.old_pin = node.pins.insert(self.pin.id.clone(), self.pin.clone());
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

        match self.old_pin.take() {
            Some(old_pin) => {
                node.pins.insert(old_pin.id.clone(), old_pin);
            }
            None => {
                node.pins.remove(&self.pin.id);
            }
        }
        Ok(())
    }
}
