use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, Comment, Layer, commands::Command},
        node::Node,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

/// Delete a layer. With `preserve_nodes` its children move up to the
/// layer's parent; otherwise they are removed together with their edges.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemoveLayerCommand {
    pub layer_id: String,
    pub preserve_nodes: bool,
    pub layer: Option<Layer>,
    pub removed_nodes: Vec<Node>,
    pub removed_comments: Vec<Comment>,
    pub reparented_nodes: Vec<String>,
    pub reparented_comments: Vec<String>,
    pub child_layers: Vec<String>,
    pub connected_nodes: Vec<Node>,
}

impl RemoveLayerCommand {
    pub fn new(layer_id: String, preserve_nodes: bool) -> Self {
        RemoveLayerCommand {
            layer_id,
            preserve_nodes,
            layer: None,
            removed_nodes: vec![],
            removed_comments: vec![],
            reparented_nodes: vec![],
            reparented_comments: vec![],
            child_layers: vec![],
            connected_nodes: vec![],
        }
    }
}

#[async_trait]
impl Command for RemoveLayerCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let layer = board
            .layers
            .remove(&self.layer_id)
            .ok_or_else(|| EngineError::not_found(format!("Layer {} not found", self.layer_id)))?;
        let parent_id = layer.parent_id.clone();
        self.layer = Some(layer);

        // Child layers always move up one level.
        for child in board.layers.values_mut() {
            if child.parent_id.as_deref() == Some(self.layer_id.as_str()) {
                child.parent_id = parent_id.clone();
                self.child_layers.push(child.id.clone());
            }
        }

        let member_ids: Vec<String> = board
            .nodes
            .values()
            .filter(|node| node.layer.as_deref() == Some(self.layer_id.as_str()))
            .map(|node| node.id.clone())
            .collect();

        if self.preserve_nodes {
            for node_id in member_ids {
                if let Some(node) = board.nodes.get_mut(&node_id) {
                    node.layer = parent_id.clone();
                    self.reparented_nodes.push(node_id);
                }
            }

            for comment in board.comments.values_mut() {
                if comment.layer.as_deref() == Some(self.layer_id.as_str()) {
                    comment.layer = parent_id.clone();
                    self.reparented_comments.push(comment.id.clone());
                }
            }

            return Ok(());
        }

        let mut removed_pins: HashSet<String> = HashSet::new();
        for node_id in &member_ids {
            if let Some(node) = board.nodes.remove(node_id) {
                removed_pins.extend(node.pins.keys().cloned());
                self.removed_nodes.push(node);
            }
        }
        if let Some(layer) = &self.layer {
            removed_pins.extend(layer.pins.keys().cloned());
        }

        let comment_ids: Vec<String> = board
            .comments
            .values()
            .filter(|comment| comment.layer.as_deref() == Some(self.layer_id.as_str()))
            .map(|comment| comment.id.clone())
            .collect();
        for comment_id in comment_ids {
            if let Some(comment) = board.comments.remove(&comment_id) {
                self.removed_comments.push(comment);
            }
        }

        // Detach the survivors from pins that no longer exist.
        let mut changed_nodes = vec![];
        for other in board.nodes.values() {
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

        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let layer = self
            .layer
            .take()
            .ok_or_else(|| EngineError::conflict("Nothing captured to restore"))?;
        let layer_id = layer.id.clone();
        board.layers.insert(layer_id.clone(), layer);

        for child_id in self.child_layers.drain(..) {
            if let Some(child) = board.layers.get_mut(&child_id) {
                child.parent_id = Some(layer_id.clone());
            }
        }

        for node_id in self.reparented_nodes.drain(..) {
            if let Some(node) = board.nodes.get_mut(&node_id) {
                node.layer = Some(layer_id.clone());
            }
        }

        for comment_id in self.reparented_comments.drain(..) {
            if let Some(comment) = board.comments.get_mut(&comment_id) {
                comment.layer = Some(layer_id.clone());
            }
        }

        for node in self.removed_nodes.drain(..) {
            board.nodes.insert(node.id.clone(), node);
        }

        for comment in self.removed_comments.drain(..) {
            board.comments.insert(comment.id.clone(), comment);
        }

        for node in self.connected_nodes.drain(..) {
            board.nodes.insert(node.id.clone(), node);
        }

        Ok(())
    }
}
