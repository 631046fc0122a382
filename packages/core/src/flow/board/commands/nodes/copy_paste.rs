use std::{collections::HashMap, sync::Arc};

use crate::{
    flow::{
        board::{Board, Comment, Layer, commands::Command},
        node::Node,
        pin::names,
        variable::Variable,
    },
    state::FlowboardState,
};
use flowboard_types::{async_trait, create_id, json::from_slice};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Atomic bulk insert from a clipboard payload. Every pasted entity gets a
/// fresh id; edges between pasted nodes survive, edges into the rest of the
/// board are dropped. Coordinates translate by `offset - first node`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CopyPasteCommand {
    pub original_nodes: Vec<Node>,
    pub original_comments: Vec<Comment>,
    pub original_layers: Vec<Layer>,
    pub new_nodes: Vec<Node>,
    pub new_comments: Vec<Comment>,
    pub new_layers: Vec<Layer>,
    pub created_variables: Vec<String>,
    pub offset: (f32, f32, f32),
}

impl CopyPasteCommand {
    pub fn new(
        original_nodes: Vec<Node>,
        comments: Vec<Comment>,
        layers: Vec<Layer>,
        offset: (f32, f32, f32),
    ) -> Self {
        CopyPasteCommand {
            original_nodes,
            original_comments: comments,
            original_layers: layers,
            offset,
            new_nodes: vec![],
            new_comments: vec![],
            new_layers: vec![],
            created_variables: vec![],
        }
    }
}

#[async_trait]
impl Command for CopyPasteCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let mut translated = HashMap::new();
        let mut intermediate_nodes = Vec::with_capacity(self.original_nodes.len());

        let offset = self.offset;
        let offset = self
            .original_nodes
            .first()
            .map(|node| {
                let old_coords = node.coordinates.unwrap_or((0.0, 0.0, 0.0));
                (
                    offset.0 - old_coords.0,
                    offset.1 - old_coords.1,
                    offset.2 - old_coords.2,
                )
            })
            .unwrap_or(offset);

        for layer in self.original_layers.iter() {
            let mut new_layer = layer.clone();
            let old_id = new_layer.id.clone();
            new_layer.id = create_id();
            translated.insert(old_id, new_layer.id.clone());
            new_layer.coordinates = (
                new_layer.coordinates.0 + offset.0,
                new_layer.coordinates.1 + offset.1,
                new_layer.coordinates.2 + offset.2,
            );
            self.new_layers.push(new_layer);
        }

        // Parent chains only survive inside the pasted set.
        for layer in self.new_layers.iter_mut() {
            layer.parent_id = layer
                .parent_id
                .take()
                .and_then(|parent| translated.get(&parent).cloned());
            board.layers.insert(layer.id.clone(), layer.clone());
        }

        for comment in self.original_comments.iter() {
            let mut new_comment = comment.clone();
            new_comment.id = create_id();
            new_comment.layer = new_comment
                .layer
                .take()
                .and_then(|layer| translated.get(&layer).cloned());
            new_comment.coordinates = (
                new_comment.coordinates.0 + offset.0,
                new_comment.coordinates.1 + offset.1,
                new_comment.coordinates.2 + offset.2,
            );
            board
                .comments
                .insert(new_comment.id.clone(), new_comment.clone());
            self.new_comments.push(new_comment);
        }

        for node in self.original_nodes.iter() {
            let mut new_node = node.clone();
            let old_id = new_node.id.clone();
            let new_id = create_id();
            translated.insert(old_id, new_id.clone());
            new_node.id = new_id;
            new_node.layer = new_node
                .layer
                .take()
                .and_then(|layer| translated.get(&layer).cloned());
            new_node.coordinates = Some((
                new_node.coordinates.unwrap_or((0.0, 0.0, 0.0)).0 + offset.0,
                new_node.coordinates.unwrap_or((0.0, 0.0, 0.0)).1 + offset.1,
                new_node.coordinates.unwrap_or((0.0, 0.0, 0.0)).2 + offset.2,
            ));

            new_node.pins = new_node
                .pins
                .values()
                .map(|pin| {
                    let mut pin = pin.clone();
                    let old_pin_id = pin.id.clone();
                    let new_pin_id = create_id();
                    translated.insert(old_pin_id, new_pin_id.clone());
                    pin.id = new_pin_id.clone();

                    // Getter nodes may reference a variable the target board
                    // does not have; re-create it so the paste stays valid.
                    if pin.name == names::VAR_REF {
                        if let Some(var_ref) = pin.default_value.as_ref() {
                            if let Ok(var_ref) = from_slice::<String>(var_ref) {
                                if !board.variables.contains_key(&var_ref) {
                                    let var_name = new_node.friendly_name.replace("Get ", "");
                                    let mut new_var = Variable::new(
                                        &var_name,
                                        pin.data_type.clone(),
                                        pin.value_type.clone(),
                                    );
                                    new_var.id = var_ref.clone();
                                    board.variables.insert(var_ref.clone(), new_var);
                                    self.created_variables.push(var_ref);
                                }
                            }
                        }
                    }

                    (new_pin_id, pin)
                })
                .collect();

            intermediate_nodes.push(new_node);
        }

        for node in intermediate_nodes.iter() {
            let mut new_node = node.clone();
            for pin in new_node.pins.values_mut() {
                pin.depends_on = pin
                    .depends_on
                    .iter()
                    .filter(|dep_id| translated.contains_key(*dep_id))
                    .map(|dep_id| translated.get(dep_id).cloned().unwrap_or(dep_id.clone()))
                    .collect();

                pin.connected_to = pin
                    .connected_to
                    .iter()
                    .filter(|dep_id| translated.contains_key(*dep_id))
                    .map(|dep_id| translated.get(dep_id).cloned().unwrap_or(dep_id.clone()))
                    .collect();
            }

            board.nodes.insert(new_node.id.clone(), new_node.clone());
            self.new_nodes.push(new_node);
        }

        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        for node in self.new_nodes.drain(..) {
            board.nodes.remove(&node.id);
        }

        for comment in self.new_comments.drain(..) {
            board.comments.remove(&comment.id);
        }

        for layer in self.new_layers.drain(..) {
            board.layers.remove(&layer.id);
        }

        for variable_id in self.created_variables.drain(..) {
            board.variables.remove(&variable_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::board::commands::GenericCommand;
    use crate::flow::board::commands::pins::connect_pins::connect_pins;
    use crate::flow::variable::VariableType;
    use object_store::path::Path;

    fn data_node(name: &str) -> Node {
        let mut node = Node::new(name, name, "", "Utils");
        node.coordinates = Some((0.0, 0.0, 0.0));
        node.add_input_pin("in", "In", "", VariableType::String);
        node.add_output_pin("out", "Out", "", VariableType::String);
        node
    }

    #[tokio::test]
    async fn paste_rewrites_ids_and_keeps_internal_edges() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let a = data_node("a");
        let b = data_node("b");
        let external = data_node("external");

        let a_out = a.get_pin_by_name("out").unwrap().id.clone();
        let b_in = b.get_pin_by_name("in").unwrap().id.clone();
        let b_out = b.get_pin_by_name("out").unwrap().id.clone();
        let external_in = external.get_pin_by_name("in").unwrap().id.clone();

        let (a_id, b_id, external_id) = (a.id.clone(), b.id.clone(), external.id.clone());
        board.nodes.insert(a.id.clone(), a);
        board.nodes.insert(b.id.clone(), b);
        board.nodes.insert(external.id.clone(), external);

        // a -> b stays inside the clipboard; b -> external crosses out.
        connect_pins(&mut board, &a_id, &a_out, &b_id, &b_in).unwrap();
        connect_pins(&mut board, &b_id, &b_out, &external_id, &external_in).unwrap();

        let clipboard: Vec<Node> = vec![
            board.nodes.get(&a_id).unwrap().clone(),
            board.nodes.get(&b_id).unwrap().clone(),
        ];

        let command = GenericCommand::CopyPaste(CopyPasteCommand::new(
            clipboard,
            vec![],
            vec![],
            (500.0, 500.0, 0.0),
        ));
        let inverted = board.execute_command(command, state.clone()).await.unwrap();

        assert_eq!(board.nodes.len(), 5);

        let GenericCommand::CopyPaste(applied) = &inverted else {
            panic!("unexpected inverse command");
        };
        let new_a = &applied.new_nodes[0];
        let new_b = &applied.new_nodes[1];
        assert_ne!(new_a.id, a_id);
        assert_ne!(new_b.id, b_id);
        assert_eq!(new_a.coordinates, Some((500.0, 500.0, 0.0)));

        // Internal edge survived under new ids.
        let new_a_out = new_a.get_pin_by_name("out").unwrap();
        let new_b_in = new_b.get_pin_by_name("in").unwrap();
        assert!(new_a_out.connected_to.contains(&new_b_in.id));

        // The edge to the non-copied node was dropped.
        let new_b_out = new_b.get_pin_by_name("out").unwrap();
        assert!(new_b_out.connected_to.is_empty());

        // Undo removes exactly the pasted nodes.
        board.undo(vec![inverted.clone()], state.clone()).await.unwrap();
        assert_eq!(board.nodes.len(), 3);
    }

    #[tokio::test]
    async fn paste_recreates_missing_var_ref_variables() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let mut getter = Node::new("var_get", "Get Token", "", "Variables");
        getter
            .add_input_pin(names::VAR_REF, "Variable", "", VariableType::String)
            .set_default_value(Some(serde_json::json!("missing-variable-id")));
        getter.add_output_pin("value", "Value", "", VariableType::Generic);

        let command = GenericCommand::CopyPaste(CopyPasteCommand::new(
            vec![getter],
            vec![],
            vec![],
            (0.0, 0.0, 0.0),
        ));
        board.execute_command(command, state).await.unwrap();

        assert!(board.variables.contains_key("missing-variable-id"));
    }
}
