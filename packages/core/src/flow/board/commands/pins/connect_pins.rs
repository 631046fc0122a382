use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    flow::{
        board::{Board, commands::Command},
        pin::{ConnectionCandidate, PinType, do_pins_match},
        variable::VariableType,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

use super::{NodeOrLayer, find_node_or_layer, upsert_node_or_layer};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConnectPinsCommand {
    pub from_pin: String,
    pub to_pin: String,
    pub from_node: String,
    pub to_node: String,
}

impl ConnectPinsCommand {
    pub fn new(from_node: String, to_node: String, from_pin: String, to_pin: String) -> Self {
        ConnectPinsCommand {
            from_pin,
            to_pin,
            from_node,
            to_node,
        }
    }
}

#[async_trait]
impl Command for ConnectPinsCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        connect_pins(
            board,
            &self.from_node,
            &self.from_pin,
            &self.to_node,
            &self.to_pin,
        )
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        disconnect_pins(
            board,
            &self.from_node,
            &self.from_pin,
            &self.to_node,
            &self.to_pin,
        )
    }
}

pub fn connect_pins(
    board: &mut Board,
    from_node: &str,
    from_pin: &str,
    to_node: &str,
    to_pin: &str,
) -> flowboard_types::Result<()> {
    if from_node == to_node {
        return Err(EngineError::validation("Cannot connect a node to itself"));
    }

    if from_pin == to_pin {
        return Err(EngineError::validation("Cannot connect a pin to itself"));
    }

    let mut from_entity = find_node_or_layer(board, from_node)?;
    let from_is_layer = from_entity.is_layer();
    let mut to_entity = find_node_or_layer(board, to_node)?;
    let to_is_layer = to_entity.is_layer();

    {
        let from_pin_ref = match &from_entity {
            NodeOrLayer::Node(node) => node.pins.get(from_pin),
            NodeOrLayer::Layer(layer) => layer.pins.get(from_pin),
        }
        .ok_or_else(|| {
            EngineError::not_found(format!("From Pin ({}) not found in container", from_pin))
        })?;

        let to_pin_ref = match &to_entity {
            NodeOrLayer::Node(node) => node.pins.get(to_pin),
            NodeOrLayer::Layer(layer) => layer.pins.get(to_pin),
        }
        .ok_or_else(|| {
            EngineError::not_found(format!("To Pin ({}) not found in container", to_pin))
        })?;

        if from_pin_ref.pin_type == PinType::Input && !from_is_layer {
            return Err(EngineError::validation("Cannot connect an input pin"));
        }

        if to_pin_ref.pin_type == PinType::Output && !to_is_layer {
            return Err(EngineError::validation("Cannot connect an output pin"));
        }

        // Layer pins are checked with their direction flipped: relative to a
        // node inside, the boundary inverts.
        let from_candidate = if from_is_layer && from_pin_ref.pin_type == PinType::Input {
            ConnectionCandidate::inverted(from_pin_ref)
        } else {
            ConnectionCandidate::new(from_pin_ref)
        };
        let to_candidate = if to_is_layer && to_pin_ref.pin_type == PinType::Output {
            ConnectionCandidate::inverted(to_pin_ref)
        } else {
            ConnectionCandidate::new(to_pin_ref)
        };

        if !do_pins_match(from_candidate, to_candidate, &board.refs) {
            return Err(EngineError::validation(format!(
                "Pins {} and {} are not compatible",
                from_pin, to_pin
            )));
        }
    }

    let from_pin_ref = match &mut from_entity {
        NodeOrLayer::Node(node) => node.pins.get_mut(from_pin),
        NodeOrLayer::Layer(layer) => layer.pins.get_mut(from_pin),
    }
    .ok_or_else(|| EngineError::not_found(format!("From Pin ({}) not found", from_pin)))?;

    let to_pin_ref = match &mut to_entity {
        NodeOrLayer::Node(node) => node.pins.get_mut(to_pin),
        NodeOrLayer::Layer(layer) => layer.pins.get_mut(to_pin),
    }
    .ok_or_else(|| EngineError::not_found(format!("To Pin ({}) not found", to_pin)))?;

    // An execution output drives exactly one target; rewiring drops the old
    // edge everywhere.
    if from_pin_ref.data_type == VariableType::Execution {
        from_pin_ref.connected_to = BTreeSet::from([to_pin_ref.id.clone()]);

        let from_id = from_pin_ref.id.clone();
        board.nodes.iter_mut().for_each(|(_, node)| {
            node.pins.iter_mut().for_each(|(_, pin)| {
                pin.depends_on.remove(&from_id);
            });
        });
        board.layers.iter_mut().for_each(|(_, layer)| {
            layer.pins.iter_mut().for_each(|(_, pin)| {
                pin.depends_on.remove(&from_id);
            });
        });

        to_pin_ref.depends_on.insert(from_pin_ref.id.clone());
    }

    // A data input reads exactly one source; same single-edge rule on the
    // other side.
    if from_pin_ref.data_type != VariableType::Execution {
        to_pin_ref.depends_on = BTreeSet::from([from_pin_ref.id.clone()]);

        let to_id = to_pin_ref.id.clone();
        board.nodes.iter_mut().for_each(|(_, node)| {
            node.pins.iter_mut().for_each(|(_, pin)| {
                pin.connected_to.remove(&to_id);
            });
        });
        board.layers.iter_mut().for_each(|(_, layer)| {
            layer.pins.iter_mut().for_each(|(_, pin)| {
                pin.connected_to.remove(&to_id);
            });
        });
    }

    from_pin_ref.connected_to.insert(to_pin_ref.id.clone());

    upsert_node_or_layer(board, from_entity);
    upsert_node_or_layer(board, to_entity);

    Ok(())
}

pub fn disconnect_pins(
    board: &mut Board,
    from_node: &str,
    from_pin: &str,
    to_node: &str,
    to_pin: &str,
) -> flowboard_types::Result<()> {
    let mut from_entity = find_node_or_layer(board, from_node)?;
    let mut to_entity = find_node_or_layer(board, to_node)?;

    let from_pin_ref = match &mut from_entity {
        NodeOrLayer::Node(node) => node.pins.get_mut(from_pin),
        NodeOrLayer::Layer(layer) => layer.pins.get_mut(from_pin),
    }
    .ok_or_else(|| {
        EngineError::not_found(format!("From Pin ({}) not found in container", from_pin))
    })?;

    let to_pin_ref = match &mut to_entity {
        NodeOrLayer::Node(node) => node.pins.get_mut(to_pin),
        NodeOrLayer::Layer(layer) => layer.pins.get_mut(to_pin),
    }
    .ok_or_else(|| EngineError::not_found(format!("To Pin ({}) not found in container", to_pin)))?;

    to_pin_ref.depends_on.remove(&from_pin_ref.id);
    from_pin_ref.connected_to.remove(&to_pin_ref.id);

    upsert_node_or_layer(board, from_entity);
    upsert_node_or_layer(board, to_entity);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::board::Board;
    use crate::flow::board::commands::GenericCommand;
    use crate::flow::node::Node;
    use crate::flow::pin::ValueType;
    use object_store::path::Path;

    fn board_with_pair(
        out_type: VariableType,
        in_type: VariableType,
    ) -> (Board, String, String, String, String) {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = Board::new(None, Path::from("boards"), state);

        let mut producer = Node::new("producer", "Producer", "", "Utils");
        let out_pin = producer.add_output_pin("out", "Out", "", out_type);
        out_pin.set_value_type(ValueType::Normal);
        let out_id = out_pin.id.clone();
        let producer_id = producer.id.clone();

        let mut consumer = Node::new("consumer", "Consumer", "", "Utils");
        let in_pin = consumer.add_input_pin("in", "In", "", in_type);
        in_pin.set_value_type(ValueType::Normal);
        let in_id = in_pin.id.clone();
        let consumer_id = consumer.id.clone();

        board.nodes.insert(producer_id.clone(), producer);
        board.nodes.insert(consumer_id.clone(), consumer);

        (board, producer_id, consumer_id, out_id, in_id)
    }

    #[tokio::test]
    async fn connect_compatible_pins() {
        let state = crate::state::FlowboardState::in_memory();
        let (mut board, producer_id, consumer_id, out_id, in_id) =
            board_with_pair(VariableType::String, VariableType::String);

        let command = GenericCommand::ConnectPins(ConnectPinsCommand::new(
            producer_id,
            consumer_id,
            out_id.clone(),
            in_id.clone(),
        ));

        let inverted = board.execute_command(command, state.clone()).await.unwrap();

        let out_pin = board.get_pin_by_id(&out_id).unwrap();
        assert!(out_pin.connected_to.contains(&in_id));
        let in_pin = board.get_pin_by_id(&in_id).unwrap();
        assert!(in_pin.depends_on.contains(&out_id));

        // The inverse disconnects again.
        board.undo(vec![inverted], state).await.unwrap();
        let out_pin = board.get_pin_by_id(&out_id).unwrap();
        assert!(out_pin.connected_to.is_empty());
        let in_pin = board.get_pin_by_id(&in_id).unwrap();
        assert!(in_pin.depends_on.is_empty());
    }

    #[tokio::test]
    async fn type_mismatch_is_rejected_and_board_untouched() {
        let state = crate::state::FlowboardState::in_memory();
        let (mut board, producer_id, consumer_id, out_id, in_id) =
            board_with_pair(VariableType::String, VariableType::Integer);

        board.cleanup();
        let before = flowboard_types::json::to_string(&board).unwrap();

        let command = GenericCommand::ConnectPins(ConnectPinsCommand::new(
            producer_id,
            consumer_id,
            out_id,
            in_id,
        ));

        let err = board
            .execute_command(command, state)
            .await
            .unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::Validation
        );

        let after = flowboard_types::json::to_string(&board).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn generic_bridges_but_execution_does_not() {
        let state = crate::state::FlowboardState::in_memory();

        // Generic output feeding a String input is fine.
        let (mut board, producer_id, consumer_id, out_id, in_id) =
            board_with_pair(VariableType::Generic, VariableType::String);
        let command = GenericCommand::ConnectPins(ConnectPinsCommand::new(
            producer_id,
            consumer_id,
            out_id,
            in_id,
        ));
        board.execute_command(command, state.clone()).await.unwrap();

        // Execution never unifies with Generic.
        let (mut board, producer_id, consumer_id, out_id, in_id) =
            board_with_pair(VariableType::Execution, VariableType::Generic);
        let command = GenericCommand::ConnectPins(ConnectPinsCommand::new(
            producer_id,
            consumer_id,
            out_id,
            in_id,
        ));
        let err = board.execute_command(command, state).await.unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn self_loops_are_rejected() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = Board::new(None, Path::from("boards"), state.clone());

        let mut node = Node::new("loopy", "Loopy", "", "Utils");
        let out_id = node
            .add_output_pin("out", "Out", "", VariableType::String)
            .id
            .clone();
        let in_id = node
            .add_input_pin("in", "In", "", VariableType::String)
            .id
            .clone();
        let node_id = node.id.clone();
        board.nodes.insert(node_id.clone(), node);

        let command = GenericCommand::ConnectPins(ConnectPinsCommand::new(
            node_id.clone(),
            node_id,
            out_id,
            in_id,
        ));
        let err = board.execute_command(command, state).await.unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn execution_outputs_rewire_to_a_single_target() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = Board::new(None, Path::from("boards"), state.clone());

        let mut source = Node::new("source", "Source", "", "Utils");
        let out_id = source
            .add_output_pin("exec_out", "Out", "", VariableType::Execution)
            .id
            .clone();
        let source_id = source.id.clone();
        board.nodes.insert(source_id.clone(), source);

        let mut targets = vec![];
        for name in ["a", "b"] {
            let mut node = Node::new(name, name, "", "Utils");
            let in_id = node
                .add_input_pin("exec_in", "In", "", VariableType::Execution)
                .id
                .clone();
            targets.push((node.id.clone(), in_id));
            board.nodes.insert(node.id.clone(), node);
        }

        for (node_id, in_id) in &targets {
            let command = GenericCommand::ConnectPins(ConnectPinsCommand::new(
                source_id.clone(),
                node_id.clone(),
                out_id.clone(),
                in_id.clone(),
            ));
            board.execute_command(command, state.clone()).await.unwrap();
        }

        let out_pin = board.get_pin_by_id(&out_id).unwrap();
        assert_eq!(out_pin.connected_to.len(), 1);
        assert!(out_pin.connected_to.contains(&targets[1].1));
    }
}
