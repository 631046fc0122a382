use flowboard_types::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::FlowboardState;

use super::Board;

pub mod comments;
pub mod layers;
pub mod nodes;
pub mod pins;
pub mod variables;

use comments::remove_comment::RemoveCommentCommand;
use comments::upsert_comment::UpsertCommentCommand;
use layers::remove_layer::RemoveLayerCommand;
use layers::upsert_layer::UpsertLayerCommand;
use nodes::copy_paste::CopyPasteCommand;
use nodes::move_node::MoveNodeCommand;
use nodes::remove_node::RemoveNodeCommand;
use nodes::update_node::UpdateNodeCommand;
use nodes::upsert_node::UpsertNodeCommand;
use pins::connect_pins::ConnectPinsCommand;
use pins::disconnect_pins::DisconnectPinsCommand;
use pins::remove_pin::RemovePinCommand;
use pins::upsert_pin::UpsertPinCommand;
use variables::remove_variable::RemoveVariableCommand;
use variables::upsert_variable::UpsertVariableCommand;

/// A reversible board mutation. `execute` must capture whatever state `undo`
/// needs; after a successful `execute` the same value acts as the inverse
/// command handed back to the client.
#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(
        &mut self,
        board: &mut Board,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()>;

    async fn undo(
        &mut self,
        board: &mut Board,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()>;
}

/// Wire envelope for commands: `{ "type": "<tag>", "data": { … } }`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GenericCommand {
    UpsertNode(UpsertNodeCommand),
    UpdateNode(UpdateNodeCommand),
    RemoveNode(RemoveNodeCommand),
    MoveNode(MoveNodeCommand),
    CopyPaste(CopyPasteCommand),
    UpsertPin(UpsertPinCommand),
    RemovePin(RemovePinCommand),
    ConnectPins(ConnectPinsCommand),
    DisconnectPins(DisconnectPinsCommand),
    UpsertComment(UpsertCommentCommand),
    RemoveComment(RemoveCommentCommand),
    UpsertVariable(UpsertVariableCommand),
    RemoveVariable(RemoveVariableCommand),
    UpsertLayer(UpsertLayerCommand),
    RemoveLayer(RemoveLayerCommand),
}

impl GenericCommand {
    fn inner_mut(&mut self) -> &mut dyn Command {
        match self {
            GenericCommand::UpsertNode(cmd) => cmd,
            GenericCommand::UpdateNode(cmd) => cmd,
            GenericCommand::RemoveNode(cmd) => cmd,
            GenericCommand::MoveNode(cmd) => cmd,
            GenericCommand::CopyPaste(cmd) => cmd,
            GenericCommand::UpsertPin(cmd) => cmd,
            GenericCommand::RemovePin(cmd) => cmd,
            GenericCommand::ConnectPins(cmd) => cmd,
            GenericCommand::DisconnectPins(cmd) => cmd,
            GenericCommand::UpsertComment(cmd) => cmd,
            GenericCommand::RemoveComment(cmd) => cmd,
            GenericCommand::UpsertVariable(cmd) => cmd,
            GenericCommand::RemoveVariable(cmd) => cmd,
            GenericCommand::UpsertLayer(cmd) => cmd,
            GenericCommand::RemoveLayer(cmd) => cmd,
        }
    }

    pub async fn execute(
        &mut self,
        board: &mut Board,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        self.inner_mut().execute(board, state).await
    }

    pub async fn undo(
        &mut self,
        board: &mut Board,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        self.inner_mut().undo(board, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::Node;

    #[test]
    fn envelope_uses_type_and_data() {
        let command = GenericCommand::UpsertNode(UpsertNodeCommand::new(Node::new(
            "log_info",
            "Print Info",
            "",
            "Logging",
        )));
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "upsert_node");
        assert!(value["data"].is_object());

        let back: GenericCommand = serde_json::from_value(value).unwrap();
        assert!(matches!(back, GenericCommand::UpsertNode(_)));
    }
}

#[cfg(test)]
mod batch_tests {
    use super::*;
    use crate::flow::node::Node;
    use crate::flow::variable::{Variable, VariableType};
    use crate::flow::pin::ValueType;
    use nodes::upsert_node::UpsertNodeCommand;
    use variables::upsert_variable::UpsertVariableCommand;
    use object_store::path::Path;

    /// A failing command in a batch rolls the earlier ones back.
    #[tokio::test]
    async fn batch_rolls_back_on_first_failure() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board =
            crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let mut locked = Variable::new("locked", VariableType::String, ValueType::Normal);
        locked.set_editable(false);
        let locked_id = locked.id.clone();
        board.variables.insert(locked.id.clone(), locked.clone());

        let node = Node::new("log_info", "Print Info", "", "Logging");
        let node_id = node.id.clone();

        let mut replacement = locked.clone();
        replacement.set_editable(true);

        let commands = vec![
            GenericCommand::UpsertNode(UpsertNodeCommand::new(node)),
            // Refused: the existing variable is not editable.
            GenericCommand::UpsertVariable(UpsertVariableCommand::new(replacement)),
        ];

        let err = board
            .execute_commands(commands, state.clone())
            .await
            .unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::Validation
        );

        // The node insert from step one was rolled back.
        assert!(!board.nodes.contains_key(&node_id));
        assert!(!board.variables.get(&locked_id).unwrap().editable);
    }

    #[tokio::test]
    async fn batch_applies_in_order_and_returns_inverses() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board =
            crate::flow::board::Board::new(None, Path::from("boards"), state.clone());

        let node_a = Node::new("log_info", "Print Info", "", "Logging");
        let node_b = Node::new("log_error", "Print Error", "", "Logging");
        let (a_id, b_id) = (node_a.id.clone(), node_b.id.clone());

        let inverses = board
            .execute_commands(
                vec![
                    GenericCommand::UpsertNode(UpsertNodeCommand::new(node_a)),
                    GenericCommand::UpsertNode(UpsertNodeCommand::new(node_b)),
                ],
                state.clone(),
            )
            .await
            .unwrap();
        assert_eq!(inverses.len(), 2);
        assert!(board.nodes.contains_key(&a_id));
        assert!(board.nodes.contains_key(&b_id));

        board.undo(inverses, state).await.unwrap();
        assert!(board.nodes.is_empty());
    }
}
