use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, commands::Command},
        variable::Variable,
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemoveVariableCommand {
    pub variable: Variable,
}

impl RemoveVariableCommand {
    pub fn new(variable: Variable) -> Self {
        RemoveVariableCommand { variable }
    }
}

#[async_trait]
impl Command for RemoveVariableCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let existing = board
            .variables
            .get(&self.variable.id)
            .ok_or_else(|| EngineError::not_found("Variable not found"))?;

        if !existing.editable {
            return Err(EngineError::validation("Variable is not editable"));
        }

        if let Some(variable) = board.variables.remove(&self.variable.id) {
            self.variable = variable;
        }
        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        board
            .variables
            .insert(self.variable.id.clone(), self.variable.clone());
        Ok(())
    }
}
