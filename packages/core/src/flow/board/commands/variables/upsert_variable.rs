use flowboard_types::{EngineError, async_trait};
use schemars::JsonSchema;
use std::sync::Arc;

use crate::{
    flow::{
        board::{Board, commands::Command},
        variable::{Variable, VariableType, infer_schema_from_json},
    },
    state::FlowboardState,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertVariableCommand {
    pub variable: Variable,
    pub old_variable: Option<Variable>,
}

impl UpsertVariableCommand {
    pub fn new(variable: Variable) -> Self {
        UpsertVariableCommand {
            variable,
            old_variable: None,
        }
    }
}

#[async_trait]
impl Command for UpsertVariableCommand {
    async fn execute(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        // Struct variables accept example JSON as schema input; infer the
        // proper JSON Schema from it. Other types keep their schema as-is.
        if self.variable.data_type == VariableType::Struct {
            if let Some(schema_str) = &self.variable.schema {
                if !schema_str.trim().is_empty() {
                    if let Ok(inferred) = infer_schema_from_json(schema_str) {
                        self.variable.schema = Some(inferred);
                    }
                }
            }
        }

        if let Some(old_variable) = board
            .variables
            .insert(self.variable.id.clone(), self.variable.clone())
        {
            if !old_variable.editable {
                board
                    .variables
                    .insert(old_variable.id.clone(), old_variable);
                return Err(EngineError::validation("Variable is not editable"));
            }

            self.old_variable = Some(old_variable);
        }
        Ok(())
    }

    async fn undo(
        &mut self,
        board: &mut Board,
        _state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        board.variables.remove(&self.variable.id);
        if let Some(old_variable) = self.old_variable.take() {
            board
                .variables
                .insert(old_variable.id.clone(), old_variable);
        }
        Ok(())
    }
}
