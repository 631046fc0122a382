use crate::{
    flow::{
        execution::context::ExecutionContext,
        node::{Node, NodeLogic},
        pin::names,
        variable::VariableType,
    },
    state::FlowboardState,
};
use async_trait::async_trait;

/// Pure getter: reads a board variable referenced through the `var_ref`
/// pin. Runs on demand when a consumer evaluates its output.
#[derive(Default)]
pub struct GetVariableNode {}

impl GetVariableNode {
    pub fn new() -> Self {
        GetVariableNode {}
    }
}

#[async_trait]
impl NodeLogic for GetVariableNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new("var_get", "Get Variable", "Reads a variable", "Variables");
        node.add_icon("/flow/icons/variable.svg");

        node.add_input_pin(
            names::VAR_REF,
            "Variable",
            "The variable to read",
            VariableType::String,
        );

        node.add_output_pin(
            "value",
            "Value",
            "Current value of the variable",
            VariableType::Generic,
        );

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let variable_id = context.evaluate_pin::<String>(names::VAR_REF).await?;
        let variable = context.get_variable(&variable_id).await?;
        let value = variable.value.lock().await.clone();
        context.set_pin_value("value", value).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct SetVariableNode {}

impl SetVariableNode {
    pub fn new() -> Self {
        SetVariableNode {}
    }
}

#[async_trait]
impl NodeLogic for SetVariableNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new("var_set", "Set Variable", "Writes a variable", "Variables");
        node.add_icon("/flow/icons/variable.svg");

        node.add_input_pin("exec_in", "Input", "Trigger Pin", VariableType::Execution);

        node.add_input_pin(
            names::VAR_REF,
            "Variable",
            "The variable to write",
            VariableType::String,
        );

        node.add_input_pin(
            "value",
            "Value",
            "The new value",
            VariableType::Generic,
        );

        node.add_output_pin(
            "exec_out",
            "Output",
            "Continues the flow",
            VariableType::Execution,
        );

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let variable_id = context.evaluate_pin::<String>(names::VAR_REF).await?;
        let value = context
            .evaluate_pin::<flowboard_types::Value>("value")
            .await?;
        context.set_variable_value(&variable_id, value).await?;
        context.activate_exec_pin("exec_out").await?;
        Ok(())
    }
}
