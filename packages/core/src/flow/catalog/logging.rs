use crate::{
    flow::{
        execution::{LogLevel, context::ExecutionContext},
        node::{Node, NodeLogic},
        variable::VariableType,
    },
    state::FlowboardState,
};
use async_trait::async_trait;

#[derive(Default)]
pub struct InfoNode {}

impl InfoNode {
    pub fn new() -> Self {
        InfoNode {}
    }
}

#[async_trait]
impl NodeLogic for InfoNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new(
            "log_info",
            "Print Info",
            "Print Debugging Information",
            "Logging",
        );
        node.add_icon("/flow/icons/log-info.svg");

        node.add_input_pin("exec_in", "Input", "Trigger Pin", VariableType::Execution);

        node.add_input_pin(
            "message",
            "Message",
            "The message to log",
            VariableType::String,
        )
        .set_default_value(Some(serde_json::json!("")));

        node.add_output_pin(
            "exec_out",
            "Output",
            "Continues the flow",
            VariableType::Execution,
        );

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let message = context.evaluate_pin::<String>("message").await?;

        let output = context.get_pin_by_name("exec_out").await?;

        context.log_message(&message, LogLevel::Info);
        context.activate_exec_pin_ref(&output).await?;

        Ok(())
    }
}

#[derive(Default)]
pub struct ErrorNode {}

impl ErrorNode {
    pub fn new() -> Self {
        ErrorNode {}
    }
}

#[async_trait]
impl NodeLogic for ErrorNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new(
            "log_error",
            "Print Error",
            "Log an error message",
            "Logging",
        );
        node.add_icon("/flow/icons/log-error.svg");

        node.add_input_pin("exec_in", "Input", "Trigger Pin", VariableType::Execution);

        node.add_input_pin(
            "message",
            "Message",
            "The message to log",
            VariableType::String,
        )
        .set_default_value(Some(serde_json::json!("")));

        node.add_output_pin(
            "exec_out",
            "Output",
            "Continues the flow",
            VariableType::Execution,
        );

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let message = context.evaluate_pin::<String>("message").await?;

        context.log_message(&message, LogLevel::Error);
        context.activate_exec_pin("exec_out").await?;

        Ok(())
    }
}
