use crate::{
    flow::{
        execution::context::ExecutionContext,
        node::{Node, NodeLogic},
        variable::VariableType,
    },
    state::FlowboardState,
};
use async_trait::async_trait;

/// Entry point for manually triggered and event-driven runs. The run
/// payload is exposed on the `payload` output.
#[derive(Default)]
pub struct SimpleEventNode {}

impl SimpleEventNode {
    pub fn new() -> Self {
        SimpleEventNode {}
    }
}

#[async_trait]
impl NodeLogic for SimpleEventNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new(
            "events_simple",
            "Simple Event",
            "Starts the flow when triggered",
            "Events",
        );
        node.add_icon("/flow/icons/play.svg");
        node.set_start(true);

        node.add_output_pin("exec_out", "Output", "Trigger Pin", VariableType::Execution);

        node.add_output_pin(
            "payload",
            "Payload",
            "The payload this event was triggered with",
            VariableType::Generic,
        );

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        context.activate_exec_pin("exec_out").await?;
        Ok(())
    }
}
