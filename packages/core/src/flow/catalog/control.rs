use crate::{
    flow::{
        execution::context::ExecutionContext,
        node::{Node, NodeLogic},
        variable::VariableType,
    },
    state::FlowboardState,
};
use async_trait::async_trait;
use std::time::Duration;

/// Waits for the given number of milliseconds. Cancellation-aware: the
/// sleep wakes up early when the run is cancelled.
#[derive(Default)]
pub struct DelayNode {}

impl DelayNode {
    pub fn new() -> Self {
        DelayNode {}
    }
}

#[async_trait]
impl NodeLogic for DelayNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new(
            "control_delay",
            "Delay",
            "Waits before continuing the flow",
            "Control",
        );
        node.add_icon("/flow/icons/timer.svg");
        node.set_long_running(true);

        node.add_input_pin("exec_in", "Input", "Trigger Pin", VariableType::Execution);

        node.add_input_pin(
            "duration_ms",
            "Duration (ms)",
            "How long to wait",
            VariableType::Integer,
        )
        .set_default_value(Some(serde_json::json!(1000)));

        node.add_output_pin(
            "exec_out",
            "Output",
            "Continues after the delay",
            VariableType::Execution,
        );

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let duration_ms = context.evaluate_pin::<u64>("duration_ms").await?;
        context.sleep(Duration::from_millis(duration_ms)).await?;
        context.activate_exec_pin("exec_out").await?;
        Ok(())
    }
}

/// Pass-through node used to tidy up edges on the canvas. Forwards both
/// execution and data unchanged.
#[derive(Default)]
pub struct RerouteNode {}

impl RerouteNode {
    pub fn new() -> Self {
        RerouteNode {}
    }
}

#[async_trait]
impl NodeLogic for RerouteNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new(
            "control_reroute",
            "Reroute",
            "Organizes connections without changing them",
            "Control",
        );
        node.add_icon("/flow/icons/route.svg");

        node.add_input_pin("route_in", "Input", "", VariableType::Generic);
        node.add_output_pin("route_out", "Output", "", VariableType::Generic);

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let input = context.get_pin_by_name("route_in").await?;
        let value = crate::flow::utils::evaluate_pin_value(input).await?;
        context.set_pin_value("route_out", value).await?;
        Ok(())
    }
}
