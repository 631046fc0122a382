use crate::{
    flow::{
        execution::context::ExecutionContext,
        node::{Node, NodeLogic},
        variable::VariableType,
    },
    state::FlowboardState,
};
use async_trait::async_trait;
use serde_json::json;

/// Pure string transform, mostly useful to exercise on-demand evaluation.
#[derive(Default)]
pub struct StringUpperNode {}

impl StringUpperNode {
    pub fn new() -> Self {
        StringUpperNode {}
    }
}

#[async_trait]
impl NodeLogic for StringUpperNode {
    async fn get_node(&self, _app_state: &FlowboardState) -> Node {
        let mut node = Node::new(
            "string_upper",
            "To Uppercase",
            "Uppercases a string",
            "Utils",
        );
        node.add_icon("/flow/icons/text.svg");

        node.add_input_pin("string", "String", "", VariableType::String)
            .set_default_value(Some(json!("")));

        node.add_output_pin("result", "Result", "", VariableType::String);

        node
    }

    async fn run(&self, context: &mut ExecutionContext) -> flowboard_types::Result<()> {
        let input = context.evaluate_pin::<String>("string").await?;
        context.set_pin_value("result", json!(input.to_uppercase())).await?;
        Ok(())
    }
}
