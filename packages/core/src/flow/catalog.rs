use std::sync::Arc;

use super::node::NodeRegistry;

pub mod control;
pub mod events;
pub mod logging;
pub mod utils;
pub mod variables;

/// The engine ships only the logic nodes it needs itself; the full node
/// catalog is provided by separate packages and registered by the host.
pub fn register_built_ins(registry: &mut NodeRegistry) {
    registry.register("events_simple", Arc::new(events::SimpleEventNode::new()));
    registry.register("control_delay", Arc::new(control::DelayNode::new()));
    registry.register("control_reroute", Arc::new(control::RerouteNode::new()));
    registry.register("log_info", Arc::new(logging::InfoNode::new()));
    registry.register("log_error", Arc::new(logging::ErrorNode::new()));
    registry.register("var_get", Arc::new(variables::GetVariableNode::new()));
    registry.register("var_set", Arc::new(variables::SetVariableNode::new()));
    registry.register("string_upper", Arc::new(utils::StringUpperNode::new()));
}
