use crate::flow::{
    node::{Node, NodeLogic},
    pin::{PinType, names},
    variable::VariableType,
};
use ahash::AHashMap;
use flowboard_types::{EngineError, json::json};
use futures::future::BoxFuture;
use std::sync::Arc;

use super::{LogLevel, context::ExecutionContext, internal_pin::InternalPin};

#[derive(Debug)]
pub enum InternalNodeError {
    DependencyFailed(String),
    ExecutionFailed(String),
    PinNotReady(String),
}

/// A node scheduled for execution plus the pins it was reached through.
#[derive(Clone)]
pub struct ExecutionTarget {
    pub node: Arc<InternalNode>,
    pub through_pins: Vec<Arc<InternalPin>>,
}

/// Immutable execution-time view of a node: its definition, wired pins and
/// logic implementation. Shared across the run via `Arc`.
pub struct InternalNode {
    node: Node,
    pub pins: AHashMap<String, Arc<InternalPin>>,
    pub logic: Arc<dyn NodeLogic>,
    pin_cache: AHashMap<String, Vec<Arc<InternalPin>>>,
}

impl InternalNode {
    pub fn new(
        node: Node,
        pins: AHashMap<String, Arc<InternalPin>>,
        logic: Arc<dyn NodeLogic>,
        pin_cache: AHashMap<String, Vec<Arc<InternalPin>>>,
    ) -> Self {
        InternalNode {
            node,
            pins,
            logic,
            pin_cache,
        }
    }

    #[inline]
    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    #[inline]
    pub fn node_name(&self) -> &str {
        &self.node.name
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_pure(&self) -> bool {
        self.node.is_pure()
    }

    pub fn get_pin_by_name(&self, name: &str) -> flowboard_types::Result<Arc<InternalPin>> {
        self.pin_cache
            .get(name)
            .and_then(|pins| pins.first())
            .cloned()
            .ok_or_else(|| {
                flowboard_types::anyhow!("Pin '{}' not found on node '{}'", name, self.node.name)
            })
    }

    pub fn get_pins_by_name(&self, name: &str) -> Vec<Arc<InternalPin>> {
        self.pin_cache.get(name).cloned().unwrap_or_default()
    }

    pub fn get_pin_by_id(&self, id: &str) -> Option<Arc<InternalPin>> {
        self.pins.get(id).cloned()
    }

    pub fn error_handler_pin(&self) -> Option<Arc<InternalPin>> {
        self.pin_cache
            .get(names::AUTO_HANDLE_ERROR)
            .and_then(|pins| {
                pins.iter()
                    .find(|pin| {
                        pin.pin_type == PinType::Output
                            && pin.data_type == VariableType::Execution
                    })
                    .cloned()
            })
    }

    /// Whether any output already carries a value; used to skip re-running
    /// shared pure producers.
    pub async fn outputs_resolved(&self) -> bool {
        for pin in self.pins.values() {
            if pin.pin_type == PinType::Output && pin.get_value().await.is_some() {
                return true;
            }
        }
        false
    }
}

/// Make sure every pure producer feeding `pin` ran before its value is read.
/// Walks the dependency chain depth-first; shared producers run once.
pub fn resolve_pure_dependencies<'a>(
    ctx: &'a mut ExecutionContext,
    pin: Arc<InternalPin>,
) -> BoxFuture<'a, flowboard_types::Result<()>> {
    Box::pin(async move {
        let Some(dependency) = pin.depends_on().first().and_then(|weak| weak.upgrade()) else {
            return Ok(());
        };

        let Some(producer) = dependency.node().and_then(|weak| weak.upgrade()) else {
            return Ok(());
        };

        if !producer.is_pure() || producer.outputs_resolved().await {
            return Ok(());
        }

        // Inputs of the producer may hang off further pure nodes.
        let input_pins: Vec<Arc<InternalPin>> = producer
            .pins
            .values()
            .filter(|p| p.pin_type == PinType::Input)
            .cloned()
            .collect();

        let mut sub = ctx.create_sub_context(&producer).await;
        for input in input_pins {
            resolve_pure_dependencies(&mut sub, input).await?;
        }

        let result = producer.logic.run(&mut sub).await;
        ctx.push_sub_context(&mut sub);

        result.map_err(|err| {
            flowboard_types::anyhow!(
                "Pure dependency '{}' failed: {}",
                producer.node_name(),
                err
            )
        })
    })
}

/// Run one node within the given context: resolve pure inputs, execute the
/// logic, route failures through `auto_handle_error` when declared, and
/// collect the execution successors.
pub async fn trigger(
    ctx: &mut ExecutionContext,
    node: &Arc<InternalNode>,
) -> flowboard_types::Result<Vec<ExecutionTarget>> {
    let input_pins: Vec<Arc<InternalPin>> = node
        .pins
        .values()
        .filter(|p| p.pin_type == PinType::Input && p.data_type != VariableType::Execution)
        .cloned()
        .collect();

    for input in input_pins {
        resolve_pure_dependencies(ctx, input).await?;
    }

    let result = node.logic.run(ctx).await;

    if let Err(err) = result {
        match node.error_handler_pin() {
            Some(handler) => {
                ctx.log_message(
                    &format!("Node error handled: {}", err),
                    LogLevel::Warn,
                );

                for string_pin in node.get_pins_by_name(names::AUTO_HANDLE_ERROR_STRING) {
                    string_pin.set_value(json!(err.to_string())).await;
                }

                handler.set_value(json!(true)).await;
            }
            None => {
                return Err(EngineError::new(
                    flowboard_types::ErrorKind::NodeError,
                    format!("Node '{}' failed: {}", node.node_name(), err),
                )
                .into());
            }
        }
    }

    collect_successors(node).await
}

/// Gather the nodes reached through activated execution outputs, then
/// deactivate those outputs so loops re-arm cleanly.
pub async fn collect_successors(
    node: &Arc<InternalNode>,
) -> flowboard_types::Result<Vec<ExecutionTarget>> {
    let mut successors: Vec<ExecutionTarget> = Vec::new();

    for pin in node.pins.values() {
        if pin.pin_type != PinType::Output || pin.data_type != VariableType::Execution {
            continue;
        }

        if !pin.is_activated().await {
            continue;
        }

        pin.reset().await;

        // Layer boundary pins relay the edge without owning a node; follow
        // them until a real node shows up.
        let mut queue: Vec<Arc<InternalPin>> = pin
            .connected_to()
            .iter()
            .filter_map(|weak| weak.upgrade())
            .collect();
        let mut hops = 0usize;

        while let Some(connected) = queue.pop() {
            hops += 1;
            if hops > 1024 {
                return Err(flowboard_types::anyhow!(
                    "Execution edge relay chain exceeded depth limit"
                ));
            }

            match connected.node().and_then(|weak| weak.upgrade()) {
                Some(next_node) => {
                    successors.push(ExecutionTarget {
                        node: next_node,
                        through_pins: vec![connected],
                    });
                }
                None if connected.layer_pin => {
                    queue.extend(
                        connected
                            .connected_to()
                            .iter()
                            .filter_map(|weak| weak.upgrade()),
                    );
                }
                None => {}
            }
        }
    }

    Ok(successors)
}
